use crate::ledger::{LogEntry, Seq};
use bytes::Bytes;
use std::sync::Mutex;

/// Ledger is the primary's authoritative append-only log. It lives for the
/// process lifetime; there is no mutation or removal, only `assign()`.
///
/// `assign()` is the single writer and is serialized by the mutex covering
/// append+length. The order established here is the total order every
/// secondary eventually reveals.
pub struct Ledger {
    log: Mutex<Vec<Bytes>>,
}

impl Ledger {
    pub fn new() -> Self {
        Ledger {
            log: Mutex::new(Vec::new()),
        }
    }

    /// Computes `seq = len + 1`, appends the payload, and returns the entry.
    /// From this point on the message is part of the total order regardless of
    /// what happens to the client that submitted it.
    pub fn assign(&self, payload: Bytes) -> LogEntry {
        let mut log = self.log.lock().expect("Ledger mutex poisoned");
        log.push(payload.clone());

        LogEntry {
            seq: Seq::new(log.len() as u64),
            payload,
        }
    }

    /// Copy of all payloads in seq order.
    pub fn snapshot(&self) -> Vec<Bytes> {
        self.log.lock().expect("Ledger mutex poisoned").clone()
    }

    pub fn size(&self) -> usize {
        self.log.lock().expect("Ledger mutex poisoned").len()
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}
