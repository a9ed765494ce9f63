use crate::ledger::Seq;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// What `ingest()` did with a delivery.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct IngestOutcome {
    /// The store already had this seq (applied or buffered); nothing changed.
    pub duplicate: bool,
    /// How many entries became visible because of this delivery: the entry
    /// itself plus any buffered successors it unblocked. Zero when the entry
    /// was buffered or was a duplicate.
    pub promoted: usize,
}

/// The secondary's store: the contiguous applied prefix that reads return,
/// plus a buffer of out-of-order arrivals keyed by seq.
///
/// Invariants, held under one lock:
/// - `applied` is the longest contiguous prefix starting at seq 1 and never
///   shrinks.
/// - every buffered seq is strictly greater than `applied.len() + 1`.
/// - a seq lands in `applied` at most once, however many deliveries carry it.
pub struct ReplicaStore {
    inner: Mutex<StoreInner>,
}

struct StoreInner {
    applied: Vec<Bytes>,
    buffered: BTreeMap<u64, Bytes>,
}

impl ReplicaStore {
    pub fn new() -> Self {
        ReplicaStore {
            inner: Mutex::new(StoreInner {
                applied: Vec::new(),
                buffered: BTreeMap::new(),
            }),
        }
    }

    /// True when `seq` is already applied or buffered. The ingress handler
    /// uses this to answer duplicates before its artificial delay.
    pub fn contains(&self, seq: Seq) -> bool {
        let inner = self.inner.lock().expect("ReplicaStore mutex poisoned");
        inner.contains(seq)
    }

    /// Applies or buffers one delivery. Idempotent: any number of calls with
    /// the same seq leaves the store exactly as one call would.
    pub fn ingest(&self, seq: Seq, payload: Bytes) -> IngestOutcome {
        let mut inner = self.inner.lock().expect("ReplicaStore mutex poisoned");

        if inner.contains(seq) {
            return IngestOutcome {
                duplicate: true,
                promoted: 0,
            };
        }

        let next = inner.applied.len() as u64 + 1;
        if seq.val() == next {
            inner.applied.push(payload);
            let mut promoted = 1;
            // Drain the buffer while it holds the next contiguous seq.
            while let Some(unblocked) = {
                let want = inner.applied.len() as u64 + 1;
                inner.buffered.remove(&want)
            } {
                inner.applied.push(unblocked);
                promoted += 1;
            }
            IngestOutcome {
                duplicate: false,
                promoted,
            }
        } else {
            // Out-of-order arrival; invisible to reads until the gap fills.
            inner.buffered.insert(seq.val(), payload);
            IngestOutcome {
                duplicate: false,
                promoted: 0,
            }
        }
    }

    /// Copy of the applied prefix, in seq order. Buffered entries are hidden.
    pub fn snapshot(&self) -> Vec<Bytes> {
        self.inner
            .lock()
            .expect("ReplicaStore mutex poisoned")
            .applied
            .clone()
    }

    pub fn applied_len(&self) -> usize {
        self.inner
            .lock()
            .expect("ReplicaStore mutex poisoned")
            .applied
            .len()
    }
}

impl Default for ReplicaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreInner {
    fn contains(&self, seq: Seq) -> bool {
        seq.val() <= self.applied.len() as u64 || self.buffered.contains_key(&seq.val())
    }
}
