use crate::ledger::Seq;
use crate::primary::peers::SecondaryId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Registry of in-flight client appends, keyed by seq. Dispatcher workers
/// publish ACKs into it; each waiting append has its own watch channel so one
/// ACK wakes exactly the request it belongs to.
///
/// A slot exists only while the client handler is waiting. Replication keeps
/// going after the slot is gone; late ACKs for an unregistered seq are simply
/// dropped here.
pub struct PendingAppends {
    slots: Mutex<HashMap<u64, Slot>>,
}

struct Slot {
    acked: HashSet<SecondaryId>,
    ack_count: watch::Sender<usize>,
}

impl PendingAppends {
    pub fn new() -> Arc<Self> {
        Arc::new(PendingAppends {
            slots: Mutex::new(HashMap::new()),
        })
    }

    /// Registers a waiter for `seq`. Must be called before the entry is handed
    /// to the dispatcher, otherwise an early ACK would be lost.
    pub fn register(self: &Arc<Self>, seq: Seq) -> PendingTicket {
        let (tx, rx) = watch::channel(0usize);
        let slot = Slot {
            acked: HashSet::new(),
            ack_count: tx,
        };

        let previous = self
            .slots
            .lock()
            .expect("PendingAppends mutex poisoned")
            .insert(seq.val(), slot);
        debug_assert!(previous.is_none(), "seq registered twice");

        PendingTicket {
            registry: Arc::clone(self),
            seq,
            ack_count: rx,
        }
    }

    /// Records an ACK from `from` for `seq`. Returns false when no append is
    /// waiting on that seq any more.
    pub fn record_ack(&self, seq: Seq, from: &SecondaryId) -> bool {
        let mut slots = self.slots.lock().expect("PendingAppends mutex poisoned");
        match slots.get_mut(&seq.val()) {
            Some(slot) => {
                if slot.acked.insert(from.clone()) {
                    slot.ack_count.send_replace(slot.acked.len());
                }
                true
            }
            None => false,
        }
    }

    fn acked(&self, seq: Seq) -> Vec<SecondaryId> {
        let slots = self.slots.lock().expect("PendingAppends mutex poisoned");
        let mut acked: Vec<SecondaryId> = slots
            .get(&seq.val())
            .map(|slot| slot.acked.iter().cloned().collect())
            .unwrap_or_default();
        acked.sort();
        acked
    }

    fn deregister(&self, seq: Seq) {
        self.slots
            .lock()
            .expect("PendingAppends mutex poisoned")
            .remove(&seq.val());
    }
}

/// Handle for one waiting append. Dropping it removes the slot from the
/// registry, even if the wait was abandoned.
pub struct PendingTicket {
    registry: Arc<PendingAppends>,
    seq: Seq,
    ack_count: watch::Receiver<usize>,
}

impl PendingTicket {
    /// Suspends until at least `needed` distinct secondaries have ACKed this
    /// seq. `needed == 0` returns immediately.
    pub async fn wait_for_acks(&mut self, needed: usize) {
        while *self.ack_count.borrow_and_update() < needed {
            if self.ack_count.changed().await.is_err() {
                // Sender side only drops together with the slot, which only
                // happens through our own Drop. Nothing left to wait for.
                return;
            }
        }
    }

    /// The distinct secondaries that have ACKed so far, in stable order.
    pub fn acked(&self) -> Vec<SecondaryId> {
        self.registry.acked(self.seq)
    }
}

impl Drop for PendingTicket {
    fn drop(&mut self) {
        self.registry.deregister(self.seq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn zero_needed_returns_immediately() {
        let registry = PendingAppends::new();
        let mut ticket = registry.register(Seq::new(1));

        ticket.wait_for_acks(0).await;
        assert!(ticket.acked().is_empty());
    }

    #[tokio::test]
    async fn wakes_after_enough_distinct_acks() {
        let registry = PendingAppends::new();
        let mut ticket = registry.register(Seq::new(7));

        let publisher = Arc::clone(&registry);
        tokio::spawn(async move {
            publisher.record_ack(Seq::new(7), &SecondaryId::new("http://s1:8001"));
            publisher.record_ack(Seq::new(7), &SecondaryId::new("http://s2:8002"));
        });

        tokio::time::timeout(Duration::from_secs(1), ticket.wait_for_acks(2))
            .await
            .expect("waiter should have been woken");
        assert_eq!(ticket.acked().len(), 2);
    }

    #[tokio::test]
    async fn duplicate_acks_do_not_inflate_the_count() {
        let registry = PendingAppends::new();
        let mut ticket = registry.register(Seq::new(3));
        let s1 = SecondaryId::new("http://s1:8001");

        registry.record_ack(Seq::new(3), &s1);
        registry.record_ack(Seq::new(3), &s1);
        registry.record_ack(Seq::new(3), &s1);

        tokio::time::timeout(Duration::from_millis(50), ticket.wait_for_acks(2))
            .await
            .expect_err("one distinct secondary must not satisfy w-1 == 2");
        assert_eq!(ticket.acked(), vec![s1]);
    }

    #[tokio::test]
    async fn waiters_are_isolated_per_seq() {
        let registry = PendingAppends::new();
        let mut blocked = registry.register(Seq::new(1));
        let mut free = registry.register(Seq::new(2));

        registry.record_ack(Seq::new(2), &SecondaryId::new("http://s1:8001"));

        tokio::time::timeout(Duration::from_secs(1), free.wait_for_acks(1))
            .await
            .expect("seq 2 waiter should complete");
        tokio::time::timeout(Duration::from_millis(50), blocked.wait_for_acks(1))
            .await
            .expect_err("seq 1 waiter should still be blocked");
    }

    #[tokio::test]
    async fn ack_after_deregistration_is_dropped() {
        let registry = PendingAppends::new();
        let ticket = registry.register(Seq::new(5));
        drop(ticket);

        assert!(!registry.record_ack(Seq::new(5), &SecondaryId::new("http://s1:8001")));
    }
}
