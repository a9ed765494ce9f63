use crate::ledger::{LogEntry, Seq};
use crate::primary::peers::SecondaryId;
use crate::primary::pending::PendingAppends;
use crate::primary::transport::SecondaryTransport;
use bytes::Bytes;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Retry schedule for a secondary's delivery worker: exponential back-off with
/// jitter, capped. There is no retry budget; a worker must not skip a failed
/// entry, so it retries the same one until the secondary takes it.
#[derive(Debug, Copy, Clone)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
    /// Upper bound of the random jitter, as a fraction of the current delay.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            initial_delay: Duration::from_millis(100),
            multiplier: 2,
            max_delay: Duration::from_secs(5),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> Backoff {
        Backoff {
            policy: *self,
            current: self.initial_delay,
        }
    }
}

struct Backoff {
    policy: RetryPolicy,
    current: Duration,
}

impl Backoff {
    fn next_delay(&mut self) -> Duration {
        let base = self.current;
        self.current = std::cmp::min(base * self.policy.multiplier, self.policy.max_delay);

        let jitter_fraction = rand::thread_rng().gen_range(0.0..=self.policy.jitter);
        base + base.mul_f64(jitter_fraction)
    }
}

struct QueuedEntry {
    seq: Seq,
    payload: Bytes,
}

/// Dispatcher owns one unbounded FIFO queue + worker task per secondary.
///
/// FIFO within a secondary is what keeps the seq values it observes
/// non-decreasing; the queue is consumed by exactly one worker, and the worker
/// never advances past an entry that hasn't been ACKed.
pub struct Dispatcher {
    queues: HashMap<SecondaryId, mpsc::UnboundedSender<QueuedEntry>>,
    logger: slog::Logger,
}

impl Dispatcher {
    /// Spawns one worker per secondary. Workers publish ACKs into `pending`
    /// and run until the dispatcher (the sender side of their queue) is
    /// dropped and the queue is drained.
    pub fn spawn(
        logger: slog::Logger,
        secondaries: &[(SecondaryId, Arc<dyn SecondaryTransport>)],
        pending: Arc<PendingAppends>,
        retry: RetryPolicy,
    ) -> Self {
        let mut queues = HashMap::with_capacity(secondaries.len());

        for (id, transport) in secondaries {
            let (tx, rx) = mpsc::unbounded_channel();
            let worker = DeliveryWorker {
                logger: logger.new(slog::o!("secondary" => id.as_str().to_string())),
                secondary_id: id.clone(),
                transport: Arc::clone(transport),
                pending: Arc::clone(&pending),
                retry,
            };
            tokio::spawn(worker.run(rx));
            queues.insert(id.clone(), tx);
        }

        Dispatcher { queues, logger }
    }

    /// Appends the entry to every secondary's queue. Never blocks the caller,
    /// never drops an entry.
    pub fn enqueue(&self, entry: &LogEntry) {
        for (id, queue) in &self.queues {
            let queued = QueuedEntry {
                seq: entry.seq,
                payload: entry.payload.clone(),
            };
            if queue.send(queued).is_err() {
                // Worker tasks outlive the dispatcher; this is only reachable
                // mid-shutdown.
                slog::warn!(
                    self.logger,
                    "Delivery queue for {} is closed, seq {} not enqueued",
                    id,
                    entry.seq
                );
            }
        }
    }
}

/// One worker, one secondary. Per queue entry the state machine is
/// `queued -> inflight -> (ack | failed)`, where `failed` goes back to
/// `inflight` after the back-off delay. The only terminal state is `ack`.
struct DeliveryWorker {
    logger: slog::Logger,
    secondary_id: SecondaryId,
    transport: Arc<dyn SecondaryTransport>,
    pending: Arc<PendingAppends>,
    retry: RetryPolicy,
}

impl DeliveryWorker {
    async fn run(self, mut queue: mpsc::UnboundedReceiver<QueuedEntry>) {
        while let Some(entry) = queue.recv().await {
            self.deliver(entry).await;
        }
        slog::debug!(self.logger, "Delivery queue closed, worker exiting");
    }

    async fn deliver(&self, entry: QueuedEntry) {
        let mut backoff = self.retry.backoff();
        let mut attempt: u64 = 1;

        loop {
            match self.transport.replicate(entry.seq, entry.payload.clone()).await {
                Ok(ack) => {
                    if ack.duplicate {
                        slog::debug!(self.logger, "Secondary already had seq {}", entry.seq);
                    } else {
                        slog::debug!(self.logger, "Replicated seq {}", entry.seq);
                    }
                    self.pending.record_ack(entry.seq, &self.secondary_id);
                    return;
                }
                Err(err) => {
                    let delay = backoff.next_delay();
                    slog::warn!(
                        self.logger,
                        "Replicate seq {} failed (attempt {}), retrying in {:?}: {}",
                        entry.seq,
                        attempt,
                        delay,
                        err
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primary::transport::{ReplicateAck, TransportError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Test transport that fails the first `failures_before_success` calls per
    /// seq and records the order of successful deliveries.
    struct FlakySecondary {
        failures_before_success: usize,
        attempts: Mutex<HashMap<u64, usize>>,
        delivered: Mutex<Vec<u64>>,
        duplicate_from: Option<u64>,
    }

    impl FlakySecondary {
        fn reliable() -> Self {
            Self::failing(0)
        }

        fn failing(failures_before_success: usize) -> Self {
            FlakySecondary {
                failures_before_success,
                attempts: Mutex::new(HashMap::new()),
                delivered: Mutex::new(Vec::new()),
                duplicate_from: None,
            }
        }

        fn delivered(&self) -> Vec<u64> {
            self.delivered.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl SecondaryTransport for FlakySecondary {
        async fn replicate(&self, seq: Seq, _payload: Bytes) -> Result<ReplicateAck, TransportError> {
            let mut attempts = self.attempts.lock().unwrap();
            let seen = attempts.entry(seq.val()).or_insert(0);
            *seen += 1;
            if *seen <= self.failures_before_success {
                return Err(TransportError::Status(503));
            }
            drop(attempts);

            self.delivered.lock().unwrap().push(seq.val());
            let duplicate = self.duplicate_from.map(|from| seq.val() >= from).unwrap_or(false);
            Ok(ReplicateAck { duplicate })
        }

        async fn probe_health(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn test_logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(5),
            multiplier: 2,
            max_delay: Duration::from_millis(20),
            jitter: 0.2,
        }
    }

    fn entry(seq: u64, payload: &'static [u8]) -> LogEntry {
        LogEntry {
            seq: Seq::new(seq),
            payload: Bytes::from_static(payload),
        }
    }

    #[tokio::test]
    async fn delivers_in_fifo_order_despite_failures() {
        let secondary = Arc::new(FlakySecondary::failing(2));
        let id = SecondaryId::new("http://s1:8001");
        let pending = PendingAppends::new();
        let dispatcher = Dispatcher::spawn(
            test_logger(),
            &[(id, secondary.clone() as Arc<dyn SecondaryTransport>)],
            Arc::clone(&pending),
            fast_retry(),
        );

        for (seq, payload) in [(1, b"a" as &[u8]), (2, b"b"), (3, b"c")] {
            dispatcher.enqueue(&LogEntry {
                seq: Seq::new(seq),
                payload: Bytes::copy_from_slice(payload),
            });
        }

        let mut ticket = pending.register(Seq::new(3));
        dispatcher.enqueue(&entry(3, b"c")); // second delivery of seq 3 is a retry-shaped duplicate
        tokio::time::timeout(Duration::from_secs(2), ticket.wait_for_acks(1))
            .await
            .expect("seq 3 should eventually be ACKed");

        let delivered = secondary.delivered();
        assert_eq!(&delivered[..3], &[1, 2, 3]);
    }

    #[tokio::test]
    async fn duplicate_response_counts_as_ack() {
        let mut flaky = FlakySecondary::reliable();
        flaky.duplicate_from = Some(1);
        let secondary = Arc::new(flaky);
        let id = SecondaryId::new("http://s1:8001");
        let pending = PendingAppends::new();
        let dispatcher = Dispatcher::spawn(
            test_logger(),
            &[(id.clone(), secondary.clone() as Arc<dyn SecondaryTransport>)],
            Arc::clone(&pending),
            fast_retry(),
        );

        let mut ticket = pending.register(Seq::new(1));
        dispatcher.enqueue(&entry(1, b"x"));

        tokio::time::timeout(Duration::from_secs(1), ticket.wait_for_acks(1))
            .await
            .expect("duplicate=true must still ACK");
        assert_eq!(ticket.acked(), vec![id]);
    }

    #[tokio::test]
    async fn fans_out_to_every_secondary() {
        let s1 = Arc::new(FlakySecondary::reliable());
        let s2 = Arc::new(FlakySecondary::reliable());
        let pending = PendingAppends::new();
        let dispatcher = Dispatcher::spawn(
            test_logger(),
            &[
                (SecondaryId::new("http://s1:8001"), s1.clone() as Arc<dyn SecondaryTransport>),
                (SecondaryId::new("http://s2:8002"), s2.clone() as Arc<dyn SecondaryTransport>),
            ],
            Arc::clone(&pending),
            fast_retry(),
        );

        let mut ticket = pending.register(Seq::new(1));
        dispatcher.enqueue(&entry(1, b"x"));
        tokio::time::timeout(Duration::from_secs(1), ticket.wait_for_acks(2))
            .await
            .expect("both secondaries should ACK");

        assert_eq!(s1.delivered(), vec![1]);
        assert_eq!(s2.delivered(), vec![1]);
    }

    #[tokio::test]
    async fn a_stuck_secondary_blocks_only_its_own_queue() {
        /// Never succeeds; counts attempts.
        struct BlackHole {
            attempts: AtomicUsize,
        }

        #[async_trait::async_trait]
        impl SecondaryTransport for BlackHole {
            async fn replicate(&self, _seq: Seq, _payload: Bytes) -> Result<ReplicateAck, TransportError> {
                self.attempts.fetch_add(1, Ordering::SeqCst);
                Err(TransportError::Unreachable("connection refused".into()))
            }

            async fn probe_health(&self) -> Result<(), TransportError> {
                Err(TransportError::Unreachable("connection refused".into()))
            }
        }

        let stuck = Arc::new(BlackHole {
            attempts: AtomicUsize::new(0),
        });
        let live = Arc::new(FlakySecondary::reliable());
        let live_id = SecondaryId::new("http://s2:8002");
        let pending = PendingAppends::new();
        let dispatcher = Dispatcher::spawn(
            test_logger(),
            &[
                (SecondaryId::new("http://s1:8001"), stuck.clone() as Arc<dyn SecondaryTransport>),
                (live_id.clone(), live.clone() as Arc<dyn SecondaryTransport>),
            ],
            Arc::clone(&pending),
            fast_retry(),
        );

        let mut ticket = pending.register(Seq::new(1));
        dispatcher.enqueue(&entry(1, b"x"));

        tokio::time::timeout(Duration::from_secs(1), ticket.wait_for_acks(1))
            .await
            .expect("the live secondary should ACK on its own");
        assert_eq!(ticket.acked(), vec![live_id]);
        assert!(stuck.attempts.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(100),
            multiplier: 2,
            max_delay: Duration::from_secs(5),
            jitter: 0.2,
        };
        let mut backoff = policy.backoff();

        for expected_base_ms in [100u64, 200, 400, 800, 1600, 3200, 5000, 5000] {
            let delay = backoff.next_delay();
            let base = Duration::from_millis(expected_base_ms);
            assert!(delay >= base, "delay {:?} below base {:?}", delay, base);
            assert!(
                delay <= base.mul_f64(1.2),
                "delay {:?} above base {:?} + 20% jitter",
                delay,
                base
            );
        }
    }
}
