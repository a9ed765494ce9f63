use crate::primary::peers::SecondaryId;
use crate::primary::transport::SecondaryTransport;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Liveness view of one secondary, fed by its probe task.
struct ProbeState {
    last_seen: Option<Instant>,
}

struct SecondaryHealth {
    id: SecondaryId,
    state: Arc<Mutex<ProbeState>>,
}

/// Point-in-time health of one secondary, for the primary's `/health` view.
#[derive(Debug, Clone)]
pub struct SecondaryStatus {
    pub id: SecondaryId,
    pub healthy: bool,
    pub last_seen: Option<Duration>,
}

/// HealthMonitor pings every secondary on a fixed interval and keeps the
/// advisory liveness view behind the quorum predicate.
///
/// A secondary is healthy when its most recent successful probe is within the
/// grace window. The view is eventually consistent: a secondary that passes
/// the quorum gate but dies during replication causes retries, not append
/// failures.
pub struct HealthMonitor {
    secondaries: Vec<SecondaryHealth>,
    grace: Duration,
}

impl HealthMonitor {
    /// Spawns one probe task per secondary. Tasks run for the process
    /// lifetime. Until its first successful probe a secondary counts as
    /// unhealthy.
    pub fn spawn(
        logger: slog::Logger,
        secondaries: &[(SecondaryId, Arc<dyn SecondaryTransport>)],
        interval: Duration,
        grace: Duration,
    ) -> Self {
        let mut tracked = Vec::with_capacity(secondaries.len());

        for (id, transport) in secondaries {
            let state = Arc::new(Mutex::new(ProbeState { last_seen: None }));
            let probe = ProbeTask {
                logger: logger.new(slog::o!("secondary" => id.as_str().to_string())),
                transport: Arc::clone(transport),
                state: Arc::clone(&state),
                interval,
            };
            tokio::spawn(probe.run());
            tracked.push(SecondaryHealth { id: id.clone(), state });
        }

        HealthMonitor {
            secondaries: tracked,
            grace,
        }
    }

    pub fn healthy_count(&self) -> usize {
        self.secondaries.iter().filter(|s| self.is_healthy(s)).count()
    }

    /// Quorum predicate: strictly more than half of all nodes (secondaries
    /// plus the primary itself) must be healthy to admit any new write. This
    /// is independent of any request's write concern.
    pub fn has_quorum(&self) -> bool {
        self.healthy_count() + 1 >= self.quorum_size()
    }

    /// `ceil((N+1)/2)` where N is the number of secondaries.
    pub fn quorum_size(&self) -> usize {
        (self.secondaries.len() + 2) / 2
    }

    pub fn num_nodes(&self) -> usize {
        self.secondaries.len() + 1
    }

    pub fn statuses(&self) -> Vec<SecondaryStatus> {
        self.secondaries
            .iter()
            .map(|s| {
                let last_seen = s
                    .state
                    .lock()
                    .expect("ProbeState mutex poisoned")
                    .last_seen
                    .map(|at| at.elapsed());
                SecondaryStatus {
                    id: s.id.clone(),
                    healthy: last_seen.map(|age| age <= self.grace).unwrap_or(false),
                    last_seen,
                }
            })
            .collect()
    }

    fn is_healthy(&self, secondary: &SecondaryHealth) -> bool {
        secondary
            .state
            .lock()
            .expect("ProbeState mutex poisoned")
            .last_seen
            .map(|at| at.elapsed() <= self.grace)
            .unwrap_or(false)
    }
}

struct ProbeTask {
    logger: slog::Logger,
    transport: Arc<dyn SecondaryTransport>,
    state: Arc<Mutex<ProbeState>>,
    interval: Duration,
}

impl ProbeTask {
    async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        // The first tick fires immediately so startup converges fast.
        let mut was_reachable = false;

        loop {
            ticker.tick().await;

            match self.transport.probe_health().await {
                Ok(()) => {
                    self.state
                        .lock()
                        .expect("ProbeState mutex poisoned")
                        .last_seen = Some(Instant::now());
                    if !was_reachable {
                        slog::info!(self.logger, "Secondary is reachable");
                        was_reachable = true;
                    }
                }
                Err(err) => {
                    if was_reachable {
                        slog::warn!(self.logger, "Secondary stopped answering probes: {}", err);
                        was_reachable = false;
                    } else {
                        slog::debug!(self.logger, "Probe failed: {}", err);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Seq;
    use crate::primary::transport::{ReplicateAck, TransportError};
    use bytes::Bytes;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct ToggleSecondary {
        up: AtomicBool,
    }

    impl ToggleSecondary {
        fn new(up: bool) -> Arc<Self> {
            Arc::new(ToggleSecondary {
                up: AtomicBool::new(up),
            })
        }
    }

    #[async_trait::async_trait]
    impl SecondaryTransport for ToggleSecondary {
        async fn replicate(&self, _seq: Seq, _payload: Bytes) -> Result<ReplicateAck, TransportError> {
            Ok(ReplicateAck { duplicate: false })
        }

        async fn probe_health(&self) -> Result<(), TransportError> {
            if self.up.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(TransportError::Unreachable("connection refused".into()))
            }
        }
    }

    fn test_logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn transports(ups: &[bool]) -> Vec<(SecondaryId, Arc<dyn SecondaryTransport>)> {
        ups.iter()
            .enumerate()
            .map(|(i, up)| {
                (
                    SecondaryId::new(format!("http://s{}:800{}", i + 1, i + 1)),
                    ToggleSecondary::new(*up) as Arc<dyn SecondaryTransport>,
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn quorum_holds_with_one_of_two_secondaries_up() {
        let monitor = HealthMonitor::spawn(
            test_logger(),
            &transports(&[true, false]),
            Duration::from_millis(10),
            Duration::from_millis(100),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(monitor.healthy_count(), 1);
        assert!(monitor.has_quorum());
    }

    #[tokio::test]
    async fn quorum_lost_when_all_secondaries_down() {
        let monitor = HealthMonitor::spawn(
            test_logger(),
            &transports(&[false, false]),
            Duration::from_millis(10),
            Duration::from_millis(100),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(monitor.healthy_count(), 0);
        assert!(!monitor.has_quorum());
    }

    #[tokio::test]
    async fn secondary_goes_stale_after_grace_window() {
        let secondary = ToggleSecondary::new(true);
        let monitor = HealthMonitor::spawn(
            test_logger(),
            &[(
                SecondaryId::new("http://s1:8001"),
                secondary.clone() as Arc<dyn SecondaryTransport>,
            )],
            Duration::from_millis(10),
            Duration::from_millis(60),
        );
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(monitor.healthy_count(), 1);

        secondary.up.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(monitor.healthy_count(), 0);
        let statuses = monitor.statuses();
        assert!(!statuses[0].healthy);
        // last_seen keeps reporting the stale timestamp rather than resetting.
        assert!(statuses[0].last_seen.is_some());
    }

    #[test]
    fn quorum_size_is_majority_of_all_nodes() {
        // (secondary count, expected quorum of N+1 nodes)
        for (n, expected) in [(0usize, 1usize), (1, 1), (2, 2), (3, 2), (4, 3), (5, 3)] {
            let monitor = HealthMonitor {
                secondaries: (0..n)
                    .map(|i| SecondaryHealth {
                        id: SecondaryId::new(format!("http://s{}:8001", i)),
                        state: Arc::new(Mutex::new(ProbeState { last_seen: None })),
                    })
                    .collect(),
                grace: Duration::from_secs(3),
            };
            assert_eq!(monitor.quorum_size(), expected, "N = {}", n);
        }
    }
}
