use crate::ledger::{Ledger, Seq};
use crate::primary::dispatcher::{Dispatcher, RetryPolicy};
use crate::primary::health::{HealthMonitor, SecondaryStatus};
use crate::primary::peers::SecondaryId;
use crate::primary::pending::PendingAppends;
use crate::primary::transport::SecondaryTransport;
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Tunables for the primary's replication machinery.
#[derive(Debug, Copy, Clone)]
pub struct PrimaryOptions {
    pub retry: RetryPolicy,
    pub health_interval: Duration,
    /// How long after the last successful probe a secondary still counts as
    /// healthy. Defaults to three probe intervals.
    pub health_grace: Duration,
}

impl Default for PrimaryOptions {
    fn default() -> Self {
        let health_interval = Duration::from_secs(1);
        PrimaryOptions {
            retry: RetryPolicy::default(),
            health_interval,
            health_grace: health_interval * 3,
        }
    }
}

/// Result of an admitted append, as returned to the client handler.
#[derive(Debug)]
pub struct AppendOutcome {
    pub seq: Seq,
    pub w: u32,
    /// Distinct secondaries that had ACKed at the moment the wait finished.
    /// The primary itself is not listed; it counts as one toward `w`.
    pub acks: Vec<SecondaryId>,
    pub duration: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum AppendError {
    #[error("write concern must be between 1 and {max}, got {w}")]
    InvalidWriteConcern { w: i64, max: i64 },

    #[error("no quorum: {healthy} of {total} nodes healthy, need {required}")]
    NoQuorum {
        healthy: usize,
        total: usize,
        required: usize,
    },
}

/// PrimaryNode ties the ledger, the per-secondary dispatcher, the pending
/// append registry and the health monitor together. One instance per primary
/// process; handlers get it as shared context.
pub struct PrimaryNode {
    logger: slog::Logger,
    ledger: Ledger,
    dispatcher: Dispatcher,
    pending: Arc<PendingAppends>,
    health: HealthMonitor,
    secondary_ids: Vec<SecondaryId>,
    // Serializes assign + queue seeding so every secondary's queue receives
    // seqs in non-decreasing order. Held only across non-blocking work.
    append_gate: Mutex<()>,
}

impl PrimaryNode {
    /// Spawns the dispatcher workers and health probes and returns the node.
    pub fn spawn(
        logger: slog::Logger,
        secondaries: Vec<(SecondaryId, Arc<dyn SecondaryTransport>)>,
        options: PrimaryOptions,
    ) -> Arc<Self> {
        let pending = PendingAppends::new();
        let dispatcher = Dispatcher::spawn(
            logger.clone(),
            &secondaries,
            Arc::clone(&pending),
            options.retry,
        );
        let health = HealthMonitor::spawn(
            logger.clone(),
            &secondaries,
            options.health_interval,
            options.health_grace,
        );

        Arc::new(PrimaryNode {
            logger,
            ledger: Ledger::new(),
            dispatcher,
            pending,
            health,
            secondary_ids: secondaries.into_iter().map(|(id, _)| id).collect(),
            append_gate: Mutex::new(()),
        })
    }

    pub fn num_secondaries(&self) -> usize {
        self.secondary_ids.len()
    }

    /// Client append. Validates the write concern, gates on quorum, commits
    /// the message to the total order, fans it out, and waits until `w - 1`
    /// distinct secondaries have ACKed (the primary is the remaining one).
    ///
    /// The wait is per-request: a `w=1` append returns immediately even while
    /// a `w=N+1` append sits blocked on a dead secondary.
    pub async fn append(&self, payload: Bytes, requested_w: Option<i64>) -> Result<AppendOutcome, AppendError> {
        let start = Instant::now();
        let max_w = self.num_secondaries() as i64 + 1;
        let w = requested_w.unwrap_or(max_w);

        if w < 1 || w > max_w {
            return Err(AppendError::InvalidWriteConcern { w, max: max_w });
        }
        let w = w as u32;

        if !self.health.has_quorum() {
            // Rejected before a seq is assigned; nothing is burned.
            return Err(AppendError::NoQuorum {
                healthy: self.health.healthy_count() + 1,
                total: self.health.num_nodes(),
                required: self.health.quorum_size(),
            });
        }

        let (entry, mut ticket) = {
            let _gate = self.append_gate.lock().expect("append gate poisoned");
            let entry = self.ledger.assign(payload);
            let ticket = self.pending.register(entry.seq);
            self.dispatcher.enqueue(&entry);
            (entry, ticket)
        };
        slog::info!(self.logger, "Appended seq {} locally, awaiting {} ACK(s)", entry.seq, w - 1);

        ticket.wait_for_acks((w - 1) as usize).await;

        let acks = ticket.acked();
        let duration = start.elapsed();
        slog::info!(
            self.logger,
            "Append seq {} satisfied w={} with {} ACK(s) in {:?}",
            entry.seq,
            w,
            acks.len(),
            duration
        );

        Ok(AppendOutcome {
            seq: entry.seq,
            w,
            acks,
            duration,
        })
    }

    /// The full log, in seq order. An entry is visible here as soon as its
    /// seq is assigned, before any secondary has it.
    pub fn messages(&self) -> Vec<Bytes> {
        self.ledger.snapshot()
    }

    pub fn log_size(&self) -> usize {
        self.ledger.size()
    }

    pub fn secondary_ids(&self) -> &[SecondaryId] {
        &self.secondary_ids
    }

    pub fn secondary_statuses(&self) -> Vec<SecondaryStatus> {
        self.health.statuses()
    }
}
