//! Fire-and-forget decision outcome sink.
//!
//! The coordinator enqueues one [`DecisionRecord`] per decision and never
//! waits on, or hears back from, the consumer. A dropped or slow receiver
//! must not affect decision latency or correctness; send failures are
//! silently ignored.

use crate::governor::order::{GovernorError, LockGovernor, Subsystem};
use crate::snapshot::Tier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// One decision's outcome, for offline analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub request_id: String,
    pub tier_used: Tier,
    pub elapsed_ms: u64,
    pub confidence: f64,
    pub fallback: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Write-only handle the coordinator holds.
#[derive(Clone)]
pub struct MetricsSink {
    sender: mpsc::UnboundedSender<DecisionRecord>,
}

impl MetricsSink {
    /// Create a connected sink/receiver pair.
    pub fn channel() -> (Self, MetricsReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, MetricsReceiver { receiver })
    }

    /// A sink whose receiver is already gone. Records vanish harmlessly.
    pub fn disconnected() -> Self {
        let (sink, _receiver) = Self::channel();
        sink
    }

    /// Enqueue a record. Non-blocking; a closed channel is not an error.
    pub fn record(&self, record: DecisionRecord) {
        let tier = record.tier_used;
        if self.sender.send(record).is_err() {
            debug!(%tier, "Metrics receiver gone, record dropped");
        }
    }
}

/// Consumer end, drained by the external outcome store.
pub struct MetricsReceiver {
    receiver: mpsc::UnboundedReceiver<DecisionRecord>,
}

impl MetricsReceiver {
    /// Await the next record. `None` when all sinks are dropped.
    pub async fn recv(&mut self) -> Option<DecisionRecord> {
        self.receiver.recv().await
    }

    /// Drain everything currently queued without waiting.
    pub fn drain(&mut self) -> Vec<DecisionRecord> {
        let mut records = Vec::new();
        while let Ok(record) = self.receiver.try_recv() {
            records.push(record);
        }
        records
    }

    /// Drain under the metrics-write lock.
    ///
    /// Batch entry point for the external outcome store: the drain and the
    /// downstream write happen under one `MetricsWrite` ticket, serializing
    /// writers and making a stuck writer visible to the watchdog. The
    /// decision path never takes this lock; `record()` stays lock-free.
    pub fn drain_governed(
        &mut self,
        governor: &LockGovernor,
        max_wait: Duration,
    ) -> Result<Vec<DecisionRecord>, GovernorError> {
        let _ticket = governor.acquire(Subsystem::MetricsWrite, max_wait, "metrics::drain")?;
        Ok(self.drain())
    }
}
