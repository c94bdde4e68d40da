//! Predictor adapter: timeout, clamping, fault containment, health counters.

use crate::artifacts::store::ArtifactHandles;
use crate::predictor::{Prediction, TierPredictor};
use crate::snapshot::{Snapshot, Tier};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, warn};

/// Outcome of one adapted tier call. Timeouts and faults are both "declined"
/// from the coordinator's point of view; they are separated here so health
/// counters can tell upstream trouble apart from normal declines.
#[derive(Debug, Clone)]
pub enum TierOutcome {
    Decided(Prediction),
    Declined,
    TimedOut,
    Faulted,
}

/// Per-tier call counters for health monitoring.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TierHealth {
    pub calls: u64,
    pub decisions: u64,
    pub declines: u64,
    pub timeouts: u64,
    pub faults: u64,
}

/// Wraps a [`TierPredictor`] so a slow or broken tier can never take down a
/// decision: calls are bounded by a hard timeout, panic-free errors are
/// swallowed into declines, and out-of-range confidences are clamped.
pub struct PredictorAdapter {
    inner: Arc<dyn TierPredictor>,
    health: Mutex<TierHealth>,
}

impl PredictorAdapter {
    pub fn new(inner: Arc<dyn TierPredictor>) -> Self {
        Self {
            inner,
            health: Mutex::new(TierHealth::default()),
        }
    }

    pub fn tier(&self) -> Tier {
        self.inner.tier()
    }

    /// Call the wrapped predictor with a hard timeout of `budget`.
    pub async fn call(
        &self,
        handles: &ArtifactHandles,
        snapshot: &Snapshot,
        budget: Duration,
    ) -> TierOutcome {
        let tier = self.tier();
        self.bump(|h| h.calls += 1);

        match tokio::time::timeout(budget, self.inner.try_decide(handles, snapshot, budget)).await
        {
            Err(_) => {
                warn!(%tier, budget_ms = budget.as_millis() as u64, "Tier exceeded its budget");
                self.bump(|h| h.timeouts += 1);
                TierOutcome::TimedOut
            }
            Ok(Err(e)) => {
                error!(%tier, error = %e, "Tier predictor fault");
                self.bump(|h| h.faults += 1);
                TierOutcome::Faulted
            }
            Ok(Ok(None)) => {
                self.bump(|h| h.declines += 1);
                TierOutcome::Declined
            }
            Ok(Ok(Some(mut prediction))) => {
                if !(0.0..=1.0).contains(&prediction.confidence)
                    || !prediction.confidence.is_finite()
                {
                    warn!(
                        %tier,
                        confidence = prediction.confidence,
                        "Predictor reported out-of-range confidence; clamping"
                    );
                    prediction.confidence = if prediction.confidence.is_finite() {
                        prediction.confidence.clamp(0.0, 1.0)
                    } else {
                        0.0
                    };
                }
                self.bump(|h| h.decisions += 1);
                TierOutcome::Decided(prediction)
            }
        }
    }

    /// Current health counters.
    pub fn health(&self) -> TierHealth {
        self.health.lock().map(|h| *h).unwrap_or_default()
    }

    fn bump(&self, f: impl FnOnce(&mut TierHealth)) {
        if let Ok(mut health) = self.health.lock() {
            f(&mut health);
        }
    }
}
