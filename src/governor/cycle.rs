//! Single-instance improvement cycle.
//!
//! Periodic strategy re-evaluation: rebuild the learned model and the
//! generated-script set from accumulated experience, then publish them
//! through the governed swap locks. Only one instance may run system-wide; a
//! trigger while one is active is skipped outright rather than queued.
//! Cancellation is cooperative, checked at phase boundaries, with the
//! watchdog's supervised abort as the last resort.

use crate::artifacts::store::{GovernedPublisher, SharedArtifactStore, SwapError};
use crate::artifacts::types::{ModelArtifact, ScriptSet};
use crate::governor::order::{GovernorError, LockGovernor, Subsystem};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Cooperative cancellation flag shared with the watchdog.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Error type for improvement-cycle runs.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("Cycle build failed in {phase}: {reason}")]
    BuildFailed { phase: &'static str, reason: String },

    #[error(transparent)]
    Publish(#[from] SwapError),

    #[error(transparent)]
    Governor(#[from] GovernorError),
}

/// Outcome of one cycle trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The cycle ran to completion; versions of anything published.
    Completed {
        model_version: Option<u64>,
        script_version: Option<u64>,
    },
    /// Another instance was already running; this trigger was dropped.
    SkippedBusy,
    /// The cadence interval has not elapsed since the last completed run.
    SkippedCooldown,
    /// Cancelled cooperatively (or by supervised abort) at a phase boundary.
    Cancelled { phase: &'static str },
}

/// Produces fresh artifacts from accumulated experience.
///
/// `Ok(None)` means "nothing new this cycle" and skips the publish for that
/// artifact.
pub trait ImprovementSource: Send + Sync {
    fn build_model(&self) -> Result<Option<ModelArtifact>, String>;
    fn build_scripts(&self) -> Result<Option<ScriptSet>, String>;
}

/// The long-running improvement cycle harness.
pub struct ImprovementCycle {
    governor: LockGovernor,
    publisher: GovernedPublisher,
    source: Arc<dyn ImprovementSource>,
    cancel: CancelFlag,
    cadence: Duration,
    last_completed: Mutex<Option<Instant>>,
}

impl ImprovementCycle {
    pub fn new(
        governor: LockGovernor,
        store: SharedArtifactStore,
        source: Arc<dyn ImprovementSource>,
        cadence: Duration,
        lock_wait: Duration,
    ) -> Self {
        let publisher = GovernedPublisher::new(store, governor.clone(), lock_wait);
        Self {
            governor,
            publisher,
            source,
            cancel: CancelFlag::new(),
            cadence,
            last_completed: Mutex::new(None),
        }
    }

    /// The cancellation flag, for watchdog registration or manual aborts.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Trigger one cycle run. Returns immediately with a skip outcome when
    /// another instance holds the slot or the cadence has not elapsed.
    pub fn run(&self) -> Result<CycleOutcome, CycleError> {
        if let Ok(last) = self.last_completed.lock() {
            if let Some(at) = *last {
                if at.elapsed() < self.cadence {
                    debug!("Improvement cycle skipped: cadence not elapsed");
                    return Ok(CycleOutcome::SkippedCooldown);
                }
            }
        }

        let Some(ticket) = self
            .governor
            .try_acquire(Subsystem::ImprovementCycle, "improvement_cycle::run")?
        else {
            debug!("Improvement cycle skipped: another instance active");
            return Ok(CycleOutcome::SkippedBusy);
        };

        info!("Improvement cycle started");

        // Phase: rebuild the learned model.
        if self.cancel.is_cancelled() {
            return self.cancelled("build_model");
        }
        let model = self
            .source
            .build_model()
            .map_err(|reason| CycleError::BuildFailed {
                phase: "build_model",
                reason,
            })?;

        // Phase: regenerate strategic scripts.
        if self.cancel.is_cancelled() {
            return self.cancelled("build_scripts");
        }
        let scripts = self
            .source
            .build_scripts()
            .map_err(|reason| CycleError::BuildFailed {
                phase: "build_scripts",
                reason,
            })?;

        // The swap locks rank below the cycle slot, so the slot must be
        // released before publishing anything.
        drop(ticket);

        if self.cancel.is_cancelled() {
            return self.cancelled("publish_model");
        }
        let model_version = match model {
            Some(model) => Some(self.publisher.publish_model(model)?),
            None => None,
        };

        if self.cancel.is_cancelled() {
            return self.cancelled("publish_scripts");
        }
        let script_version = match scripts {
            Some(scripts) => Some(self.publisher.publish_scripts(scripts)?),
            None => None,
        };

        if let Ok(mut last) = self.last_completed.lock() {
            *last = Some(Instant::now());
        }
        info!(?model_version, ?script_version, "Improvement cycle completed");
        Ok(CycleOutcome::Completed {
            model_version,
            script_version,
        })
    }

    fn cancelled(&self, phase: &'static str) -> Result<CycleOutcome, CycleError> {
        warn!(phase, "Improvement cycle cancelled");
        // A consumed cancellation does not bleed into the next run.
        self.cancel.reset();
        Ok(CycleOutcome::Cancelled { phase })
    }
}
