//! Tier predictors.
//!
//! All four tiers implement one interface: given read handles to the shared
//! artifacts and an immutable snapshot, try to produce an action within a
//! budget, or decline. Predictors must be safe to call from multiple decision
//! tasks concurrently and must not retain the snapshot beyond the call. The
//! adapter layer wraps every predictor with a hard timeout, confidence
//! clamping, and fault containment.

pub mod adapter;
pub mod learned;
pub mod reflex;
pub mod rule;
pub mod strategic;

use crate::artifacts::store::ArtifactHandles;
use crate::snapshot::{Action, Snapshot, Tier};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use adapter::{PredictorAdapter, TierHealth, TierOutcome};
pub use learned::LearnedPredictor;
pub use reflex::ReflexPredictor;
pub use rule::RulePredictor;
pub use strategic::StrategicPredictor;

/// A tier's proposed action with its self-reported confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub action: Action,
    /// Confidence in [0, 1]. Out-of-range values are clamped by the adapter.
    pub confidence: f64,
    pub rationale: String,
}

/// Error type raised by a predictor's internals. Contained at the adapter
/// boundary and treated as a decline.
#[derive(Debug, thiserror::Error)]
pub enum PredictorError {
    #[error("{0}")]
    Internal(String),
}

/// The uniform tier interface.
#[async_trait]
pub trait TierPredictor: Send + Sync {
    /// Which tier this predictor implements.
    fn tier(&self) -> Tier;

    /// Attempt a decision. `Ok(None)` is a normal decline. `budget` is a
    /// soft deadline; the adapter enforces a hard timeout on top of it.
    async fn try_decide(
        &self,
        handles: &ArtifactHandles,
        snapshot: &Snapshot,
        budget: Duration,
    ) -> Result<Option<Prediction>, PredictorError>;
}
