//! Real-time decision engine for an autonomous game-playing agent.
//!
//! This library provides:
//! - A four-tier escalation coordinator (reflex, rule, learned, strategic)
//!   that always answers within a per-request deadline
//! - A versioned shared artifact store with copy-on-publish reads, so the
//!   decision path never blocks on background publishers
//! - A rank-ordered lock governor with a watchdog for the background
//!   improvement cycle
//! - A fire-and-forget metrics sink for decision outcomes
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use agent_decision::{
//!     ArtifactStore, CharacterState, DecisionCoordinator, DecisionRequest, EngineConfig,
//!     LearnedPredictor, MetricsSink, Priority, ReflexPredictor, RulePredictor, Snapshot,
//!     StrategicPredictor,
//! };
//!
//! # async fn run() {
//! let config = EngineConfig::default();
//! let store = ArtifactStore::new(config.clone()).shared();
//! let (metrics, _receiver) = MetricsSink::channel();
//! let coordinator = DecisionCoordinator::new(
//!     store,
//!     Arc::new(ReflexPredictor::default()),
//!     Arc::new(RulePredictor::default()),
//!     Arc::new(LearnedPredictor::default()),
//!     Arc::new(StrategicPredictor::new(config.strategic_min_interval())),
//!     metrics,
//! );
//!
//! let snapshot = Snapshot::new(CharacterState::default());
//! let request = DecisionRequest::new(snapshot, Priority::Normal, Duration::from_millis(100));
//! let response = coordinator.decide(request).await;
//! println!("{} via {}", response.action.reason, response.tier_used);
//! # }
//! ```

pub mod artifacts;
pub mod config;
pub mod coordinator;
pub mod governor;
pub mod metrics;
pub mod predictor;
pub mod snapshot;

// Re-export key snapshot types
pub use snapshot::{
    Action, ActionKind, CharacterState, DecisionRequest, DecisionResponse, ItemStack, Monster,
    NearbyPlayer, Position, Priority, Snapshot, Tier,
};

// Re-export configuration types
pub use config::{ConfigError, EngineConfig, TierParams};

// Re-export key artifact types
pub use artifacts::store::{
    ArtifactHandles, ArtifactStore, GovernedPublisher, ReadHandle, SharedArtifactStore,
    StoreError, StoreResult, SwapError, Versioned,
};
pub use artifacts::types::{
    ArtifactContent, ArtifactKind, ModelArtifact, Script, ScriptSet, ScriptTrigger,
    WorldStateView,
};

// Re-export governor types
pub use governor::cycle::{
    CancelFlag, CycleError, CycleOutcome, ImprovementCycle, ImprovementSource,
};
pub use governor::order::{
    GovernorError, GovernorResult, HeldLock, LockGovernor, LockTicket, Subsystem,
};
pub use governor::watchdog::{LockWatchdog, RiskEvent, WatchdogConfig};

// Re-export predictor types
pub use predictor::{
    LearnedPredictor, Prediction, PredictorAdapter, PredictorError, ReflexPredictor,
    RulePredictor, StrategicPredictor, TierHealth, TierOutcome, TierPredictor,
};

// Re-export coordinator types
pub use coordinator::{DecisionCoordinator, DecisionStats, TierStats};

// Re-export metrics types
pub use metrics::{DecisionRecord, MetricsReceiver, MetricsSink};
