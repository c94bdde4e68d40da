//! Decision coordination: the tier escalation loop and its statistics.

pub mod engine;

pub use engine::{DecisionCoordinator, DecisionStats, TierStats};
