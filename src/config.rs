//! Engine configuration.
//!
//! Per-tier confidence thresholds and time budgets, global deadline defaults,
//! lock-wait bounds, watchdog thresholds, and the improvement-cycle cadence.
//! The config is itself a publishable artifact: hot reload goes through the
//! same versioned swap as model and script updates, so a new config applies
//! atomically to subsequent decisions.

use crate::snapshot::{Priority, Tier};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
}

/// Budget and threshold parameters for one tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierParams {
    /// Confidence at or above which the tier's result is accepted.
    pub confidence_threshold: f64,
    /// Hard per-call timeout in milliseconds.
    pub timeout_ms: u64,
    /// Estimated cost used to decide whether escalation is still worthwhile.
    pub estimated_cost_ms: u64,
}

impl TierParams {
    /// Hard timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Estimated cost as a `Duration`.
    pub fn estimated_cost(&self) -> Duration {
        Duration::from_millis(self.estimated_cost_ms)
    }
}

/// Full engine configuration. Fields omitted from a config file keep their
/// defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub reflex: TierParams,
    pub rule: TierParams,
    pub learned: TierParams,
    pub strategic: TierParams,
    /// Deadline applied when a request supplies none.
    pub default_deadline_ms: u64,
    /// Bound on any single governor lock wait.
    pub lock_wait_ms: u64,
    /// How often the watchdog scans held locks.
    pub watchdog_interval_ms: u64,
    /// Held-lock age at which the watchdog reports a deadlock risk.
    pub held_too_long_ms: u64,
    /// Minimum seconds between improvement-cycle runs.
    pub cycle_cadence_secs: u64,
    /// Minimum interval between strategic-tier consultations.
    pub strategic_min_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            // Latency targets: reflex <1ms, rules <10ms, learned <100ms,
            // strategic bounded by the remaining decision budget.
            reflex: TierParams {
                confidence_threshold: 0.9,
                timeout_ms: 5,
                estimated_cost_ms: 1,
            },
            rule: TierParams {
                confidence_threshold: 0.7,
                timeout_ms: 20,
                estimated_cost_ms: 5,
            },
            learned: TierParams {
                confidence_threshold: 0.7,
                timeout_ms: 150,
                estimated_cost_ms: 50,
            },
            strategic: TierParams {
                confidence_threshold: 0.6,
                timeout_ms: 5_000,
                estimated_cost_ms: 500,
            },
            default_deadline_ms: 1_000,
            lock_wait_ms: 250,
            watchdog_interval_ms: 500,
            held_too_long_ms: 10_000,
            cycle_cadence_secs: 300,
            strategic_min_interval_ms: 30_000,
        }
    }
}

impl EngineConfig {
    /// Parse a config from TOML text and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file.
    pub fn from_toml_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// Parameters for a tier.
    pub fn tier(&self, tier: Tier) -> &TierParams {
        match tier {
            Tier::Reflex => &self.reflex,
            Tier::Rule => &self.rule,
            Tier::Learned => &self.learned,
            Tier::Strategic => &self.strategic,
        }
    }

    /// Starting tier after the unconditional reflex check.
    ///
    /// A hint only: in the four-tier ladder every priority starts at Rule,
    /// since Reflex is never skipped and Rule is the cheapest remaining tier.
    pub fn starting_tier(&self, priority: Priority) -> Tier {
        match priority {
            Priority::Critical | Priority::High => Tier::Rule,
            Priority::Normal | Priority::Low => Tier::Rule,
        }
    }

    /// Default decision deadline.
    pub fn default_deadline(&self) -> Duration {
        Duration::from_millis(self.default_deadline_ms)
    }

    /// Bound on governor lock waits.
    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }

    /// Minimum spacing between strategic tier consultations.
    pub fn strategic_min_interval(&self) -> Duration {
        Duration::from_millis(self.strategic_min_interval_ms)
    }

    /// Reject out-of-range thresholds and zero budgets.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for tier in Tier::all() {
            let params = self.tier(*tier);
            if !(0.0..=1.0).contains(&params.confidence_threshold) {
                return Err(ConfigError::Invalid(format!(
                    "{} confidence_threshold {} outside [0, 1]",
                    tier, params.confidence_threshold
                )));
            }
            if params.timeout_ms == 0 {
                return Err(ConfigError::Invalid(format!("{} timeout_ms is zero", tier)));
            }
        }
        if self.lock_wait_ms == 0 {
            return Err(ConfigError::Invalid("lock_wait_ms is zero".to_string()));
        }
        if self.watchdog_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "watchdog_interval_ms is zero".to_string(),
            ));
        }
        Ok(())
    }
}
