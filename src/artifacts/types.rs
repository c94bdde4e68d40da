//! Artifact content types and validation.

use crate::config::EngineConfig;
use crate::snapshot::Position;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of snapshot features a model row scores over.
///
/// Order: hp_ratio, sp_ratio, weight_ratio, monster_count, nearest_distance,
/// aggressive_count.
pub const MODEL_FEATURE_COUNT: usize = 6;

/// The kinds of shared artifact the store manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    WorldState,
    Model,
    ScriptSet,
    Config,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WorldState => write!(f, "world_state"),
            Self::Model => write!(f, "model"),
            Self::ScriptSet => write!(f, "script_set"),
            Self::Config => write!(f, "config"),
        }
    }
}

/// Content that can be published into a versioned slot.
///
/// Validation runs *before* the swap lock is taken; rejected content never
/// displaces the current version.
pub trait ArtifactContent: Send + Sync + 'static {
    fn kind() -> ArtifactKind;
    fn validate(&self) -> Result<(), String>;
}

/// Supplemental world knowledge refreshed out-of-band (map metadata the raw
/// per-tick snapshot does not carry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldStateView {
    pub map: String,
    /// Known safe positions on this map, best first.
    pub safe_spots: Vec<Position>,
    /// Aggregate danger estimate for the map in [0, 1].
    pub danger_level: f64,
    pub refreshed_at: DateTime<Utc>,
}

impl WorldStateView {
    pub fn empty() -> Self {
        Self {
            map: "unknown".to_string(),
            safe_spots: Vec::new(),
            danger_level: 0.0,
            refreshed_at: Utc::now(),
        }
    }
}

impl ArtifactContent for WorldStateView {
    fn kind() -> ArtifactKind {
        ArtifactKind::WorldState
    }

    fn validate(&self) -> Result<(), String> {
        if self.map.is_empty() {
            return Err("world view has empty map name".to_string());
        }
        if !(0.0..=1.0).contains(&self.danger_level) {
            return Err(format!("danger_level {} outside [0, 1]", self.danger_level));
        }
        Ok(())
    }
}

/// Learned-model weights exported by the offline trainer.
///
/// One weight row per action label, each row scoring the snapshot feature
/// vector. An empty model is valid and means "the learned tier declines".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub name: String,
    pub action_labels: Vec<String>,
    /// `action_labels.len()` rows of `MODEL_FEATURE_COUNT` weights.
    pub weights: Vec<Vec<f64>>,
    pub sample_count: u64,
    pub trained_at: DateTime<Utc>,
}

impl ModelArtifact {
    /// The untrained placeholder model.
    pub fn empty() -> Self {
        Self {
            name: "untrained".to_string(),
            action_labels: Vec::new(),
            weights: Vec::new(),
            sample_count: 0,
            trained_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

impl ArtifactContent for ModelArtifact {
    fn kind() -> ArtifactKind {
        ArtifactKind::Model
    }

    fn validate(&self) -> Result<(), String> {
        if self.weights.len() != self.action_labels.len() {
            return Err(format!(
                "{} weight rows for {} labels",
                self.weights.len(),
                self.action_labels.len()
            ));
        }
        for (label, row) in self.action_labels.iter().zip(&self.weights) {
            if label.is_empty() {
                return Err("empty action label".to_string());
            }
            if row.len() != MODEL_FEATURE_COUNT {
                return Err(format!(
                    "label '{}' has {} weights, expected {}",
                    label,
                    row.len(),
                    MODEL_FEATURE_COUNT
                ));
            }
            if row.iter().any(|w| !w.is_finite()) {
                return Err(format!("label '{}' has non-finite weight", label));
            }
        }
        Ok(())
    }
}

/// Condition under which a generated script applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptTrigger {
    /// Applies on every consultation.
    Always,
    /// Applies when the character level is a multiple of `every`.
    LevelMilestone { every: u32 },
    /// Applies on a specific map.
    MapIs { map: String },
}

/// One generated strategic script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    pub name: String,
    pub trigger: ScriptTrigger,
    /// Command directive handed to the executor when the script fires.
    pub directive: String,
}

/// The active set of generated scripts consulted by the strategic tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptSet {
    pub scripts: Vec<Script>,
    pub generated_at: DateTime<Utc>,
}

impl ScriptSet {
    pub fn empty() -> Self {
        Self {
            scripts: Vec::new(),
            generated_at: Utc::now(),
        }
    }
}

impl ArtifactContent for ScriptSet {
    fn kind() -> ArtifactKind {
        ArtifactKind::ScriptSet
    }

    fn validate(&self) -> Result<(), String> {
        for script in &self.scripts {
            if script.name.is_empty() {
                return Err("script with empty name".to_string());
            }
            if script.directive.is_empty() {
                return Err(format!("script '{}' has empty directive", script.name));
            }
            if let ScriptTrigger::LevelMilestone { every: 0 } = script.trigger {
                return Err(format!("script '{}' has zero milestone interval", script.name));
            }
        }
        Ok(())
    }
}

impl ArtifactContent for EngineConfig {
    fn kind() -> ArtifactKind {
        ArtifactKind::Config
    }

    fn validate(&self) -> Result<(), String> {
        EngineConfig::validate(self).map_err(|e| e.to_string())
    }
}
