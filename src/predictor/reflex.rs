//! Reflex tier: life-critical emergency reactions.
//!
//! Handles only true emergencies and declines everything else. Target latency
//! is sub-millisecond; everything here is straight-line checks over the
//! snapshot.

use crate::artifacts::store::ArtifactHandles;
use crate::predictor::{Prediction, PredictorError, TierPredictor};
use crate::snapshot::{Action, ActionKind, Snapshot, Tier};
use async_trait::async_trait;
use std::time::Duration;

const DANGEROUS_STATUSES: &[&str] = &[
    "Stunned",
    "Frozen",
    "Stone Curse",
    "Sleep",
    "Blind",
    "Silence",
];

/// Emergency predictor. Thresholds are ratios of the relevant maximum.
#[derive(Debug, Clone)]
pub struct ReflexPredictor {
    pub hp_critical: f64,
    pub hp_low: f64,
    pub sp_low: f64,
    pub overweight: f64,
    pub attack_range: u32,
}

impl Default for ReflexPredictor {
    fn default() -> Self {
        Self {
            hp_critical: 0.25,
            hp_low: 0.4,
            sp_low: 0.15,
            overweight: 0.9,
            attack_range: 5,
        }
    }
}

impl ReflexPredictor {
    fn emergency(&self, snapshot: &Snapshot) -> Option<Prediction> {
        // Priority order matters: HP first, then status, then logistics.
        if snapshot.character.max_hp > 0 && snapshot.hp_ratio() < self.hp_critical {
            return Some(prediction(
                Action::with_param(
                    ActionKind::UseItem,
                    "item",
                    "White Potion",
                    "HP critical, emergency healing",
                ),
                "hp below critical threshold",
            ));
        }

        if let Some(status) = snapshot
            .character
            .status_effects
            .iter()
            .find(|s| DANGEROUS_STATUSES.contains(&s.as_str()))
        {
            return Some(prediction(
                Action::with_param(
                    ActionKind::UseItem,
                    "item",
                    "Green Potion",
                    format!("dangerous status effect: {}", status),
                ),
                "dangerous status effect",
            ));
        }

        if snapshot.hp_ratio() < self.hp_low && snapshot.under_attack(self.attack_range) {
            return Some(prediction(
                Action::with_param(
                    ActionKind::UseItem,
                    "item",
                    "Red Potion",
                    "low HP while under attack",
                ),
                "low hp under attack",
            ));
        }

        if snapshot.character.max_weight > 0 && snapshot.weight_ratio() > self.overweight {
            return Some(prediction(
                Action::with_param(
                    ActionKind::Command,
                    "command",
                    "storage",
                    "overweight, storing items",
                ),
                "overweight",
            ));
        }

        if snapshot.character.max_sp > 0 && snapshot.sp_ratio() < self.sp_low {
            return Some(prediction(
                Action::with_param(
                    ActionKind::UseItem,
                    "item",
                    "Blue Potion",
                    "SP critically low",
                ),
                "sp critically low",
            ));
        }

        None
    }
}

fn prediction(action: Action, rationale: &str) -> Prediction {
    Prediction {
        action,
        confidence: 0.95,
        rationale: rationale.to_string(),
    }
}

#[async_trait]
impl TierPredictor for ReflexPredictor {
    fn tier(&self) -> Tier {
        Tier::Reflex
    }

    async fn try_decide(
        &self,
        _handles: &ArtifactHandles,
        snapshot: &Snapshot,
        _budget: Duration,
    ) -> Result<Option<Prediction>, PredictorError> {
        Ok(self.emergency(snapshot))
    }
}
