//! Rule tier: deterministic tactical decisions.
//!
//! Non-emergency healing, target selection and attack choice, and
//! repositioning toward a known safe spot. Declines when nothing tactical
//! applies.

use crate::artifacts::store::ArtifactHandles;
use crate::predictor::{Prediction, PredictorError, TierPredictor};
use crate::snapshot::{Action, ActionKind, Monster, Snapshot, Tier};
use async_trait::async_trait;
use std::time::Duration;

/// Tactical rule predictor.
#[derive(Debug, Clone)]
pub struct RulePredictor {
    /// Heal when HP drops below this ratio (non-emergency comfort heal).
    pub heal_below: f64,
    /// Minimum SP ratio to spend on skill attacks.
    pub sp_skill_floor: f64,
    /// Maximum distance at which a target is engaged.
    pub engage_range: u32,
}

impl Default for RulePredictor {
    fn default() -> Self {
        Self {
            heal_below: 0.6,
            sp_skill_floor: 0.3,
            engage_range: 10,
        }
    }
}

impl RulePredictor {
    /// Prefer aggressive monsters, then proximity, then low remaining HP.
    fn best_target<'a>(&self, snapshot: &'a Snapshot) -> Option<&'a Monster> {
        snapshot
            .monsters
            .iter()
            .filter(|m| m.distance <= self.engage_range)
            .min_by_key(|m| (!m.is_aggressive, m.distance, m.hp))
    }
}

#[async_trait]
impl TierPredictor for RulePredictor {
    fn tier(&self) -> Tier {
        Tier::Rule
    }

    async fn try_decide(
        &self,
        handles: &ArtifactHandles,
        snapshot: &Snapshot,
        _budget: Duration,
    ) -> Result<Option<Prediction>, PredictorError> {
        // Comfort heal before committing to a fight.
        if snapshot.character.max_hp > 0 && snapshot.hp_ratio() < self.heal_below {
            return Ok(Some(Prediction {
                action: Action::with_param(
                    ActionKind::UseItem,
                    "item",
                    "Red Potion",
                    "topping up HP before engaging",
                ),
                confidence: 0.75,
                rationale: "hp below comfort threshold".to_string(),
            }));
        }

        if let Some(target) = self.best_target(snapshot) {
            let use_skill = snapshot.sp_ratio() > self.sp_skill_floor;
            let mut action = if use_skill {
                Action::with_param(
                    ActionKind::Skill,
                    "skill",
                    "Bash",
                    format!("skill attack on {}", target.name),
                )
            } else {
                Action::with_param(
                    ActionKind::Attack,
                    "target",
                    &target.id,
                    format!("basic attack on {}", target.name),
                )
            };
            action.parameters.insert("target".to_string(), target.id.clone());
            return Ok(Some(Prediction {
                action,
                confidence: 0.8,
                rationale: format!("engaging target {}", target.name),
            }));
        }

        // No engageable target but aggression nearby: move to a known safe
        // spot on the current map, if the world view has one.
        if snapshot.under_attack(self.engage_range * 2) {
            if let Some(spot) = handles
                .world
                .safe_spots
                .iter()
                .find(|p| p.map == snapshot.character.position.map)
            {
                let mut action = Action::with_param(
                    ActionKind::Move,
                    "x",
                    &spot.x.to_string(),
                    "repositioning to safe spot",
                );
                action.parameters.insert("y".to_string(), spot.y.to_string());
                action.parameters.insert("map".to_string(), spot.map.clone());
                return Ok(Some(Prediction {
                    action,
                    confidence: 0.7,
                    rationale: "repositioning away from aggression".to_string(),
                }));
            }
        }

        Ok(None)
    }
}
