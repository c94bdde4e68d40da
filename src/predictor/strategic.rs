//! Strategic tier: rate-limited planner over the generated script set.
//!
//! Consultations are expensive, so the tier self-limits to one consult per
//! configured interval and declines in between. A consult looks for the first
//! script in the active [`ScriptSet`] whose trigger matches the snapshot and
//! proposes its directive.

use crate::artifacts::store::ArtifactHandles;
use crate::artifacts::types::ScriptTrigger;
use crate::predictor::{Prediction, PredictorError, TierPredictor};
use crate::snapshot::{Action, ActionKind, Snapshot, Tier};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Strategic planner predictor.
pub struct StrategicPredictor {
    min_interval: Duration,
    last_consult: Mutex<Option<Instant>>,
}

impl StrategicPredictor {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_consult: Mutex::new(None),
        }
    }

    fn trigger_matches(trigger: &ScriptTrigger, snapshot: &Snapshot) -> bool {
        match trigger {
            ScriptTrigger::Always => true,
            ScriptTrigger::LevelMilestone { every } => {
                *every > 0
                    && snapshot.character.level > 0
                    && snapshot.character.level % every == 0
            }
            ScriptTrigger::MapIs { map } => snapshot.character.position.map == *map,
        }
    }
}

#[async_trait]
impl TierPredictor for StrategicPredictor {
    fn tier(&self) -> Tier {
        Tier::Strategic
    }

    async fn try_decide(
        &self,
        handles: &ArtifactHandles,
        snapshot: &Snapshot,
        _budget: Duration,
    ) -> Result<Option<Prediction>, PredictorError> {
        let mut last = self.last_consult.lock().await;
        if let Some(at) = *last {
            if at.elapsed() < self.min_interval {
                debug!("Strategic tier rate-limited, declining");
                return Ok(None);
            }
        }

        let matched = handles
            .scripts
            .scripts
            .iter()
            .find(|s| Self::trigger_matches(&s.trigger, snapshot));

        let Some(script) = matched else {
            return Ok(None);
        };

        // A real consultation happened; start the rate-limit window.
        *last = Some(Instant::now());
        drop(last);

        Ok(Some(Prediction {
            action: Action::with_param(
                ActionKind::Command,
                "command",
                &script.directive,
                format!("strategic script '{}'", script.name),
            ),
            confidence: 0.9,
            rationale: format!("strategic planner selected script '{}'", script.name),
        }))
    }
}
