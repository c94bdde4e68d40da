//! Learned tier: linear scoring against the current model artifact.
//!
//! Scores each action label of the active [`ModelArtifact`] over a fixed
//! snapshot feature vector and proposes the best-scoring label, with a
//! logistic squash as confidence. Declines when the model is empty or the
//! best score is not positive.

use crate::artifacts::store::ArtifactHandles;
use crate::artifacts::types::MODEL_FEATURE_COUNT;
use crate::predictor::{Prediction, PredictorError, TierPredictor};
use crate::snapshot::{Action, ActionKind, Snapshot, Tier};
use async_trait::async_trait;
use std::time::Duration;

/// Learned-model predictor. Stateless; all state lives in the artifact.
#[derive(Debug, Clone, Default)]
pub struct LearnedPredictor;

/// Snapshot feature vector the trainer exports weights for.
pub fn features(snapshot: &Snapshot) -> [f64; MODEL_FEATURE_COUNT] {
    let nearest = snapshot
        .monsters
        .iter()
        .map(|m| m.distance)
        .min()
        .unwrap_or(20);
    let aggressive = snapshot.monsters.iter().filter(|m| m.is_aggressive).count();
    [
        snapshot.hp_ratio(),
        snapshot.sp_ratio(),
        snapshot.weight_ratio(),
        (snapshot.monsters.len().min(10) as f64) / 10.0,
        (nearest.min(20) as f64) / 20.0,
        (aggressive.min(10) as f64) / 10.0,
    ]
}

fn label_action(label: &str, snapshot: &Snapshot) -> Action {
    match label {
        "attack" => {
            let target = snapshot
                .monsters
                .iter()
                .min_by_key(|m| m.distance)
                .map(|m| m.id.clone())
                .unwrap_or_default();
            Action::with_param(ActionKind::Attack, "target", &target, "model: attack")
        }
        "heal" => Action::with_param(ActionKind::UseItem, "item", "Red Potion", "model: heal"),
        "rest" => Action {
            kind: ActionKind::Sit,
            parameters: Default::default(),
            reason: "model: rest".to_string(),
        },
        other => Action::with_param(ActionKind::Command, "command", other, "model directive"),
    }
}

#[async_trait]
impl TierPredictor for LearnedPredictor {
    fn tier(&self) -> Tier {
        Tier::Learned
    }

    async fn try_decide(
        &self,
        handles: &ArtifactHandles,
        snapshot: &Snapshot,
        _budget: Duration,
    ) -> Result<Option<Prediction>, PredictorError> {
        let model = &handles.model;
        if model.is_empty() {
            return Ok(None);
        }

        let feats = features(snapshot);
        let mut best: Option<(&str, f64)> = None;
        for (label, row) in model.action_labels.iter().zip(&model.weights) {
            let score: f64 = row.iter().zip(feats.iter()).map(|(w, f)| w * f).sum();
            match best {
                Some((_, s)) if score <= s => {}
                _ => best = Some((label, score)),
            }
        }

        let Some((label, score)) = best else {
            return Ok(None);
        };
        if score <= 0.0 {
            return Ok(None);
        }

        // Logistic squash into (0.5, 1) for positive scores.
        let confidence = 1.0 / (1.0 + (-score).exp());
        Ok(Some(Prediction {
            action: label_action(label, snapshot),
            confidence,
            rationale: format!("model '{}' chose '{}' (score {:.3})", model.name, label, score),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::store::ArtifactStore;
    use crate::artifacts::types::ModelArtifact;
    use crate::snapshot::{CharacterState, Monster};
    use chrono::Utc;

    fn model(labels: &[&str], rows: Vec<Vec<f64>>) -> ModelArtifact {
        ModelArtifact {
            name: "test-model".to_string(),
            action_labels: labels.iter().map(|s| s.to_string()).collect(),
            weights: rows,
            sample_count: 100,
            trained_at: Utc::now(),
        }
    }

    fn combat_snapshot() -> Snapshot {
        let mut snapshot = Snapshot::new(CharacterState {
            hp: 800,
            max_hp: 1000,
            sp: 150,
            max_sp: 300,
            ..CharacterState::default()
        });
        snapshot.monsters.push(Monster {
            id: "m9".to_string(),
            name: "Orc".to_string(),
            hp: 200,
            max_hp: 200,
            distance: 4,
            is_aggressive: true,
        });
        snapshot
    }

    #[tokio::test]
    async fn test_declines_on_empty_model() {
        let store = ArtifactStore::default();
        let result = LearnedPredictor
            .try_decide(
                &store.acquire_all().unwrap(),
                &combat_snapshot(),
                Duration::from_millis(10),
            )
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_best_label_wins() {
        let store = ArtifactStore::default();
        store
            .publish_model(model(
                &["attack", "heal"],
                vec![
                    vec![2.0, 0.0, 0.0, 1.0, 0.0, 1.0], // favors combat features
                    vec![0.1, 0.0, 0.0, 0.0, 0.0, 0.0],
                ],
            ))
            .unwrap();

        let prediction = LearnedPredictor
            .try_decide(
                &store.acquire_all().unwrap(),
                &combat_snapshot(),
                Duration::from_millis(10),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prediction.action.kind, ActionKind::Attack);
        assert_eq!(prediction.action.parameters["target"], "m9");
        assert!(prediction.confidence > 0.5);
    }

    #[tokio::test]
    async fn test_non_positive_scores_decline() {
        let store = ArtifactStore::default();
        store
            .publish_model(model(&["attack"], vec![vec![-1.0; MODEL_FEATURE_COUNT]]))
            .unwrap();

        let result = LearnedPredictor
            .try_decide(
                &store.acquire_all().unwrap(),
                &combat_snapshot(),
                Duration::from_millis(10),
            )
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
