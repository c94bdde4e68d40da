//! The escalation loop.
//!
//! `decide()` is the single entry point for the per-frame decision path. It
//! pins the current artifact versions once, runs the reflex tier, then walks
//! the remaining tiers in ascending cost order until one clears its
//! confidence threshold or the deadline budget runs out. It is infallible:
//! every call produces a response, with a static safe fallback at the bottom.

use crate::artifacts::store::SharedArtifactStore;
use crate::metrics::{DecisionRecord, MetricsSink};
use crate::predictor::{PredictorAdapter, Prediction, TierHealth, TierOutcome, TierPredictor};
use crate::snapshot::{Action, DecisionRequest, DecisionResponse, Tier};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Rolling per-tier decision statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierStats {
    /// Decisions this tier produced (i.e. it was the tier in the response).
    pub decisions: u64,
    /// Rolling average wall-clock latency of those decisions, in ms.
    pub avg_latency_ms: f64,
}

impl TierStats {
    fn record(&mut self, elapsed: Duration) {
        self.decisions += 1;
        let n = self.decisions as f64;
        let sample = elapsed.as_secs_f64() * 1000.0;
        self.avg_latency_ms = (self.avg_latency_ms * (n - 1.0) + sample) / n;
    }
}

/// Aggregate statistics across all decisions since construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionStats {
    pub total: u64,
    pub fallbacks: u64,
    pub reflex: TierStats,
    pub rule: TierStats,
    pub learned: TierStats,
    pub strategic: TierStats,
}

impl DecisionStats {
    fn tier_mut(&mut self, tier: Tier) -> &mut TierStats {
        match tier {
            Tier::Reflex => &mut self.reflex,
            Tier::Rule => &mut self.rule,
            Tier::Learned => &mut self.learned,
            Tier::Strategic => &mut self.strategic,
        }
    }
}

/// Coordinates the four tiers over the shared artifact store.
pub struct DecisionCoordinator {
    store: SharedArtifactStore,
    // Ascending tier order; index matches Tier::all().
    adapters: [PredictorAdapter; 4],
    metrics: MetricsSink,
    stats: Mutex<DecisionStats>,
}

impl DecisionCoordinator {
    pub fn new(
        store: SharedArtifactStore,
        reflex: Arc<dyn TierPredictor>,
        rule: Arc<dyn TierPredictor>,
        learned: Arc<dyn TierPredictor>,
        strategic: Arc<dyn TierPredictor>,
        metrics: MetricsSink,
    ) -> Self {
        Self {
            store,
            adapters: [
                PredictorAdapter::new(reflex),
                PredictorAdapter::new(rule),
                PredictorAdapter::new(learned),
                PredictorAdapter::new(strategic),
            ],
            metrics,
            stats: Mutex::new(DecisionStats::default()),
        }
    }

    fn adapter(&self, tier: Tier) -> &PredictorAdapter {
        &self.adapters[tier as usize]
    }

    /// Run one decision. Never fails and never exceeds `request.deadline`
    /// by more than one tier's hard timeout.
    pub async fn decide(&self, request: DecisionRequest) -> DecisionResponse {
        let start = Instant::now();

        let (config, handles) = match (self.store.acquire_config(), self.store.acquire_all()) {
            (Ok(c), Ok(h)) => (c, h),
            _ => {
                warn!(request_id = %request.id, "Artifact store unavailable, falling back");
                return self.finish_fallback(&request, start, "artifact store unavailable");
            }
        };

        if request.deadline.is_zero() {
            return self.finish_fallback(&request, start, "deadline exhausted before evaluation");
        }

        let mut notes: Vec<String> = Vec::new();
        let mut best: Option<(Tier, Prediction)> = None;

        // Reflex always runs first. A reflex hit is a safety override and is
        // reported at full confidence regardless of the predictor's own score.
        let reflex_budget = config.tier(Tier::Reflex).timeout().min(request.deadline);
        let called_at = Instant::now();
        match self
            .adapter(Tier::Reflex)
            .call(&handles, &request.snapshot, reflex_budget)
            .await
        {
            TierOutcome::Decided(prediction) => {
                let rationale = prediction.rationale.clone();
                return self.finish(&request, start, Tier::Reflex, prediction.action, 1.0, rationale);
            }
            outcome => notes.push(format!(
                "reflex: {} in {}ms",
                outcome_note(&outcome),
                called_at.elapsed().as_millis()
            )),
        }

        let mut tier = Some(config.starting_tier(request.priority));
        while let Some(current) = tier {
            let params = config.tier(current);
            let remaining = request.deadline.saturating_sub(start.elapsed());
            if remaining < params.estimated_cost() {
                notes.push(format!("{current}: skipped, insufficient budget"));
                break;
            }

            let budget = remaining.min(params.timeout());
            let called_at = Instant::now();
            let outcome = self
                .adapter(current)
                .call(&handles, &request.snapshot, budget)
                .await;
            let tier_ms = called_at.elapsed().as_millis();
            match outcome {
                TierOutcome::Decided(prediction) => {
                    if prediction.confidence >= params.confidence_threshold {
                        let confidence = prediction.confidence;
                        let mut rationale = prediction.rationale.clone();
                        if !notes.is_empty() {
                            rationale = format!("{}; {rationale}", notes.join("; "));
                        }
                        return self.finish(
                            &request,
                            start,
                            current,
                            prediction.action,
                            confidence,
                            rationale,
                        );
                    }
                    notes.push(format!(
                        "{current}: below threshold ({:.2} < {:.2}) in {tier_ms}ms",
                        prediction.confidence, params.confidence_threshold
                    ));
                    let better = best
                        .as_ref()
                        .map_or(true, |(_, b)| prediction.confidence > b.confidence);
                    if better {
                        best = Some((current, prediction));
                    }
                }
                other => notes.push(format!("{current}: {} in {tier_ms}ms", outcome_note(&other))),
            }
            tier = current.next();
        }

        // No tier cleared its threshold. Use the best under-threshold
        // candidate if one exists; otherwise the static safe fallback.
        if let Some((tier, prediction)) = best {
            debug!(request_id = %request.id, %tier, "Using best under-threshold candidate");
            let rationale = format!(
                "{}; best candidate: {}",
                notes.join("; "),
                prediction.rationale
            );
            return self.finish(
                &request,
                start,
                tier,
                prediction.action,
                prediction.confidence,
                rationale,
            );
        }

        let rationale = notes.join("; ");
        self.finish_fallback(&request, start, &rationale)
    }

    fn finish(
        &self,
        request: &DecisionRequest,
        start: Instant,
        tier: Tier,
        action: Action,
        confidence: f64,
        rationale: String,
    ) -> DecisionResponse {
        let elapsed = start.elapsed();
        self.account(request, tier, elapsed, confidence, false);
        info!(
            request_id = %request.id,
            %tier,
            elapsed_ms = elapsed.as_millis() as u64,
            confidence,
            "Decision made"
        );
        DecisionResponse {
            request_id: request.id.clone(),
            action,
            tier_used: tier,
            elapsed,
            confidence,
            rationale,
            fallback: false,
        }
    }

    fn finish_fallback(
        &self,
        request: &DecisionRequest,
        start: Instant,
        rationale: &str,
    ) -> DecisionResponse {
        let elapsed = start.elapsed();
        self.account(request, Tier::Rule, elapsed, 0.0, true);
        warn!(
            request_id = %request.id,
            elapsed_ms = elapsed.as_millis() as u64,
            "No tier produced an action, using safe fallback"
        );
        DecisionResponse {
            request_id: request.id.clone(),
            action: Action::none("safe fallback: hold position"),
            tier_used: Tier::Rule,
            elapsed,
            confidence: 0.0,
            rationale: format!("fallback: {rationale}"),
            fallback: true,
        }
    }

    fn account(
        &self,
        request: &DecisionRequest,
        tier: Tier,
        elapsed: Duration,
        confidence: f64,
        fallback: bool,
    ) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.total += 1;
            if fallback {
                stats.fallbacks += 1;
            } else {
                stats.tier_mut(tier).record(elapsed);
            }
        }
        self.metrics.record(DecisionRecord {
            request_id: request.id.clone(),
            tier_used: tier,
            elapsed_ms: elapsed.as_millis() as u64,
            confidence,
            fallback,
            recorded_at: Utc::now(),
        });
    }

    /// Snapshot of aggregate decision statistics.
    pub fn stats(&self) -> DecisionStats {
        self.stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Per-tier adapter health counters.
    pub fn tier_health(&self) -> Vec<(Tier, TierHealth)> {
        self.adapters
            .iter()
            .map(|a| (a.tier(), a.health()))
            .collect()
    }
}

fn outcome_note(outcome: &TierOutcome) -> &'static str {
    match outcome {
        TierOutcome::Decided(_) => "decided",
        TierOutcome::Declined => "declined",
        TierOutcome::TimedOut => "timed out",
        TierOutcome::Faulted => "faulted",
    }
}
