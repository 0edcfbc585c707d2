// src/scoring/baseline.rs
//! Baseline intent score.
//!
//! score = 0.30·violation + 0.25·request + 0.15·lifecycle + 0.10·interaction
//!         (+0.10 when any signal is within the recency window)
//!
//! Weights sum to 0.8; the remainder is headroom for recency and trade boosts.

use super::lifecycle::lifecycle_score;
use super::ScoreComponents;
use crate::config::ScoringConfig;
use crate::decay::{Aggregation, SignalDecay};
use crate::features::{FeatureSet, PropertyContext};
use crate::model::Trade;

#[derive(Debug, Clone)]
pub struct BaselineScorer {
    cfg: ScoringConfig,
    decay: SignalDecay,
}

impl BaselineScorer {
    pub fn new(cfg: ScoringConfig, decay: SignalDecay) -> Self {
        Self { cfg, decay }
    }

    pub fn decay(&self) -> &SignalDecay {
        &self.decay
    }

    /// Decayed sum normalised into [0, 1].
    fn signal_score<I>(&self, dates: I, ctx: &PropertyContext) -> f64
    where
        I: IntoIterator<Item = Option<chrono::NaiveDate>>,
    {
        let sum = self
            .decay
            .decay_for_property(dates, 1.0, Aggregation::Sum, ctx.as_of);
        (sum / self.cfg.signal_normalizer).min(1.0)
    }

    /// Clamped to [0, 1] but not rounded; trade boosts are added on top.
    pub fn score(
        &self,
        ctx: &PropertyContext,
        features: &FeatureSet,
        trade: Option<Trade>,
    ) -> (f64, ScoreComponents) {
        let violation_score =
            self.signal_score(ctx.violations.iter().map(|v| v.violation_date), ctx);
        let request_score = self.signal_score(ctx.requests.iter().map(|r| r.requested_date), ctx);
        let lifecycle = lifecycle_score(
            ctx.age(),
            ctx.property.years_since_improvement(ctx.as_of),
            trade,
        );
        let interaction_score = features
            .interaction
            .as_ref()
            .map(|i| (i.weighted_sum() / self.cfg.interaction_normalizer).min(1.0))
            .unwrap_or(0.0);

        let mut score = violation_score * self.cfg.violation_weight
            + request_score * self.cfg.request_weight
            + lifecycle * self.cfg.lifecycle_weight
            + interaction_score * self.cfg.interaction_weight;

        let recent = features
            .temporal
            .as_ref()
            .is_some_and(|t| t.has_recent_violation || t.has_recent_request);
        let recency_boost = if recent { self.cfg.recency_boost } else { 0.0 };
        score = (score + recency_boost).clamp(0.0, 1.0);

        let components = ScoreComponents {
            violation_score,
            request_score,
            lifecycle_score: lifecycle,
            interaction_score,
            recency_boost,
            ..Default::default()
        };
        (score, components)
    }
}
