// src/scoring/mod.rs
//! Intent scoring.
//!
//! - `lifecycle` – age windows and maintenance urgency
//! - `baseline`  – weighted decaying signals + lifecycle + interactions + recency
//! - `trade`     – additive per-trade boosts on top of the baseline
//! - `service`   – single/batch scoring, rescoring job, persistence

pub mod baseline;
pub mod lifecycle;
pub mod service;
pub mod trade;

use crate::features::FeatureSet;
use lifecycle::LifecycleStage;
use crate::model::{PropertyId, ScoreRecord, Trade};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub use baseline::BaselineScorer;
pub use service::{RecalcSummary, ScoreOutcome, ScoringService};

/// Named contributions behind a score. Trade fields are only present when the
/// matching scorer ran and the boost fired.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub violation_score: f64,
    pub request_score: f64,
    pub lifecycle_score: f64,
    pub interaction_score: f64,
    pub recency_boost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roof_violation_boost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hail_boost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_window_boost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hvac_request_boost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seasonal_boost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub siding_violation_boost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_boost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub electrical_request_boost: Option<f64>,
}

/// Scored property: bounded score, breakdown, and the features it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreResult {
    pub property_id: PropertyId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade: Option<Trade>,
    pub score: f64,
    pub components: ScoreComponents,
    pub lifecycle_stage: LifecycleStage,
    /// Age inside the default 15-25 year major-replacement window.
    pub in_maintenance_window: bool,
    pub features: FeatureSet,
    pub address: Option<String>,
    pub zip_code: Option<String>,
    pub market_value: Option<f64>,
    pub as_of: NaiveDate,
}

impl ScoreResult {
    pub fn to_record(&self, scored_at: DateTime<Utc>) -> ScoreRecord {
        ScoreRecord {
            property_id: self.property_id,
            trade: self.trade,
            score: self.score,
            components: self.components.clone(),
            scored_at,
        }
    }
}

pub(crate) fn round_to(x: f64, decimals: i32) -> f64 {
    let f = 10f64.powi(decimals);
    (x * f).round() / f
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_components_are_omitted_when_absent() {
        let c = ScoreComponents {
            violation_score: 0.5,
            hail_boost: Some(0.4),
            ..Default::default()
        };
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["hail_boost"], 0.4);
        assert!(v.get("wind_boost").is_none());
        assert_eq!(v["recency_boost"], 0.0);
    }

    #[test]
    fn rounding() {
        assert_eq!(round_to(0.123456, 4), 0.1235);
        assert_eq!(round_to(12.3456, 2), 12.35);
    }
}
