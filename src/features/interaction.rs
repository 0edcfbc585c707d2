// src/features/interaction.rs
//! Signal co-occurrence flags and exploratory cross products.

use super::PropertyContext;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Weights of the high-value combinations in the interaction score.
pub const STORM_VIOLATION_WEIGHT: f64 = 1.5;
pub const VIOLATION_REQUEST_WEIGHT: f64 = 1.3;
pub const MULTIPLE_VIOLATIONS_WEIGHT: f64 = 1.2;
pub const RECENT_SIGNALS_WEIGHT: f64 = 1.4;
pub const PER_SIGNAL_WEIGHT: f64 = 0.1;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionFeatures {
    pub violation_count: usize,
    pub request_count: usize,
    pub total_signal_count: usize,
    pub storm_violation_interaction: bool,
    pub recent_storm_count: usize,
    pub violation_request_interaction: bool,
    pub multiple_violations: bool,
    pub recent_signal_count: usize,
    pub recent_signals_interaction: bool,
    // Not weighted by the baseline scorer; kept for analysis.
    pub age_violation_interaction: Option<f64>,
    pub age_request_interaction: Option<f64>,
    pub value_violation_interaction: Option<f64>,
    pub value_request_interaction: Option<f64>,
}

impl InteractionFeatures {
    /// Unnormalised interaction score: flag weights plus 0.1 per signal.
    pub fn weighted_sum(&self) -> f64 {
        let mut score = self.total_signal_count as f64 * PER_SIGNAL_WEIGHT;
        if self.storm_violation_interaction {
            score += STORM_VIOLATION_WEIGHT;
        }
        if self.violation_request_interaction {
            score += VIOLATION_REQUEST_WEIGHT;
        }
        if self.multiple_violations {
            score += MULTIPLE_VIOLATIONS_WEIGHT;
        }
        if self.recent_signals_interaction {
            score += RECENT_SIGNALS_WEIGHT;
        }
        score
    }
}

pub fn compute(ctx: &PropertyContext, recent_window_days: i64) -> InteractionFeatures {
    let violation_count = ctx.violations.len();
    let request_count = ctx.requests.len();
    let recent_storm_count = ctx.recent_storms.len();

    let cutoff = ctx.as_of - Duration::days(recent_window_days);
    let recent_v = ctx
        .violations
        .iter()
        .filter(|v| v.violation_date.is_some_and(|d| d >= cutoff))
        .count();
    let recent_r = ctx
        .requests
        .iter()
        .filter(|r| r.requested_date.is_some_and(|d| d >= cutoff))
        .count();
    let recent_signal_count = recent_v + recent_r;

    let age = ctx.age().map(f64::from);
    let value = ctx.property.market_value;
    let cross = |base: Option<f64>, n: usize| base.map(|b| b * n as f64);

    InteractionFeatures {
        violation_count,
        request_count,
        total_signal_count: violation_count + request_count,
        storm_violation_interaction: recent_storm_count > 0 && violation_count > 0,
        recent_storm_count,
        violation_request_interaction: violation_count > 0 && request_count > 0,
        multiple_violations: violation_count >= 2,
        recent_signal_count,
        recent_signals_interaction: recent_signal_count >= 2,
        age_violation_interaction: cross(age, violation_count),
        age_request_interaction: cross(age, request_count),
        value_violation_interaction: cross(value, violation_count),
        value_request_interaction: cross(value, request_count),
    }
}
