// src/scoring/trade.rs
//! Trade-specific boosts, added on top of the baseline. Boosts are not capped
//! individually; only the final score is clamped.

use super::lifecycle::in_maintenance_window;
use super::ScoreComponents;
use crate::decay::SignalDecay;
use crate::features::PropertyContext;
use crate::model::{StormEvent, Trade};
use chrono::Datelike;

const ROOF_TERMS: &[&str] = &["roof"];
const HVAC_TERMS: &[&str] = &["hvac", "air", "heating", "cooling"];
const SIDING_TERMS: &[&str] = &["siding", "exterior"];
const ELECTRICAL_TERMS: &[&str] = &["electrical", "electric", "wiring"];

/// Base strength of each trade-matching signal before decay.
const MATCHING_SIGNAL_BASE: f64 = 0.3;
const DISPLAY_STEP: f64 = 0.1;
const DISPLAY_CAP: f64 = 0.3;

const AGE_WINDOW_BOOST: f64 = 0.2;
const SEASONAL_BOOST: f64 = 0.1;
const HVAC_SEASON_MONTHS: [u32; 4] = [4, 5, 10, 11];

const HAIL_LARGE_INCHES: f64 = 1.0;
const HAIL_LARGE_BOOST: f64 = 0.4;
const HAIL_SMALL_INCHES: f64 = 0.5;
const HAIL_SMALL_BOOST: f64 = 0.2;
const WIND_MPH: f64 = 60.0;
const WIND_BOOST: f64 = 0.3;

fn max_magnitude<'a>(storms: impl Iterator<Item = &'a StormEvent>, kind: &str) -> Option<f64> {
    storms
        .filter(|s| s.event_type.to_ascii_lowercase().contains(kind))
        .map(|s| s.magnitude.unwrap_or(0.0))
        .reduce(f64::max)
}

/// Sum of decayed matching-signal strengths plus the capped display value.
fn matching_signals<I>(dates: I, decay: &SignalDecay, ctx: &PropertyContext) -> Option<(f64, f64)>
where
    I: IntoIterator<Item = Option<chrono::NaiveDate>>,
{
    let mut count = 0usize;
    let mut boost = 0.0;
    for d in dates {
        count += 1;
        boost += decay.decay(MATCHING_SIGNAL_BASE, d, ctx.as_of);
    }
    (count > 0).then(|| (boost, f64::min(DISPLAY_CAP, count as f64 * DISPLAY_STEP)))
}

fn age_in(ctx: &PropertyContext, lo: i32, hi: i32) -> bool {
    in_maintenance_window(ctx.age(), lo, hi)
}

/// Total boost for `trade`; records each fired boost in `components`.
pub fn trade_boost(
    trade: Trade,
    ctx: &PropertyContext,
    decay: &SignalDecay,
    components: &mut ScoreComponents,
) -> f64 {
    let mut boost = 0.0;
    match trade {
        Trade::Roofing => {
            let dates = ctx
                .violations
                .iter()
                .filter(|v| v.mentions(ROOF_TERMS))
                .map(|v| v.violation_date);
            if let Some((b, shown)) = matching_signals(dates, decay, ctx) {
                boost += b;
                components.roof_violation_boost = Some(shown);
            }
            if let Some(mag) = max_magnitude(ctx.recent_storms.iter(), "hail") {
                let hail = if mag > HAIL_LARGE_INCHES {
                    HAIL_LARGE_BOOST
                } else if mag > HAIL_SMALL_INCHES {
                    HAIL_SMALL_BOOST
                } else {
                    0.0
                };
                if hail > 0.0 {
                    boost += hail;
                    components.hail_boost = Some(hail);
                }
            }
            if age_in(ctx, 15, 25) {
                boost += AGE_WINDOW_BOOST;
                components.age_window_boost = Some(AGE_WINDOW_BOOST);
            }
        }
        Trade::Hvac => {
            let dates = ctx
                .requests
                .iter()
                .filter(|r| r.type_mentions(HVAC_TERMS))
                .map(|r| r.requested_date);
            if let Some((b, shown)) = matching_signals(dates, decay, ctx) {
                boost += b;
                components.hvac_request_boost = Some(shown);
            }
            if age_in(ctx, 10, 20) {
                boost += AGE_WINDOW_BOOST;
                components.age_window_boost = Some(AGE_WINDOW_BOOST);
            }
            if HVAC_SEASON_MONTHS.contains(&ctx.as_of.month()) {
                boost += SEASONAL_BOOST;
                components.seasonal_boost = Some(SEASONAL_BOOST);
            }
        }
        Trade::Siding => {
            let dates = ctx
                .violations
                .iter()
                .filter(|v| v.mentions(SIDING_TERMS))
                .map(|v| v.violation_date);
            if let Some((b, shown)) = matching_signals(dates, decay, ctx) {
                boost += b;
                components.siding_violation_boost = Some(shown);
            }
            if max_magnitude(ctx.recent_storms.iter(), "wind").is_some_and(|m| m > WIND_MPH) {
                boost += WIND_BOOST;
                components.wind_boost = Some(WIND_BOOST);
            }
        }
        Trade::Electrical => {
            let dates = ctx
                .requests
                .iter()
                .filter(|r| r.type_mentions(ELECTRICAL_TERMS))
                .map(|r| r.requested_date);
            if let Some((b, shown)) = matching_signals(dates, decay, ctx) {
                boost += b;
                components.electrical_request_boost = Some(shown);
            }
            if age_in(ctx, 20, 30) {
                boost += AGE_WINDOW_BOOST;
                components.age_window_boost = Some(AGE_WINDOW_BOOST);
            }
        }
    }
    boost
}
