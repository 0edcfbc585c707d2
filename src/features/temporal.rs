// src/features/temporal.rs
//! Recency and trailing-window counts, plus calendar features of the reference date.

use super::PropertyContext;
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

const WINDOWS: [i64; 3] = [30, 60, 90];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemporalFeatures {
    pub days_since_last_violation: Option<i64>,
    pub days_since_last_request: Option<i64>,
    pub has_recent_violation: bool,
    pub has_recent_request: bool,
    pub violations_last_30_days: usize,
    pub violations_last_60_days: usize,
    pub violations_last_90_days: usize,
    pub requests_last_30_days: usize,
    pub requests_last_60_days: usize,
    pub requests_last_90_days: usize,
    pub total_signals_last_30_days: usize,
    pub total_signals_last_60_days: usize,
    pub total_signals_last_90_days: usize,
    pub month: u32,
    pub quarter: u32,
    pub is_summer: bool,
    pub is_winter: bool,
    pub is_spring: bool,
    pub is_fall: bool,
}

fn window_counts(dates: &[NaiveDate], as_of: NaiveDate) -> [usize; 3] {
    WINDOWS.map(|w| {
        let cutoff = as_of - Duration::days(w);
        dates.iter().filter(|d| **d >= cutoff).count()
    })
}

pub fn compute(ctx: &PropertyContext, recent_window_days: i64) -> TemporalFeatures {
    let v_dates: Vec<NaiveDate> = ctx.violations.iter().filter_map(|v| v.violation_date).collect();
    let r_dates: Vec<NaiveDate> = ctx.requests.iter().filter_map(|r| r.requested_date).collect();

    let since_v = v_dates.iter().max().map(|d| ctx.days_since(*d));
    let since_r = r_dates.iter().max().map(|d| ctx.days_since(*d));

    let [v30, v60, v90] = window_counts(&v_dates, ctx.as_of);
    let [r30, r60, r90] = window_counts(&r_dates, ctx.as_of);

    let month = ctx.as_of.month();
    TemporalFeatures {
        days_since_last_violation: since_v,
        days_since_last_request: since_r,
        has_recent_violation: since_v.is_some_and(|d| d <= recent_window_days),
        has_recent_request: since_r.is_some_and(|d| d <= recent_window_days),
        violations_last_30_days: v30,
        violations_last_60_days: v60,
        violations_last_90_days: v90,
        requests_last_30_days: r30,
        requests_last_60_days: r60,
        requests_last_90_days: r90,
        total_signals_last_30_days: v30 + r30,
        total_signals_last_60_days: v60 + r60,
        total_signals_last_90_days: v90 + r90,
        month,
        quarter: (month - 1) / 3 + 1,
        is_summer: matches!(month, 6..=8),
        is_winter: matches!(month, 12 | 1 | 2),
        is_spring: matches!(month, 3..=5),
        is_fall: matches!(month, 9..=11),
    }
}
