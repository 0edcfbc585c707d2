// src/scoring/lifecycle.rs
//! Property lifecycle model: which maintenance phase an age falls into and
//! how urgent that is, overall and per trade.

use crate::model::Trade;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    /// 0-5 years
    Warranty,
    /// 5-15 years
    Routine,
    /// 15-25 years, major system replacements
    MajorReplacement,
    /// 25+ years
    OngoingMaintenance,
    Unknown,
}

pub fn lifecycle_stage(age: Option<i32>) -> LifecycleStage {
    match age {
        None => LifecycleStage::Unknown,
        Some(a) if a < 5 => LifecycleStage::Warranty,
        Some(a) if a < 15 => LifecycleStage::Routine,
        Some(a) if a < 25 => LifecycleStage::MajorReplacement,
        Some(_) => LifecycleStage::OngoingMaintenance,
    }
}

pub const DEFAULT_WINDOW: (i32, i32) = (15, 25);

/// Inclusive window check; default window is [`DEFAULT_WINDOW`].
pub fn in_maintenance_window(age: Option<i32>, start: i32, end: i32) -> bool {
    age.is_some_and(|a| (start..=end).contains(&a))
}

/// Generic urgency curve, optionally boosted when the property has gone long
/// without improvements. Unknown age is 0.
pub fn maintenance_urgency(age: Option<i32>, years_since_improvement: Option<i32>) -> f64 {
    let Some(age) = age else {
        return 0.0;
    };
    let mut urgency = match age {
        15..=25 => 0.8,
        26..=35 => 0.6,
        a if a > 35 => 0.7,
        10..=14 => 0.4,
        _ => 0.2,
    };
    match years_since_improvement {
        Some(y) if y > 15 => urgency = f64::min(1.0, urgency + 0.2),
        Some(y) if y > 10 => urgency = f64::min(1.0, urgency + 0.1),
        _ => {}
    }
    urgency
}

/// Peak window -> 0.9, shoulders -> 0.6, otherwise 0.3.
pub fn trade_lifecycle_score(age: Option<i32>, trade: Trade) -> f64 {
    let Some(age) = age else {
        return 0.0;
    };
    // (peak start, peak end, shoulder start, shoulder end), all inclusive
    let (peak_lo, peak_hi, shoulder_lo, shoulder_hi) = match trade {
        Trade::Roofing => (15, 25, 10, 30),
        Trade::Hvac => (10, 20, 5, 25),
        Trade::Siding | Trade::Electrical => (20, 30, 15, 35),
    };
    if (peak_lo..=peak_hi).contains(&age) {
        0.9
    } else if (shoulder_lo..=shoulder_hi).contains(&age) {
        0.6
    } else {
        0.3
    }
}

/// Lifecycle component of the baseline score. The improvement boost only
/// applies to the generic curve.
pub fn lifecycle_score(age: Option<i32>, years_since_improvement: Option<i32>, trade: Option<Trade>) -> f64 {
    match trade {
        Some(t) => trade_lifecycle_score(age, t),
        None => maintenance_urgency(age, years_since_improvement),
    }
}
