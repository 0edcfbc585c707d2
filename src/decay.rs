// src/decay.rs
//! Exponential half-life decay of signal strength.
//!
//! strength = base * 2^(-days / half_life), clamped to [0, base].
//! Future-dated signals keep full strength; undated signals count for nothing.

use crate::error::{EngineError, EngineResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_HALF_LIFE_DAYS: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalDecay {
    half_life_days: f64,
}

impl Default for SignalDecay {
    fn default() -> Self {
        Self {
            half_life_days: DEFAULT_HALF_LIFE_DAYS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Sum,
    Max,
    Average,
}

impl FromStr for Aggregation {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sum" => Ok(Aggregation::Sum),
            "max" => Ok(Aggregation::Max),
            "average" | "avg" | "mean" => Ok(Aggregation::Average),
            other => Err(EngineError::validation(format!(
                "unknown aggregation '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgeCategory {
    Recent,
    Fresh,
    Aging,
    Stale,
    Future,
}

impl fmt::Display for AgeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgeCategory::Recent => "recent",
            AgeCategory::Fresh => "fresh",
            AgeCategory::Aging => "aging",
            AgeCategory::Stale => "stale",
            AgeCategory::Future => "future",
        };
        f.write_str(s)
    }
}

impl SignalDecay {
    pub fn new(half_life_days: f64) -> EngineResult<Self> {
        if !(half_life_days.is_finite() && half_life_days > 0.0) {
            return Err(EngineError::Config(format!(
                "half_life_days must be > 0, got {half_life_days}"
            )));
        }
        Ok(Self { half_life_days })
    }

    pub fn half_life_days(&self) -> f64 {
        self.half_life_days
    }

    /// Decayed strength of one signal at `reference`.
    pub fn decay(&self, base: f64, date: Option<NaiveDate>, reference: NaiveDate) -> f64 {
        let Some(date) = date else {
            return 0.0;
        };
        let days = (reference - date).num_days();
        if days <= 0 {
            return base;
        }
        let strength = base * 2f64.powf(-(days as f64) / self.half_life_days);
        strength.clamp(0.0, base.max(0.0))
    }

    /// Decay every date and reduce. Empty input is 0.
    pub fn decay_for_property<I>(
        &self,
        dates: I,
        base: f64,
        aggregation: Aggregation,
        reference: NaiveDate,
    ) -> f64
    where
        I: IntoIterator<Item = Option<NaiveDate>>,
    {
        let strengths: Vec<f64> = dates
            .into_iter()
            .map(|d| self.decay(base, d, reference))
            .collect();
        if strengths.is_empty() {
            return 0.0;
        }
        match aggregation {
            Aggregation::Sum => strengths.iter().sum(),
            Aggregation::Max => strengths.iter().copied().fold(0.0, f64::max),
            Aggregation::Average => strengths.iter().sum::<f64>() / strengths.len() as f64,
        }
    }
}

pub fn age_category(date: Option<NaiveDate>, reference: NaiveDate) -> AgeCategory {
    let Some(date) = date else {
        return AgeCategory::Stale;
    };
    match (reference - date).num_days() {
        d if d < 0 => AgeCategory::Future,
        0..=7 => AgeCategory::Recent,
        8..=30 => AgeCategory::Fresh,
        31..=90 => AgeCategory::Aging,
        _ => AgeCategory::Stale,
    }
}
