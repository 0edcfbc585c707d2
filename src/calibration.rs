// src/calibration.rs
//! Feedback-driven score calibration.
//!
//! Leads with contractor feedback are bucketed by score; each bucket's observed
//! conversion rate is compared with its midpoint ("expected") rate. The ratio,
//! clamped, becomes a multiplicative correction for scores in that bucket.

use crate::config::CalibrationConfig;
use crate::error::{EngineError, EngineResult};
use crate::model::{CalibrationSample, Trade};
use crate::scoring::round_to;
use crate::store::SignalStore;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Fixed score ranges. All are half-open except the top one, which is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScoreBucket {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ScoreBucket {
    pub const ALL: [ScoreBucket; 5] = [
        ScoreBucket::VeryLow,
        ScoreBucket::Low,
        ScoreBucket::Medium,
        ScoreBucket::High,
        ScoreBucket::VeryHigh,
    ];

    pub fn bounds(&self) -> (f64, f64) {
        match self {
            ScoreBucket::VeryLow => (0.0, 0.3),
            ScoreBucket::Low => (0.3, 0.5),
            ScoreBucket::Medium => (0.5, 0.7),
            ScoreBucket::High => (0.7, 0.9),
            ScoreBucket::VeryHigh => (0.9, 1.0),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScoreBucket::VeryLow => "0.0-0.3",
            ScoreBucket::Low => "0.3-0.5",
            ScoreBucket::Medium => "0.5-0.7",
            ScoreBucket::High => "0.7-0.9",
            ScoreBucket::VeryHigh => "0.9-1.0",
        }
    }

    /// Bucket midpoint as a percentage.
    pub fn expected_rate(&self) -> f64 {
        let (lo, hi) = self.bounds();
        round_to((lo + hi) / 2.0 * 100.0, 2)
    }

    pub fn for_score(score: f64) -> Option<ScoreBucket> {
        Self::ALL.into_iter().find(|b| {
            let (lo, hi) = b.bounds();
            match b {
                ScoreBucket::VeryHigh => (lo..=hi).contains(&score),
                _ => (lo..hi).contains(&score),
            }
        })
    }
}

impl fmt::Display for ScoreBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for ScoreBucket {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BucketStats {
    pub total_leads: usize,
    pub converted: usize,
    /// Percent, 2 dp.
    pub conversion_rate: f64,
    /// Percent, 2 dp.
    pub expected_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreAccuracy {
    pub trade: String,
    pub total_leads: usize,
    pub total_converted: usize,
    pub overall_conversion_rate: f64,
    pub calibration_data: BTreeMap<ScoreBucket, BucketStats>,
    pub data_points: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Adjustment {
    pub expected_rate: f64,
    pub actual_rate: f64,
    pub adjustment_factor: f64,
    pub adjustment_pct: f64,
}

pub type Adjustments = BTreeMap<ScoreBucket, Adjustment>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationReport {
    pub trade: String,
    pub adjustments: Adjustments,
    pub overall_accuracy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub score_range: ScoreBucket,
    pub issue: String,
    pub recommendation: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationReport {
    pub trade: String,
    pub recommendations: Vec<Recommendation>,
    pub calibration_data: CalibrationReport,
}

/// Too few feedback samples. Returned as a payload, not raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsufficientSample {
    pub error: String,
    pub data_points: usize,
    pub required: usize,
}

impl InsufficientSample {
    fn new(required: usize, data_points: usize) -> Self {
        Self {
            error: EngineError::InsufficientData {
                required,
                available: data_points,
            }
            .to_string(),
            data_points,
            required,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Calibration<T> {
    Ready(T),
    Insufficient(InsufficientSample),
}

impl<T> Calibration<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Calibration::Ready(_))
    }

    /// Escalate the insufficient case to an error for callers that need data.
    pub fn ready(self) -> EngineResult<T> {
        match self {
            Calibration::Ready(v) => Ok(v),
            Calibration::Insufficient(i) => Err(EngineError::InsufficientData {
                required: i.required,
                available: i.data_points,
            }),
        }
    }

    fn map<U>(self, f: impl FnOnce(T) -> U) -> Calibration<U> {
        match self {
            Calibration::Ready(v) => Calibration::Ready(f(v)),
            Calibration::Insufficient(i) => Calibration::Insufficient(i),
        }
    }
}

fn trade_label(trade: Option<Trade>) -> String {
    trade.map_or_else(|| "all".to_string(), |t| t.as_str().to_string())
}

fn pct(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round_to(part as f64 / whole as f64 * 100.0, 2)
    }
}

/// Bucket samples and compute observed vs expected conversion. Samples with a
/// score outside [0, 1] are ignored.
pub fn analyze_samples(
    samples: &[CalibrationSample],
    trade: Option<Trade>,
    min_samples: usize,
) -> Calibration<ScoreAccuracy> {
    if samples.len() < min_samples {
        return Calibration::Insufficient(InsufficientSample::new(min_samples, samples.len()));
    }

    let mut counts: BTreeMap<ScoreBucket, (usize, usize)> =
        ScoreBucket::ALL.into_iter().map(|b| (b, (0, 0))).collect();
    for s in samples {
        if let Some(b) = ScoreBucket::for_score(s.score) {
            let entry = counts.entry(b).or_default();
            entry.0 += 1;
            if s.converted {
                entry.1 += 1;
            }
        }
    }

    let calibration_data: BTreeMap<_, _> = counts
        .into_iter()
        .map(|(b, (total, converted))| {
            let stats = BucketStats {
                total_leads: total,
                converted,
                conversion_rate: pct(converted, total),
                expected_rate: b.expected_rate(),
            };
            (b, stats)
        })
        .collect();

    let total_leads = calibration_data.values().map(|s| s.total_leads).sum();
    let total_converted = calibration_data.values().map(|s| s.converted).sum();

    Calibration::Ready(ScoreAccuracy {
        trade: trade_label(trade),
        total_leads,
        total_converted,
        overall_conversion_rate: pct(total_converted, total_leads),
        calibration_data,
        data_points: samples.len(),
    })
}

/// actual / expected, clamped to `[min, max]`. A zero expected rate is neutral.
pub fn adjustment_factor(expected_rate: f64, actual_rate: f64, min: f64, max: f64) -> f64 {
    if expected_rate <= 0.0 {
        return 1.0;
    }
    (actual_rate / expected_rate).clamp(min, max)
}

/// Per-bucket corrections. Buckets without observed leads are left out.
pub fn adjustments_from(accuracy: &ScoreAccuracy, cfg: &CalibrationConfig) -> Adjustments {
    accuracy
        .calibration_data
        .iter()
        .filter(|(_, s)| s.total_leads > 0 && s.expected_rate > 0.0)
        .map(|(b, s)| {
            let factor = adjustment_factor(
                s.expected_rate,
                s.conversion_rate,
                cfg.min_factor,
                cfg.max_factor,
            );
            let adj = Adjustment {
                expected_rate: s.expected_rate,
                actual_rate: s.conversion_rate,
                adjustment_factor: round_to(factor, 4),
                adjustment_pct: round_to((factor - 1.0) * 100.0, 2),
            };
            (*b, adj)
        })
        .collect()
}

/// Multiply by the factor of the bucket containing `score`, clamped to [0, 1].
/// Unchanged when no adjustment covers the score.
pub fn apply_calibration(score: f64, adjustments: &Adjustments) -> f64 {
    ScoreBucket::for_score(score)
        .and_then(|b| adjustments.get(&b))
        .map_or(score, |a| (score * a.adjustment_factor).clamp(0.0, 1.0))
}

pub fn recommendations_from(adjustments: &Adjustments, cfg: &CalibrationConfig) -> Vec<Recommendation> {
    adjustments
        .iter()
        .filter(|(_, a)| a.adjustment_pct.abs() > cfg.recommend_pct)
        .map(|(b, a)| Recommendation {
            score_range: *b,
            issue: format!(
                "Expected {:.1}% conversion, got {:.1}%",
                a.expected_rate, a.actual_rate
            ),
            recommendation: format!("Adjust scores by {:+.1}%", a.adjustment_pct),
            priority: if a.adjustment_pct.abs() > cfg.high_priority_pct {
                Priority::High
            } else {
                Priority::Medium
            },
        })
        .collect()
}

#[derive(Clone)]
pub struct CalibrationEngine {
    store: Arc<dyn SignalStore>,
    cfg: CalibrationConfig,
}

impl CalibrationEngine {
    pub fn new(store: Arc<dyn SignalStore>, cfg: CalibrationConfig) -> Self {
        Self { store, cfg }
    }

    pub async fn score_accuracy(
        &self,
        trade: Option<Trade>,
    ) -> EngineResult<Calibration<ScoreAccuracy>> {
        let samples = self.store.calibration_samples(trade).await?;
        let out = analyze_samples(&samples, trade, self.cfg.min_samples);
        if let Calibration::Insufficient(i) = &out {
            tracing::info!(
                target: "calibration",
                trade = trade.map(|t| t.as_str()),
                data_points = i.data_points,
                required = i.required,
                "not enough feedback to calibrate"
            );
        }
        Ok(out)
    }

    pub async fn calibration_adjustments(
        &self,
        trade: Option<Trade>,
    ) -> EngineResult<Calibration<CalibrationReport>> {
        let report = self.score_accuracy(trade).await?.map(|acc| CalibrationReport {
            trade: acc.trade.clone(),
            adjustments: adjustments_from(&acc, &self.cfg),
            overall_accuracy: acc.overall_conversion_rate,
        });
        if let Calibration::Ready(r) = &report {
            tracing::info!(
                target: "calibration",
                trade = %r.trade,
                buckets = r.adjustments.len(),
                overall = r.overall_accuracy,
                "calibration adjustments computed"
            );
        }
        Ok(report)
    }

    pub async fn calibration_recommendations(
        &self,
        trade: Option<Trade>,
    ) -> EngineResult<Calibration<RecommendationReport>> {
        Ok(self
            .calibration_adjustments(trade)
            .await?
            .map(|report| RecommendationReport {
                trade: report.trade.clone(),
                recommendations: recommendations_from(&report.adjustments, &self.cfg),
                calibration_data: report,
            }))
    }

    /// `score` corrected by the current adjustments for `trade`; unchanged
    /// while there is not enough feedback.
    pub async fn calibrated_score(&self, score: f64, trade: Option<Trade>) -> EngineResult<f64> {
        Ok(match self.calibration_adjustments(trade).await? {
            Calibration::Ready(r) => apply_calibration(score, &r.adjustments),
            Calibration::Insufficient(_) => score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(score: f64, converted: bool) -> CalibrationSample {
        CalibrationSample { score, converted }
    }

    fn cfg() -> CalibrationConfig {
        CalibrationConfig::default()
    }

    #[test]
    fn bucket_edges() {
        assert_eq!(ScoreBucket::for_score(0.0), Some(ScoreBucket::VeryLow));
        assert_eq!(ScoreBucket::for_score(0.3), Some(ScoreBucket::Low));
        assert_eq!(ScoreBucket::for_score(0.8999), Some(ScoreBucket::High));
        assert_eq!(ScoreBucket::for_score(1.0), Some(ScoreBucket::VeryHigh));
        assert_eq!(ScoreBucket::for_score(1.2), None);
        assert_eq!(ScoreBucket::for_score(-0.1), None);
        assert_eq!(ScoreBucket::Low.expected_rate(), 40.0);
        assert_eq!(ScoreBucket::VeryHigh.expected_rate(), 95.0);
    }

    #[test]
    fn factor_is_clamped() {
        assert_eq!(adjustment_factor(50.0, 20.0, 0.5, 2.0), 0.5);
        assert_eq!(adjustment_factor(15.0, 90.0, 0.5, 2.0), 2.0);
        assert!((adjustment_factor(40.0, 50.0, 0.5, 2.0) - 1.25).abs() < 1e-9);
        assert_eq!(adjustment_factor(0.0, 50.0, 0.5, 2.0), 1.0);
    }

    #[test]
    fn too_few_samples_is_a_payload() {
        let out = analyze_samples(&[sample(0.5, true)], None, 5);
        let Calibration::Insufficient(i) = &out else {
            panic!("expected insufficient");
        };
        assert_eq!(i.data_points, 1);
        assert_eq!(i.required, 5);
        let v = serde_json::to_value(&out).unwrap();
        assert_eq!(v["error"], "insufficient feedback data (need 5, have 1)");
        assert!(matches!(
            out.ready(),
            Err(EngineError::InsufficientData { required: 5, available: 1 })
        ));
    }

    #[test]
    fn accuracy_and_adjustments() {
        // 0.3-0.5: 5 leads, 1 converted -> 20% vs 40% expected -> factor 0.5
        // 0.7-0.9: 2 leads, 2 converted -> 100% vs 80% -> factor 1.25
        let mut samples: Vec<_> = (0..5).map(|i| sample(0.35, i == 0)).collect();
        samples.push(sample(0.75, true));
        samples.push(sample(0.85, true));
        let acc = match analyze_samples(&samples, Some(Trade::Roofing), 5) {
            Calibration::Ready(a) => a,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(acc.trade, "roofing");
        assert_eq!(acc.data_points, 7);
        assert_eq!(acc.total_converted, 3);
        assert_eq!(acc.overall_conversion_rate, 42.86);
        assert_eq!(acc.calibration_data[&ScoreBucket::Low].conversion_rate, 20.0);
        assert_eq!(acc.calibration_data[&ScoreBucket::Medium].total_leads, 0);

        let adj = adjustments_from(&acc, &cfg());
        assert_eq!(adj.len(), 2);
        assert_eq!(adj[&ScoreBucket::Low].adjustment_factor, 0.5);
        assert_eq!(adj[&ScoreBucket::Low].adjustment_pct, -50.0);
        assert_eq!(adj[&ScoreBucket::High].adjustment_factor, 1.25);
        assert!(!adj.contains_key(&ScoreBucket::Medium));

        let recs = recommendations_from(&adj, &cfg());
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].score_range, ScoreBucket::Low);
        assert_eq!(recs[0].priority, Priority::High);
        assert_eq!(recs[0].issue, "Expected 40.0% conversion, got 20.0%");
        assert_eq!(recs[0].recommendation, "Adjust scores by -50.0%");
        assert_eq!(recs[1].priority, Priority::High);
    }

    #[test]
    fn apply_uses_matching_bucket_only() {
        let mut adj = Adjustments::new();
        adj.insert(
            ScoreBucket::High,
            Adjustment {
                expected_rate: 80.0,
                actual_rate: 100.0,
                adjustment_factor: 1.25,
                adjustment_pct: 25.0,
            },
        );
        assert!((apply_calibration(0.8, &adj) - 1.0).abs() < 1e-9);
        assert!((apply_calibration(0.72, &adj) - 0.9).abs() < 1e-9);
        assert_eq!(apply_calibration(0.4, &adj), 0.4);
        assert_eq!(apply_calibration(0.4, &Adjustments::new()), 0.4);
    }

    #[test]
    fn bucket_keys_serialize_as_ranges() {
        let mut adj = Adjustments::new();
        adj.insert(
            ScoreBucket::VeryLow,
            Adjustment {
                expected_rate: 15.0,
                actual_rate: 15.0,
                adjustment_factor: 1.0,
                adjustment_pct: 0.0,
            },
        );
        let v = serde_json::to_value(&adj).unwrap();
        assert_eq!(v["0.0-0.3"]["adjustment_factor"], 1.0);
    }
}
