// src/features/aggregated.rs
//! Cross-property features: where the subject sits within its ZIP.

use super::PropertyContext;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedFeatures {
    /// Properties in the ZIP with a known market value.
    pub zip_total_properties: usize,
    pub zip_avg_market_value: Option<f64>,
    pub zip_median_market_value: Option<f64>,
    pub zip_min_market_value: Option<f64>,
    pub zip_max_market_value: Option<f64>,
    pub value_percentile: Option<f64>,
    pub property_age: Option<i32>,
    pub zip_avg_property_age: Option<f64>,
    pub zip_median_property_age: Option<f64>,
    pub age_percentile: Option<f64>,
    pub zip_avg_signal_count: f64,
    pub signal_frequency_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Distribution {
    mean: f64,
    median: f64,
    min: f64,
    max: f64,
}

fn distribution(mut values: Vec<f64>) -> Option<Distribution> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    let median = if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    };
    Some(Distribution {
        mean: values.iter().sum::<f64>() / n as f64,
        median,
        min: values[0],
        max: values[n - 1],
    })
}

/// Piecewise-linear position: [min, median) maps to [0, 0.5), [median, max] to [0.5, 1].
pub fn piecewise_percentile(x: f64, min: f64, median: f64, max: f64) -> f64 {
    let p = if x >= median {
        let span = max - median;
        if span > 0.0 {
            0.5 + (x - median) / span * 0.5
        } else {
            0.5
        }
    } else {
        let span = median - min;
        if span > 0.0 {
            (x - min) / span * 0.5
        } else {
            0.0
        }
    };
    p.clamp(0.0, 1.0)
}

/// `None` when the property has no ZIP to compare against.
pub fn compute(ctx: &PropertyContext) -> Option<AggregatedFeatures> {
    ctx.property.situs_zip.as_deref().filter(|z| !z.is_empty())?;

    let values: Vec<f64> = ctx.zip_peers.iter().filter_map(|p| p.market_value).collect();
    let value_count = values.len();
    let value_dist = distribution(values);

    let ages: Vec<f64> = ctx
        .zip_peers
        .iter()
        .filter_map(|p| p.age(ctx.as_of))
        .map(f64::from)
        .collect();
    let age_dist = distribution(ages);

    let property_age = ctx.age();

    let value_percentile = match (ctx.property.market_value, value_dist) {
        (Some(v), Some(d)) => Some(piecewise_percentile(v, d.min, d.median, d.max)),
        _ => None,
    };
    let age_percentile = match (property_age, age_dist) {
        (Some(a), Some(d)) => Some(piecewise_percentile(f64::from(a), d.min, d.median, d.max)),
        _ => None,
    };

    let own_signals = (ctx.violations.len() + ctx.requests.len()) as f64;
    let peer_count = ctx.zip_peers.len();
    let zip_avg_signal_count = if peer_count > 0 {
        ctx.zip_signal_count as f64 / peer_count as f64
    } else {
        0.0
    };
    let signal_frequency_ratio = if zip_avg_signal_count > 0.0 {
        own_signals / zip_avg_signal_count
    } else {
        0.0
    };

    Some(AggregatedFeatures {
        zip_total_properties: value_count,
        zip_avg_market_value: value_dist.map(|d| d.mean),
        zip_median_market_value: value_dist.map(|d| d.median),
        zip_min_market_value: value_dist.map(|d| d.min),
        zip_max_market_value: value_dist.map(|d| d.max),
        value_percentile,
        property_age,
        zip_avg_property_age: age_dist.map(|d| d.mean),
        zip_median_property_age: age_dist.map(|d| d.median),
        age_percentile,
        zip_avg_signal_count,
        signal_frequency_ratio,
    })
}
