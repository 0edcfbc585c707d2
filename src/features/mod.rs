// src/features/mod.rs
//! Feature pipeline: temporal, ZIP-aggregated and interaction features for
//! one property at a reference date.
//!
//! Everything the sub-computations need is read once into a
//! [`PropertyContext`]; the compute functions themselves are pure, so scoring
//! never sees a half-loaded property.

pub mod aggregated;
pub mod interaction;
pub mod temporal;

use crate::error::EngineResult;
use crate::model::{Property, PropertyId, ServiceRequest, StormEvent, Violation};
use crate::store::{PropertyFilter, SignalStore};
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::sync::Arc;

pub use aggregated::AggregatedFeatures;
pub use interaction::InteractionFeatures;
pub use temporal::TemporalFeatures;

/// Snapshot of everything known about one property at `as_of`.
#[derive(Debug, Clone)]
pub struct PropertyContext {
    pub property: Property,
    pub violations: Vec<Violation>,
    pub requests: Vec<ServiceRequest>,
    /// Storms in the property's ZIP within the trailing storm window.
    pub recent_storms: Vec<StormEvent>,
    /// All properties sharing the ZIP, subject included.
    pub zip_peers: Vec<Property>,
    pub zip_signal_count: usize,
    pub as_of: NaiveDate,
}

impl PropertyContext {
    /// `Ok(None)` when the property does not exist.
    pub async fn load(
        store: &dyn SignalStore,
        id: PropertyId,
        as_of: NaiveDate,
        storm_window_days: i64,
    ) -> EngineResult<Option<Self>> {
        let Some(property) = store.get_property(id).await? else {
            return Ok(None);
        };
        let violations = store.violations_for(id).await?;
        let requests = store.requests_for(id).await?;

        let (recent_storms, zip_peers, zip_signal_count) = match property.situs_zip.as_deref() {
            Some(zip) if !zip.is_empty() => {
                let since = as_of - Duration::days(storm_window_days);
                let storms = store
                    .storms_in_zip(zip, since)
                    .await?
                    .into_iter()
                    .filter(|s| s.event_date.is_some_and(|d| d <= as_of))
                    .collect();
                let peers = store.query_properties(&PropertyFilter::in_zip(zip)).await?;
                let count = store.zip_signal_count(zip).await?;
                (storms, peers, count)
            }
            _ => (Vec::new(), Vec::new(), 0),
        };

        Ok(Some(Self {
            property,
            violations,
            requests,
            recent_storms,
            zip_peers,
            zip_signal_count,
            as_of,
        }))
    }

    pub fn age(&self) -> Option<i32> {
        self.property.age(self.as_of)
    }

    pub fn days_since(&self, date: NaiveDate) -> i64 {
        (self.as_of - date).num_days()
    }
}

/// Per-property features. Each group uses its own key namespace, so the
/// flattened JSON has no collisions. All `None` means "no data", not zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureSet {
    #[serde(flatten)]
    pub temporal: Option<TemporalFeatures>,
    #[serde(flatten)]
    pub aggregated: Option<AggregatedFeatures>,
    #[serde(flatten)]
    pub interaction: Option<InteractionFeatures>,
}

impl FeatureSet {
    pub fn is_empty(&self) -> bool {
        self.temporal.is_none() && self.aggregated.is_none() && self.interaction.is_none()
    }

    /// Pure merge of the three sub-pipelines.
    pub fn from_context(ctx: &PropertyContext, recent_window_days: i64) -> Self {
        Self {
            temporal: Some(temporal::compute(ctx, recent_window_days)),
            aggregated: aggregated::compute(ctx),
            interaction: Some(interaction::compute(ctx, recent_window_days)),
        }
    }
}

#[derive(Clone)]
pub struct FeaturePipeline {
    store: Arc<dyn SignalStore>,
    recent_window_days: i64,
    storm_window_days: i64,
}

impl FeaturePipeline {
    pub fn new(store: Arc<dyn SignalStore>, recent_window_days: i64, storm_window_days: i64) -> Self {
        Self {
            store,
            recent_window_days,
            storm_window_days,
        }
    }

    /// Empty set for an unknown property; never an error for missing data.
    pub async fn compute_features(&self, id: PropertyId, as_of: NaiveDate) -> EngineResult<FeatureSet> {
        let ctx = PropertyContext::load(self.store.as_ref(), id, as_of, self.storm_window_days).await?;
        Ok(match ctx {
            Some(ctx) => FeatureSet::from_context(&ctx, self.recent_window_days),
            None => FeatureSet::default(),
        })
    }
}
