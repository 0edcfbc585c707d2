// src/store/mod.rs
//! Persistence seam.
//!
//! The engine only needs the access patterns below. Writers are idempotent
//! upserts keyed by natural ids (external record id, property id,
//! (property, trade), (lead, contractor)); nothing is locked row-by-row.

pub mod memory;

use crate::error::EngineResult;
use crate::model::{
    CalibrationSample, Feedback, Lead, LeadId, LinkedSignal, Property, PropertyId, ScoreRecord,
    ServiceRequest, StormEvent, Trade, Violation,
};
use chrono::NaiveDate;

pub use memory::{MemoryStore, Snapshot};

/// Axis-aligned lat/lon box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn around(lat: f64, lon: f64, delta: f64) -> Self {
        Self {
            min_lat: lat - delta,
            max_lat: lat + delta,
            min_lon: lon - delta,
            max_lon: lon + delta,
        }
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }
}

/// Conjunctive property query. Results come back ordered by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyFilter {
    pub zip: Option<String>,
    pub bbox: Option<BoundingBox>,
    /// Only properties with at least one linked violation or request.
    pub with_signals: bool,
    pub limit: Option<usize>,
}

impl PropertyFilter {
    pub fn in_zip(zip: impl Into<String>) -> Self {
        Self {
            zip: Some(zip.into()),
            ..Self::default()
        }
    }

    pub fn in_box(bbox: BoundingBox) -> Self {
        Self {
            bbox: Some(bbox),
            ..Self::default()
        }
    }

    pub fn with_signals(limit: Option<usize>) -> Self {
        Self {
            with_signals: true,
            limit,
            ..Self::default()
        }
    }
}

#[async_trait::async_trait]
pub trait SignalStore: Send + Sync {
    async fn get_property(&self, id: PropertyId) -> EngineResult<Option<Property>>;
    async fn query_properties(&self, filter: &PropertyFilter) -> EngineResult<Vec<Property>>;
    async fn upsert_property(&self, property: Property) -> EngineResult<()>;

    async fn violations_for(&self, id: PropertyId) -> EngineResult<Vec<Violation>>;
    async fn requests_for(&self, id: PropertyId) -> EngineResult<Vec<ServiceRequest>>;
    /// Storm events in `zip` dated on or after `since`.
    async fn storms_in_zip(&self, zip: &str, since: NaiveDate) -> EngineResult<Vec<StormEvent>>;
    /// Violations + requests linked to any property in `zip`.
    async fn zip_signal_count(&self, zip: &str) -> EngineResult<usize>;

    /// Returns true when the external id was not seen before.
    async fn upsert_signal(&self, signal: LinkedSignal) -> EngineResult<bool>;

    async fn upsert_scores(&self, records: &[ScoreRecord]) -> EngineResult<()>;
    async fn get_score(
        &self,
        id: PropertyId,
        trade: Option<Trade>,
    ) -> EngineResult<Option<ScoreRecord>>;

    async fn get_lead(&self, id: LeadId) -> EngineResult<Option<Lead>>;
    async fn upsert_lead(&self, lead: Lead) -> EngineResult<()>;
    /// Returns true when this (lead, contractor) pair had no feedback yet.
    async fn upsert_feedback(&self, feedback: Feedback) -> EngineResult<bool>;

    /// (score, converted) for every lead with feedback, optionally one trade only.
    async fn calibration_samples(
        &self,
        trade: Option<Trade>,
    ) -> EngineResult<Vec<CalibrationSample>>;
}
