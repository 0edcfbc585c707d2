// src/model.rs
//! Domain records: canonical properties, the three civic signal kinds, leads,
//! contractor feedback and persisted score rows.

use crate::error::EngineError;
use crate::scoring::ScoreComponents;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type PropertyId = i64;
pub type LeadId = i64;
pub type ContractorId = i64;

/// Canonical real-estate parcel. Identity is `id`; every other attribute may be
/// refreshed by re-ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub situs_address: Option<String>,
    pub situs_zip: Option<String>,
    pub market_value: Option<f64>,
    pub first_improvement_year: Option<i32>,
    /// Most recent improvement on record, when the appraisal roll has one.
    #[serde(default)]
    pub last_improvement_year: Option<i32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Property {
    /// Age in whole years at `as_of`; `None` when the improvement year is unknown.
    pub fn age(&self, as_of: NaiveDate) -> Option<i32> {
        self.first_improvement_year.map(|y| (as_of.year() - y).max(0))
    }

    /// `None` unless a later improvement than the original build is recorded.
    pub fn years_since_improvement(&self, as_of: NaiveDate) -> Option<i32> {
        self.last_improvement_year.map(|y| (as_of.year() - y).max(0))
    }

    pub fn centroid(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub external_id: String,
    pub property_id: Option<PropertyId>,
    pub violation_type: Option<String>,
    pub description: Option<String>,
    pub violation_date: Option<NaiveDate>,
    pub status: Option<String>,
    pub address: Option<String>,
    pub zip_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Violation {
    /// True when type or description mentions any of `needles` (case-insensitive).
    pub fn mentions(&self, needles: &[&str]) -> bool {
        mentions_any(self.violation_type.as_deref(), needles)
            || mentions_any(self.description.as_deref(), needles)
    }
}

/// 311 service request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub external_id: String,
    pub property_id: Option<PropertyId>,
    pub request_type: Option<String>,
    pub description: Option<String>,
    pub requested_date: Option<NaiveDate>,
    pub status: Option<String>,
    pub address: Option<String>,
    pub zip_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl ServiceRequest {
    pub fn type_mentions(&self, needles: &[&str]) -> bool {
        mentions_any(self.request_type.as_deref(), needles)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StormEvent {
    pub external_id: String,
    pub property_id: Option<PropertyId>,
    /// "hail", "wind", "tornado", ...
    pub event_type: String,
    /// Inches for hail, mph for wind.
    pub magnitude: Option<f64>,
    pub event_date: Option<NaiveDate>,
    pub zip_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

fn mentions_any(field: Option<&str>, needles: &[&str]) -> bool {
    match field {
        Some(text) => {
            let lower = text.to_ascii_lowercase();
            needles.iter().any(|n| lower.contains(n))
        }
        None => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Violation,
    ServiceRequest,
    Storm,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Violation => "violation",
            SignalKind::ServiceRequest => "service_request",
            SignalKind::Storm => "storm",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw record as handed over by an ingestion source, before linkage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub external_id: String,
    pub kind: SignalKind,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Violation type, request type or storm event type.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub magnitude: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
}

impl SignalRecord {
    /// Typed signal carrying the linkage decided by the matcher.
    pub fn into_linked(self, property_id: Option<PropertyId>) -> LinkedSignal {
        match self.kind {
            SignalKind::Violation => LinkedSignal::Violation(Violation {
                external_id: self.external_id,
                property_id,
                violation_type: self.category,
                description: self.description,
                violation_date: self.date,
                status: self.status,
                address: self.address,
                zip_code: self.zip_code,
                latitude: self.latitude,
                longitude: self.longitude,
            }),
            SignalKind::ServiceRequest => LinkedSignal::Request(ServiceRequest {
                external_id: self.external_id,
                property_id,
                request_type: self.category,
                description: self.description,
                requested_date: self.date,
                status: self.status,
                address: self.address,
                zip_code: self.zip_code,
                latitude: self.latitude,
                longitude: self.longitude,
            }),
            SignalKind::Storm => LinkedSignal::Storm(StormEvent {
                external_id: self.external_id,
                property_id,
                event_type: self.category.unwrap_or_default().to_ascii_lowercase(),
                magnitude: self.magnitude,
                event_date: self.date,
                zip_code: self.zip_code,
                latitude: self.latitude,
                longitude: self.longitude,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkedSignal {
    Violation(Violation),
    Request(ServiceRequest),
    Storm(StormEvent),
}

impl LinkedSignal {
    pub fn external_id(&self) -> &str {
        match self {
            LinkedSignal::Violation(v) => &v.external_id,
            LinkedSignal::Request(r) => &r.external_id,
            LinkedSignal::Storm(s) => &s.external_id,
        }
    }

    pub fn property_id(&self) -> Option<PropertyId> {
        match self {
            LinkedSignal::Violation(v) => v.property_id,
            LinkedSignal::Request(r) => r.property_id,
            LinkedSignal::Storm(s) => s.property_id,
        }
    }
}

/// Contractor trades with a dedicated scorer. Closed set: anything else is a
/// validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trade {
    Roofing,
    Hvac,
    Siding,
    Electrical,
}

impl Trade {
    pub const ALL: [Trade; 4] = [Trade::Roofing, Trade::Hvac, Trade::Siding, Trade::Electrical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Trade::Roofing => "roofing",
            Trade::Hvac => "hvac",
            Trade::Siding => "siding",
            Trade::Electrical => "electrical",
        }
    }

    /// Parse an optional query/body value; blank means "no trade".
    pub fn parse_opt(raw: Option<&str>) -> Result<Option<Trade>, EngineError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => s.parse().map(Some),
        }
    }
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Trade {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "roofing" => Ok(Trade::Roofing),
            "hvac" => Ok(Trade::Hvac),
            "siding" => Ok(Trade::Siding),
            "electrical" => Ok(Trade::Electrical),
            other => Err(EngineError::validation(format!(
                "unknown trade '{other}' (expected roofing, hvac, siding or electrical)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Delivered,
    Converted,
    Rejected,
}

/// A scored property handed to a contractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub property_id: PropertyId,
    pub contractor_id: Option<ContractorId>,
    pub trade: Option<Trade>,
    /// Score at lead creation; used when no score row exists any more.
    pub intent_score: f64,
    pub status: LeadStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackOutcome {
    Won,
    Lost,
    NoResponse,
    NotInterested,
    WrongLead,
}

impl FromStr for FeedbackOutcome {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "won" => Ok(FeedbackOutcome::Won),
            "lost" => Ok(FeedbackOutcome::Lost),
            "no_response" => Ok(FeedbackOutcome::NoResponse),
            "not_interested" => Ok(FeedbackOutcome::NotInterested),
            "wrong_lead" => Ok(FeedbackOutcome::WrongLead),
            other => Err(EngineError::validation(format!(
                "invalid outcome '{other}' (expected won, lost, no_response, not_interested or wrong_lead)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub lead_id: LeadId,
    pub contractor_id: ContractorId,
    pub outcome: FeedbackOutcome,
    pub converted: bool,
    pub conversion_value: Option<f64>,
    pub lead_quality_rating: Option<u8>,
    pub contact_accuracy_rating: Option<u8>,
    pub timing_rating: Option<u8>,
    pub notes: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Latest score per (property, trade); overwritten on every rescoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub property_id: PropertyId,
    pub trade: Option<Trade>,
    pub score: f64,
    pub components: ScoreComponents,
    pub scored_at: DateTime<Utc>,
}

/// One (score, converted) observation joined from lead + feedback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSample {
    pub score: f64,
    pub converted: bool,
}
