// src/config/sources.rs
use crate::model::SignalKind;
use serde::{Deserialize, Serialize};

/// One paginated open-data endpoint.
///
/// ```toml
/// [[ingest.sources]]
/// name = "austin_code_violations"
/// kind = "violation"
/// url = "https://data.example.gov/resource/abcd-1234.json"
/// [ingest.sources.fields]
/// external_id = "case_id"
/// date = "opened_date"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub kind: SignalKind,
    pub url: String,
    #[serde(default)]
    pub fields: FieldMap,
}

fn f_external_id() -> String {
    "id".into()
}
fn f_address() -> String {
    "address".into()
}
fn f_zip_code() -> String {
    "zip_code".into()
}
fn f_latitude() -> String {
    "latitude".into()
}
fn f_longitude() -> String {
    "longitude".into()
}
fn f_category() -> String {
    "type".into()
}
fn f_description() -> String {
    "description".into()
}
fn f_date() -> String {
    "date".into()
}
fn f_magnitude() -> String {
    "magnitude".into()
}
fn f_status() -> String {
    "status".into()
}

/// JSON field names in the upstream payload for each `SignalRecord` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMap {
    #[serde(default = "f_external_id")]
    pub external_id: String,
    #[serde(default = "f_address")]
    pub address: String,
    #[serde(default = "f_zip_code")]
    pub zip_code: String,
    #[serde(default = "f_latitude")]
    pub latitude: String,
    #[serde(default = "f_longitude")]
    pub longitude: String,
    #[serde(default = "f_category")]
    pub category: String,
    #[serde(default = "f_description")]
    pub description: String,
    #[serde(default = "f_date")]
    pub date: String,
    #[serde(default = "f_magnitude")]
    pub magnitude: String,
    #[serde(default = "f_status")]
    pub status: String,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            external_id: f_external_id(),
            address: f_address(),
            zip_code: f_zip_code(),
            latitude: f_latitude(),
            longitude: f_longitude(),
            category: f_category(),
            description: f_description(),
            date: f_date(),
            magnitude: f_magnitude(),
            status: f_status(),
        }
    }
}
