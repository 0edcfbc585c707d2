// src/config/mod.rs
//! Engine configuration.
//!
//! One explicitly constructed [`EngineConfig`] is passed into every component.
//! Load order:
//! 1. built-in defaults (serde default functions below)
//! 2. TOML file at `$LOCALLIFT_CONFIG_PATH`, else `config/locallift.toml` (missing file => defaults)
//! 3. `LOCALLIFT_*` env overrides
//!
//! The result is validated once; bad values surface as `EngineError::Config`.

pub mod sources;

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use sources::{FieldMap, SourceConfig};

pub const DEFAULT_CONFIG_PATH: &str = "config/locallift.toml";

pub const ENV_CONFIG_PATH: &str = "LOCALLIFT_CONFIG_PATH";
pub const ENV_HOST: &str = "LOCALLIFT_HOST";
pub const ENV_PORT: &str = "LOCALLIFT_PORT";
pub const ENV_LOG_LEVEL: &str = "LOCALLIFT_LOG_LEVEL";
pub const ENV_MATCH_THRESHOLD: &str = "LOCALLIFT_MATCH_THRESHOLD";
pub const ENV_HALF_LIFE_DAYS: &str = "LOCALLIFT_HALF_LIFE_DAYS";
pub const ENV_MIN_FEEDBACK: &str = "LOCALLIFT_MIN_FEEDBACK";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub decay: DecayConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

// ---- server ----

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ---- telemetry ----

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// EnvFilter directive used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

// ---- matching ----

fn default_match_threshold() -> f64 {
    0.7
}
fn default_high_confidence() -> f64 {
    0.9
}
fn default_bbox_delta() -> f64 {
    0.001
}
fn default_street_number_boost() -> f64 {
    0.2
}
fn default_address_weight() -> f64 {
    0.7
}
fn default_distance_weight() -> f64 {
    0.3
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Minimum confidence for linking a signal to a property.
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
    #[serde(default = "default_high_confidence")]
    pub high_confidence: f64,
    /// Half-width of the coordinate bounding box in degrees (~100 m).
    #[serde(default = "default_bbox_delta")]
    pub bbox_delta: f64,
    #[serde(default = "default_street_number_boost")]
    pub street_number_boost: f64,
    #[serde(default = "default_address_weight")]
    pub address_weight: f64,
    #[serde(default = "default_distance_weight")]
    pub distance_weight: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            match_threshold: default_match_threshold(),
            high_confidence: default_high_confidence(),
            bbox_delta: default_bbox_delta(),
            street_number_boost: default_street_number_boost(),
            address_weight: default_address_weight(),
            distance_weight: default_distance_weight(),
        }
    }
}

// ---- decay ----

fn default_half_life_days() -> f64 {
    30.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayConfig {
    #[serde(default = "default_half_life_days")]
    pub half_life_days: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            half_life_days: default_half_life_days(),
        }
    }
}

// ---- scoring ----

fn default_violation_weight() -> f64 {
    0.30
}
fn default_request_weight() -> f64 {
    0.25
}
fn default_lifecycle_weight() -> f64 {
    0.15
}
fn default_interaction_weight() -> f64 {
    0.10
}
fn default_recency_boost() -> f64 {
    0.10
}
fn default_recent_window_days() -> i64 {
    30
}
fn default_storm_window_days() -> i64 {
    90
}
fn default_signal_normalizer() -> f64 {
    3.0
}
fn default_interaction_normalizer() -> f64 {
    5.0
}

/// Baseline weights. They intentionally sum to 0.8; the rest is headroom for
/// the recency and trade boosts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_violation_weight")]
    pub violation_weight: f64,
    #[serde(default = "default_request_weight")]
    pub request_weight: f64,
    #[serde(default = "default_lifecycle_weight")]
    pub lifecycle_weight: f64,
    #[serde(default = "default_interaction_weight")]
    pub interaction_weight: f64,
    #[serde(default = "default_recency_boost")]
    pub recency_boost: f64,
    #[serde(default = "default_recent_window_days")]
    pub recent_window_days: i64,
    #[serde(default = "default_storm_window_days")]
    pub storm_window_days: i64,
    #[serde(default = "default_signal_normalizer")]
    pub signal_normalizer: f64,
    #[serde(default = "default_interaction_normalizer")]
    pub interaction_normalizer: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            violation_weight: default_violation_weight(),
            request_weight: default_request_weight(),
            lifecycle_weight: default_lifecycle_weight(),
            interaction_weight: default_interaction_weight(),
            recency_boost: default_recency_boost(),
            recent_window_days: default_recent_window_days(),
            storm_window_days: default_storm_window_days(),
            signal_normalizer: default_signal_normalizer(),
            interaction_normalizer: default_interaction_normalizer(),
        }
    }
}

// ---- calibration ----

fn default_min_samples() -> usize {
    5
}
fn default_min_factor() -> f64 {
    0.5
}
fn default_max_factor() -> f64 {
    2.0
}
fn default_recommend_pct() -> f64 {
    10.0
}
fn default_high_priority_pct() -> f64 {
    20.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    #[serde(default = "default_min_factor")]
    pub min_factor: f64,
    #[serde(default = "default_max_factor")]
    pub max_factor: f64,
    /// |adjustment_pct| above this becomes a recommendation.
    #[serde(default = "default_recommend_pct")]
    pub recommend_pct: f64,
    #[serde(default = "default_high_priority_pct")]
    pub high_priority_pct: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            min_samples: default_min_samples(),
            min_factor: default_min_factor(),
            max_factor: default_max_factor(),
            recommend_pct: default_recommend_pct(),
            high_priority_pct: default_high_priority_pct(),
        }
    }
}

// ---- batch ----

fn default_concurrency() -> usize {
    4
}
fn default_chunk_size() -> usize {
    1000
}
fn default_commit_every() -> usize {
    100
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Chunks scored at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_commit_every")]
    pub commit_every: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            chunk_size: default_chunk_size(),
            commit_every: default_commit_every(),
        }
    }
}

// ---- ingest ----

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    5
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_backoff_max_ms() -> u64 {
    10_000
}
fn default_page_size() -> usize {
    1000
}
fn default_link_interval_secs() -> u64 {
    3600
}
fn default_rescore_interval_secs() -> u64 {
    86_400
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_link_interval_secs")]
    pub link_interval_secs: u64,
    #[serde(default = "default_rescore_interval_secs")]
    pub rescore_interval_secs: u64,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            page_size: default_page_size(),
            link_interval_secs: default_link_interval_secs(),
            rescore_interval_secs: default_rescore_interval_secs(),
            sources: Vec::new(),
        }
    }
}

// ---- loading ----

impl EngineConfig {
    /// Resolve path from env (or default), read it if present, apply env overrides.
    pub fn load() -> EngineResult<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        let explicit = std::env::var(ENV_CONFIG_PATH).is_ok();

        let mut cfg = if path.exists() {
            Self::from_file(&path)?
        } else if explicit {
            return Err(EngineError::Config(format!(
                "{ENV_CONFIG_PATH} points to non-existent path {}",
                path.display()
            )));
        } else {
            tracing::debug!(target: "config", path = %path.display(), "no config file, using defaults");
            Self::default()
        };

        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML file without env overrides.
    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(toml_str: &str) -> EngineResult<Self> {
        let cfg: EngineConfig =
            toml::from_str(toml_str).map_err(|e| EngineError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// `LOCALLIFT_*` overrides. Unparsable values are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        if let Some(h) = env_string(ENV_HOST) {
            self.server.host = h;
        }
        if let Some(p) = env_parse::<u16>(ENV_PORT) {
            self.server.port = p;
        }
        if let Some(l) = env_string(ENV_LOG_LEVEL) {
            self.telemetry.level = l;
        }
        if let Some(t) = env_parse::<f64>(ENV_MATCH_THRESHOLD) {
            self.matching.match_threshold = t.clamp(0.0, 1.0);
        }
        if let Some(h) = env_parse::<f64>(ENV_HALF_LIFE_DAYS) {
            self.decay.half_life_days = h;
        }
        if let Some(n) = env_parse::<usize>(ENV_MIN_FEEDBACK) {
            self.calibration.min_samples = n;
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        let m = &self.matching;
        check_unit("matching.match_threshold", m.match_threshold)?;
        check_unit("matching.high_confidence", m.high_confidence)?;
        if m.high_confidence < m.match_threshold {
            return Err(EngineError::Config(
                "matching.high_confidence must be >= matching.match_threshold".into(),
            ));
        }
        if !(m.bbox_delta.is_finite() && m.bbox_delta > 0.0) {
            return Err(EngineError::Config("matching.bbox_delta must be > 0".into()));
        }
        if !(self.decay.half_life_days.is_finite() && self.decay.half_life_days > 0.0) {
            return Err(EngineError::Config("decay.half_life_days must be > 0".into()));
        }
        let s = &self.scoring;
        if s.signal_normalizer <= 0.0 || s.interaction_normalizer <= 0.0 {
            return Err(EngineError::Config("scoring normalizers must be > 0".into()));
        }
        let c = &self.calibration;
        if !(c.min_factor > 0.0 && c.min_factor <= c.max_factor) {
            return Err(EngineError::Config(
                "calibration factor bounds must satisfy 0 < min_factor <= max_factor".into(),
            ));
        }
        let b = &self.batch;
        if b.concurrency == 0 || b.chunk_size == 0 || b.commit_every == 0 {
            return Err(EngineError::Config(
                "batch.concurrency, chunk_size and commit_every must be >= 1".into(),
            ));
        }
        if self.ingest.max_attempts == 0 {
            return Err(EngineError::Config("ingest.max_attempts must be >= 1".into()));
        }
        Ok(())
    }
}

fn check_unit(name: &str, v: f64) -> EngineResult<()> {
    if (0.0..=1.0).contains(&v) {
        Ok(())
    } else {
        Err(EngineError::Config(format!("{name} must be within [0, 1], got {v}")))
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env_string(key)?;
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(target: "config", key, value = %raw, "ignoring unparsable env override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = EngineConfig::default();
        assert!((c.matching.match_threshold - 0.7).abs() < 1e-9);
        assert!((c.matching.high_confidence - 0.9).abs() < 1e-9);
        assert!((c.decay.half_life_days - 30.0).abs() < 1e-9);
        let s = &c.scoring;
        let sum = s.violation_weight + s.request_weight + s.lifecycle_weight + s.interaction_weight;
        assert!((sum - 0.8).abs() < 1e-9);
        assert_eq!(c.batch.concurrency, 4);
        assert_eq!(c.calibration.min_samples, 5);
        assert_eq!(c.server.bind_addr(), "127.0.0.1:8080");
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults_elsewhere() {
        let c = EngineConfig::from_toml_str(
            r#"
            [matching]
            match_threshold = 0.75

            [telemetry]
            format = "json"
            "#,
        )
        .unwrap();
        assert!((c.matching.match_threshold - 0.75).abs() < 1e-9);
        assert!((c.matching.bbox_delta - 0.001).abs() < 1e-12);
        assert_eq!(c.telemetry.format, LogFormat::Json);
        assert_eq!(c.batch.chunk_size, 1000);
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let err = EngineConfig::from_toml_str("[decay]\nhalf_life_days = 0.0\n").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));

        let err = EngineConfig::from_toml_str(
            "[matching]\nmatch_threshold = 0.95\nhigh_confidence = 0.9\n",
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));

        let err = EngineConfig::from_toml_str("[batch]\nconcurrency = 0\n").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = EngineConfig::from_toml_str("[matching\n").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
