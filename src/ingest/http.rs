// src/ingest/http.rs
//! Paginated JSON open-data endpoint (`$limit` / `$offset` paging).

use super::SignalSource;
use crate::config::{FieldMap, IngestConfig, SourceConfig};
use crate::error::{EngineError, EngineResult};
use crate::model::{SignalKind, SignalRecord};
use chrono::NaiveDate;
use metrics::counter;
use serde_json::{Map, Value};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &IngestConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base: Duration::from_millis(cfg.backoff_base_ms),
            max: Duration::from_millis(cfg.backoff_max_ms),
        }
    }

    /// Delay after failed attempt `attempt` (1-based): base·2^(attempt-1), capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base.saturating_mul(factor).min(self.max)
    }
}

enum Failure {
    Retry(String),
    Fatal(String),
}

pub struct HttpSignalSource {
    name: String,
    kind: SignalKind,
    url: String,
    fields: FieldMap,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpSignalSource {
    pub fn new(source: &SourceConfig, cfg: &IngestConfig) -> EngineResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("locallift-intent/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(cfg.timeout_secs.min(10)))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| EngineError::Config(format!("http client for {}: {e}", source.name)))?;
        Ok(Self {
            name: source.name.clone(),
            kind: source.kind,
            url: source.url.clone(),
            fields: source.fields.clone(),
            client,
            retry: RetryPolicy::from_config(cfg),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn fetch_once(&self, offset: usize, limit: usize) -> Result<Vec<Value>, Failure> {
        let resp = self
            .client
            .get(&self.url)
            .query(&[("$limit", limit.to_string()), ("$offset", offset.to_string())])
            .send()
            .await
            .map_err(|e| Failure::Retry(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let msg = format!("HTTP {status}");
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                Failure::Retry(msg)
            } else {
                Failure::Fatal(msg)
            });
        }
        resp.json::<Vec<Value>>()
            .await
            .map_err(|e| Failure::Retry(format!("decoding body: {e}")))
    }
}

#[async_trait::async_trait]
impl SignalSource for HttpSignalSource {
    async fn fetch_page(&self, offset: usize, limit: usize) -> EngineResult<Vec<SignalRecord>> {
        let mut attempt = 0;
        let rows = loop {
            attempt += 1;
            match self.fetch_once(offset, limit).await {
                Ok(rows) => break rows,
                Err(Failure::Retry(msg)) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    counter!("ingest_fetch_retries_total").increment(1);
                    tracing::warn!(
                        target: "ingest",
                        source = %self.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %msg,
                        "fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(Failure::Retry(msg)) | Err(Failure::Fatal(msg)) => {
                    counter!("ingest_fetch_errors_total").increment(1);
                    tracing::error!(target: "ingest", source = %self.name, attempt, error = %msg, "fetch failed");
                    return Err(EngineError::Upstream {
                        source_name: self.name.clone(),
                        attempts: attempt,
                        message: msg,
                    });
                }
            }
        };

        let records: Vec<SignalRecord> = rows
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|row| record_from_row(row, self.kind, &self.fields))
            .collect();
        if records.len() < rows.len() {
            tracing::debug!(
                target: "ingest",
                source = %self.name,
                skipped = rows.len() - records.len(),
                "rows without an id skipped"
            );
        }
        Ok(records)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn text(row: &Map<String, Value>, key: &str) -> Option<String> {
    match row.get(key)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(row: &Map<String, Value>, key: &str) -> Option<f64> {
    match row.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Accepts `YYYY-MM-DD` with or without a trailing time part.
fn date(row: &Map<String, Value>, key: &str) -> Option<NaiveDate> {
    let raw = text(row, key)?;
    let day = raw.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Map one upstream row; rows without an external id are dropped.
pub fn record_from_row(
    row: &Map<String, Value>,
    kind: SignalKind,
    fields: &FieldMap,
) -> Option<SignalRecord> {
    Some(SignalRecord {
        external_id: text(row, &fields.external_id)?,
        kind,
        address: text(row, &fields.address),
        zip_code: text(row, &fields.zip_code),
        latitude: number(row, &fields.latitude),
        longitude: number(row, &fields.longitude),
        category: text(row, &fields.category),
        description: text(row, &fields.description),
        date: date(row, &fields.date),
        magnitude: number(row, &fields.magnitude),
        status: text(row, &fields.status),
    })
}
