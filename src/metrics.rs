// src/metrics.rs
//! Prometheus exposition.
//!
//! Components record through the `metrics` facade; without an installed recorder
//! (unit/integration tests) every call is a no-op.

use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Router exposing `/metrics` in the Prometheus text format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

/// One-time registration so every series shows up on /metrics with help text.
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("match_attempts_total", "Address/geo match attempts.");
        describe_counter!(
            "match_outcomes_total",
            "Match results by method (high_confidence, medium_confidence, no_match)."
        );
        describe_counter!(
            "scoring_properties_total",
            "Properties scored, by outcome (scored, missing, failed)."
        );
        describe_counter!("rescore_runs_total", "Completed score recalculation runs.");
        describe_counter!("ingest_records_total", "Signal records fetched, by source.");
        describe_counter!(
            "ingest_fetch_retries_total",
            "HTTP page fetches retried after a failure."
        );
        describe_counter!(
            "ingest_fetch_errors_total",
            "HTTP page fetches that exhausted all retries."
        );
        describe_histogram!("scoring_batch_ms", "Batch scoring wall time in milliseconds.");
        describe_gauge!(
            "rescore_last_run_ts",
            "Unix ts when score recalculation last finished."
        );
    });
}
