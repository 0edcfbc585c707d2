// src/scoring/service.rs
//! Scoring entry points.
//!
//! Batch scoring uses a fixed pool of workers pulling chunks from a bounded
//! channel: at most `concurrency` chunks are in flight, each chunk is scored
//! sequentially, and the producer blocks when the queue is full.

use super::lifecycle::{in_maintenance_window, lifecycle_stage, DEFAULT_WINDOW};
use super::trade::trade_boost;
use super::{round_to, BaselineScorer, ScoreResult};
use crate::config::{BatchConfig, ScoringConfig};
use crate::error::EngineResult;
use crate::features::{FeatureSet, PropertyContext};
use crate::model::{PropertyId, Trade};
use crate::store::{PropertyFilter, SignalStore};
use chrono::{NaiveDate, Utc};
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

pub const PROPERTY_NOT_FOUND: &str = "Property not found";

/// Per-property batch result. Absence and single-item failures are values, not
/// errors, so one bad property never aborts a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScoreOutcome {
    Scored(ScoreResult),
    Missing {
        property_id: PropertyId,
        score: f64,
        error: String,
    },
    Failed {
        property_id: PropertyId,
        score: f64,
        error: String,
    },
}

impl ScoreOutcome {
    pub fn missing(property_id: PropertyId) -> Self {
        ScoreOutcome::Missing {
            property_id,
            score: 0.0,
            error: PROPERTY_NOT_FOUND.to_string(),
        }
    }

    pub fn failed(property_id: PropertyId, error: impl ToString) -> Self {
        ScoreOutcome::Failed {
            property_id,
            score: 0.0,
            error: error.to_string(),
        }
    }

    pub fn property_id(&self) -> PropertyId {
        match self {
            ScoreOutcome::Scored(r) => r.property_id,
            ScoreOutcome::Missing { property_id, .. } | ScoreOutcome::Failed { property_id, .. } => {
                *property_id
            }
        }
    }

    pub fn score(&self) -> f64 {
        match self {
            ScoreOutcome::Scored(r) => r.score,
            ScoreOutcome::Missing { score, .. } | ScoreOutcome::Failed { score, .. } => *score,
        }
    }

    pub fn as_scored(&self) -> Option<&ScoreResult> {
        match self {
            ScoreOutcome::Scored(r) => Some(r),
            _ => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ScoreOutcome::Scored(_) => "scored",
            ScoreOutcome::Missing { .. } => "missing",
            ScoreOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecalcSummary {
    pub total: usize,
    pub scored: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct ScoringService {
    store: Arc<dyn SignalStore>,
    scorer: BaselineScorer,
    scoring: ScoringConfig,
    batch: BatchConfig,
}

impl ScoringService {
    pub fn new(
        store: Arc<dyn SignalStore>,
        scorer: BaselineScorer,
        scoring: ScoringConfig,
        batch: BatchConfig,
    ) -> Self {
        Self {
            store,
            scorer,
            scoring,
            batch,
        }
    }

    /// Score one property. A missing property is `ScoreOutcome::Missing`; store
    /// failures are errors.
    pub async fn score_property(
        &self,
        id: PropertyId,
        trade: Option<Trade>,
        as_of: NaiveDate,
    ) -> EngineResult<ScoreOutcome> {
        let ctx = PropertyContext::load(
            self.store.as_ref(),
            id,
            as_of,
            self.scoring.storm_window_days,
        )
        .await?;
        let Some(ctx) = ctx else {
            tracing::debug!(target: "scoring", property_id = id, "property not found");
            return Ok(ScoreOutcome::missing(id));
        };
        Ok(ScoreOutcome::Scored(self.score_context(&ctx, trade)))
    }

    /// Pure part: features are fully computed before any weight is applied.
    pub fn score_context(&self, ctx: &PropertyContext, trade: Option<Trade>) -> ScoreResult {
        let features = FeatureSet::from_context(ctx, self.scoring.recent_window_days);
        let (base, mut components) = self.scorer.score(ctx, &features, trade);
        let boost = match trade {
            Some(t) => trade_boost(t, ctx, self.scorer.decay(), &mut components),
            None => 0.0,
        };
        let score = round_to((base + boost).clamp(0.0, 1.0), 4);

        tracing::trace!(
            target: "scoring",
            property_id = ctx.property.id,
            trade = trade.map(|t| t.as_str()),
            base,
            boost,
            score,
            "scored"
        );

        ScoreResult {
            property_id: ctx.property.id,
            trade,
            score,
            components,
            lifecycle_stage: lifecycle_stage(ctx.age()),
            in_maintenance_window: in_maintenance_window(ctx.age(), DEFAULT_WINDOW.0, DEFAULT_WINDOW.1),
            features,
            address: ctx.property.situs_address.clone(),
            zip_code: ctx.property.situs_zip.clone(),
            market_value: ctx.property.market_value,
            as_of: ctx.as_of,
        }
    }

    async fn score_or_fail(&self, id: PropertyId, trade: Option<Trade>, as_of: NaiveDate) -> ScoreOutcome {
        let outcome = match self.score_property(id, trade, as_of).await {
            Ok(o) => o,
            Err(e) => {
                tracing::warn!(target: "scoring", error = ?e, property_id = id, "scoring failed");
                ScoreOutcome::failed(id, e)
            }
        };
        counter!("scoring_properties_total", "outcome" => outcome.label()).increment(1);
        outcome
    }

    /// Score `ids` (first `limit` only) with bounded parallelism. Output order
    /// matches input order.
    pub async fn batch_score(
        &self,
        ids: Vec<PropertyId>,
        trade: Option<Trade>,
        limit: Option<usize>,
        as_of: NaiveDate,
    ) -> Vec<ScoreOutcome> {
        let started = Instant::now();
        let ids: Vec<(usize, PropertyId)> = ids
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .enumerate()
            .collect();
        let total = ids.len();
        if total == 0 {
            return Vec::new();
        }

        let chunk_size = self.batch.chunk_size.max(1);
        let chunks = total.div_ceil(chunk_size);
        let workers = self.batch.concurrency.max(1).min(chunks);

        let (tx, rx) = mpsc::channel::<Vec<(usize, PropertyId)>>(workers);
        let rx = Arc::new(Mutex::new(rx));
        let mut pool = JoinSet::new();
        for _ in 0..workers {
            let rx = Arc::clone(&rx);
            let svc = self.clone();
            pool.spawn(async move {
                let mut out = Vec::new();
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(chunk) = next else { break };
                    for (idx, id) in chunk {
                        out.push((idx, svc.score_or_fail(id, trade, as_of).await));
                    }
                }
                out
            });
        }

        for chunk in ids.chunks(chunk_size) {
            if tx.send(chunk.to_vec()).await.is_err() {
                break;
            }
        }
        drop(tx);

        let mut slots: Vec<Option<ScoreOutcome>> = vec![None; total];
        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(part) => {
                    for (idx, outcome) in part {
                        slots[idx] = Some(outcome);
                    }
                }
                Err(e) => tracing::error!(target: "scoring", error = ?e, "batch worker aborted"),
            }
        }

        let results: Vec<ScoreOutcome> = slots
            .into_iter()
            .zip(ids)
            .map(|(slot, (_, id))| slot.unwrap_or_else(|| ScoreOutcome::failed(id, "worker aborted")))
            .collect();

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!("scoring_batch_ms").record(elapsed_ms);
        tracing::info!(
            target: "scoring",
            total,
            workers,
            trade = trade.map(|t| t.as_str()),
            elapsed_ms,
            "batch scoring complete"
        );
        results
    }

    /// Rescore every property with linked signals and persist one row per
    /// (property, trade), flushing every `commit_every` properties.
    pub async fn recalculate_scores(
        &self,
        trade: Option<Trade>,
        limit: Option<usize>,
        as_of: NaiveDate,
    ) -> EngineResult<RecalcSummary> {
        let ids: Vec<PropertyId> = self
            .store
            .query_properties(&PropertyFilter::with_signals(limit))
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();

        let mut summary = RecalcSummary {
            total: ids.len(),
            ..Default::default()
        };
        let commit_every = self.batch.commit_every.max(1);
        for chunk in ids.chunks(commit_every) {
            let outcomes = self.batch_score(chunk.to_vec(), trade, None, as_of).await;
            let now = Utc::now();
            let records: Vec<_> = outcomes
                .iter()
                .filter_map(ScoreOutcome::as_scored)
                .map(|r| r.to_record(now))
                .collect();
            summary.scored += records.len();
            summary.failed += outcomes.len() - records.len();
            self.store.upsert_scores(&records).await?;
            tracing::debug!(
                target: "scoring",
                committed = summary.scored,
                total = summary.total,
                "rescore progress"
            );
        }

        counter!("rescore_runs_total").increment(1);
        gauge!("rescore_last_run_ts").set(Utc::now().timestamp() as f64);
        tracing::info!(
            target: "scoring",
            trade = trade.map(|t| t.as_str()),
            total = summary.total,
            scored = summary.scored,
            failed = summary.failed,
            "score recalculation complete"
        );
        Ok(summary)
    }

    /// Score properties with linked signals, keep those at or above
    /// `min_score`, highest first.
    pub async fn score_properties_with_signals(
        &self,
        trade: Option<Trade>,
        min_score: f64,
        limit: Option<usize>,
        as_of: NaiveDate,
    ) -> EngineResult<Vec<ScoreResult>> {
        let ids: Vec<PropertyId> = self
            .store
            .query_properties(&PropertyFilter::with_signals(None))
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();
        let mut scored: Vec<ScoreResult> = self
            .batch_score(ids, trade, None, as_of)
            .await
            .into_iter()
            .filter_map(|o| match o {
                ScoreOutcome::Scored(r) if r.score >= min_score => Some(r),
                _ => None,
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.property_id.cmp(&b.property_id))
        });
        if let Some(n) = limit {
            scored.truncate(n);
        }
        Ok(scored)
    }
}
