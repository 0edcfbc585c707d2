// src/engine.rs
//! # Engine
//! Wires one [`EngineConfig`] and one store into every component and exposes
//! the external entry points. Calls without an explicit reference date use
//! today's date in UTC.

use crate::calibration::{Calibration, CalibrationEngine, CalibrationReport, RecommendationReport};
use crate::config::EngineConfig;
use crate::decay::SignalDecay;
use crate::error::EngineResult;
use crate::features::{FeaturePipeline, FeatureSet};
use crate::feedback::{FeedbackReceipt, FeedbackService, FeedbackSubmission};
use crate::ingest::http::HttpSignalSource;
use crate::ingest::{LinkStats, SignalLinker, SignalSource};
use crate::matching::{MatchQuery, MatchResult, PropertyMatcher, SignalMatch};
use crate::model::{PropertyId, Trade};
use crate::scoring::{BaselineScorer, RecalcSummary, ScoreOutcome, ScoringService};
use crate::store::SignalStore;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;

pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn SignalStore>,
    matcher: PropertyMatcher,
    features: FeaturePipeline,
    scoring: ScoringService,
    calibration: CalibrationEngine,
    feedback: FeedbackService,
    linker: SignalLinker,
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

impl Engine {
    pub fn new(config: EngineConfig, store: Arc<dyn SignalStore>) -> EngineResult<Self> {
        config.validate()?;
        let decay = SignalDecay::new(config.decay.half_life_days)?;
        let matcher = PropertyMatcher::new(store.clone(), config.matching.clone());
        let features = FeaturePipeline::new(
            store.clone(),
            config.scoring.recent_window_days,
            config.scoring.storm_window_days,
        );
        let scoring = ScoringService::new(
            store.clone(),
            BaselineScorer::new(config.scoring.clone(), decay),
            config.scoring.clone(),
            config.batch.clone(),
        );
        let calibration = CalibrationEngine::new(store.clone(), config.calibration.clone());
        let feedback = FeedbackService::new(store.clone());
        let linker = SignalLinker::new(matcher.clone(), store.clone(), config.ingest.page_size);
        Ok(Self {
            config,
            store,
            matcher,
            features,
            scoring,
            calibration,
            feedback,
            linker,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SignalStore> {
        &self.store
    }

    pub fn matcher(&self) -> &PropertyMatcher {
        &self.matcher
    }

    pub fn scoring(&self) -> &ScoringService {
        &self.scoring
    }

    pub fn linker(&self) -> &SignalLinker {
        &self.linker
    }

    pub fn calibration(&self) -> &CalibrationEngine {
        &self.calibration
    }

    // ---- matching ----

    pub async fn match_address(&self, q: &MatchQuery) -> EngineResult<MatchResult> {
        self.matcher.match_address(q).await
    }

    pub async fn match_signal(&self, q: &MatchQuery) -> EngineResult<SignalMatch> {
        self.matcher.match_signal(q).await
    }

    // ---- features / scoring ----

    pub async fn compute_features(&self, id: PropertyId, as_of: Option<NaiveDate>) -> EngineResult<FeatureSet> {
        self.features
            .compute_features(id, as_of.unwrap_or_else(today))
            .await
    }

    pub async fn score_property(
        &self,
        id: PropertyId,
        trade: Option<Trade>,
        as_of: Option<NaiveDate>,
    ) -> EngineResult<ScoreOutcome> {
        self.scoring
            .score_property(id, trade, as_of.unwrap_or_else(today))
            .await
    }

    pub async fn batch_score(
        &self,
        ids: Vec<PropertyId>,
        trade: Option<Trade>,
        limit: Option<usize>,
        as_of: Option<NaiveDate>,
    ) -> Vec<ScoreOutcome> {
        self.scoring
            .batch_score(ids, trade, limit, as_of.unwrap_or_else(today))
            .await
    }

    pub async fn recalculate_scores(
        &self,
        trade: Option<Trade>,
        limit: Option<usize>,
    ) -> EngineResult<RecalcSummary> {
        self.scoring.recalculate_scores(trade, limit, today()).await
    }

    /// One rescoring pass per trade. A failing trade is logged and skipped.
    pub async fn recalculate_all_trades(&self) -> Vec<(Trade, RecalcSummary)> {
        let mut out = Vec::with_capacity(Trade::ALL.len());
        for trade in Trade::ALL {
            match self.recalculate_scores(Some(trade), None).await {
                Ok(summary) => out.push((trade, summary)),
                Err(e) => {
                    tracing::error!(target: "scoring", error = ?e, trade = trade.as_str(), "rescore failed")
                }
            }
        }
        out
    }

    // ---- calibration / feedback ----

    pub async fn calibration_adjustments(
        &self,
        trade: Option<Trade>,
    ) -> EngineResult<Calibration<CalibrationReport>> {
        self.calibration.calibration_adjustments(trade).await
    }

    pub async fn calibration_recommendations(
        &self,
        trade: Option<Trade>,
    ) -> EngineResult<Calibration<RecommendationReport>> {
        self.calibration.calibration_recommendations(trade).await
    }

    pub async fn submit_feedback(&self, sub: FeedbackSubmission) -> EngineResult<FeedbackReceipt> {
        self.feedback.submit_feedback(sub).await
    }

    // ---- ingestion ----

    pub async fn link_signals(&self, source: &dyn SignalSource) -> EngineResult<LinkStats> {
        self.linker.link_signals(source).await
    }

    /// HTTP sources declared under `[[ingest.sources]]`.
    pub fn configured_sources(&self) -> EngineResult<Vec<HttpSignalSource>> {
        self.config
            .ingest
            .sources
            .iter()
            .map(|s| HttpSignalSource::new(s, &self.config.ingest))
            .collect()
    }
}
