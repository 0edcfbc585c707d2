// src/api.rs
//! HTTP surface over [`Engine`]. Request parsing and status mapping live here;
//! every handler delegates to one engine entry point.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::calibration::{Calibration, CalibrationReport, RecommendationReport};
use crate::engine::Engine;
use crate::error::EngineResult;
use crate::feedback::{FeedbackReceipt, FeedbackSubmission};
use crate::matching::{MatchMethod, MatchQuery, MatchStrategy};
use crate::model::{Property, PropertyId, Trade};
use crate::scoring::ScoreOutcome;

pub type AppState = Arc<Engine>;

pub fn router(engine: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/properties/{id}/score", get(score_property))
        .route("/scores/batch", post(batch_score))
        .route("/match", post(match_signal))
        .route("/calibration/adjustments", get(calibration_adjustments))
        .route("/calibration/recommendations", get(calibration_recommendations))
        .route("/feedback", post(submit_feedback))
        .layer(CorsLayer::very_permissive())
        .with_state(engine)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Default, Deserialize)]
struct TradeParams {
    #[serde(default)]
    trade: Option<String>,
    #[serde(default)]
    as_of: Option<NaiveDate>,
}

async fn score_property(
    State(engine): State<AppState>,
    Path(id): Path<PropertyId>,
    Query(q): Query<TradeParams>,
) -> EngineResult<Json<ScoreOutcome>> {
    let trade = Trade::parse_opt(q.trade.as_deref())?;
    Ok(Json(engine.score_property(id, trade, q.as_of).await?))
}

#[derive(Debug, Deserialize)]
struct BatchReq {
    property_ids: Vec<PropertyId>,
    #[serde(default)]
    trade: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    as_of: Option<NaiveDate>,
}

async fn batch_score(
    State(engine): State<AppState>,
    Json(body): Json<BatchReq>,
) -> EngineResult<Json<Vec<ScoreOutcome>>> {
    let trade = Trade::parse_opt(body.trade.as_deref())?;
    let out = engine
        .batch_score(body.property_ids, trade, body.limit, body.as_of)
        .await;
    Ok(Json(out))
}

#[derive(Debug, Serialize)]
struct MatchResp {
    property_id: Option<PropertyId>,
    confidence: f64,
    method: MatchMethod,
    strategy: Option<MatchStrategy>,
    property: Option<Property>,
}

async fn match_signal(
    State(engine): State<AppState>,
    Json(q): Json<MatchQuery>,
) -> EngineResult<Json<MatchResp>> {
    let r = engine.match_address(&q).await?;
    let method = engine
        .matcher()
        .classify(r.property.is_some(), r.confidence);
    Ok(Json(MatchResp {
        property_id: r.property.as_ref().map(|p| p.id),
        confidence: r.confidence,
        method,
        strategy: r.strategy,
        property: r.property,
    }))
}

async fn calibration_adjustments(
    State(engine): State<AppState>,
    Query(q): Query<TradeParams>,
) -> EngineResult<Json<Calibration<CalibrationReport>>> {
    let trade = Trade::parse_opt(q.trade.as_deref())?;
    Ok(Json(engine.calibration_adjustments(trade).await?))
}

async fn calibration_recommendations(
    State(engine): State<AppState>,
    Query(q): Query<TradeParams>,
) -> EngineResult<Json<Calibration<RecommendationReport>>> {
    let trade = Trade::parse_opt(q.trade.as_deref())?;
    Ok(Json(engine.calibration_recommendations(trade).await?))
}

async fn submit_feedback(
    State(engine): State<AppState>,
    Json(body): Json<FeedbackSubmission>,
) -> EngineResult<(StatusCode, Json<FeedbackReceipt>)> {
    let receipt = engine.submit_feedback(body).await?;
    let status = if receipt.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(receipt)))
}
