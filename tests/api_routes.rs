// tests/api_routes.rs
//
// HTTP-level tests for the public Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::NaiveDate;
use serde_json::{json, Value};
use tower::ServiceExt as _; // for `oneshot`

use locallift_intent::model::{Lead, LeadStatus, LinkedSignal, Property, Violation};
use locallift_intent::store::{MemoryStore, SignalStore};
use locallift_intent::{api, Engine, EngineConfig};

const BODY_LIMIT: usize = 1024 * 1024;

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .upsert_property(Property {
            id: 1,
            situs_address: Some("4507 KNAP HOLW".into()),
            situs_zip: Some("78731".into()),
            market_value: Some(450_000.0),
            first_improvement_year: Some(2007),
            last_improvement_year: None,
            latitude: Some(30.3301),
            longitude: Some(-97.7701),
        })
        .await
        .unwrap();
    store
        .upsert_signal(LinkedSignal::Violation(Violation {
            external_id: "v-1".into(),
            property_id: Some(1),
            violation_type: Some("Roof damage".into()),
            description: None,
            violation_date: Some(day(2025, 6, 25)),
            status: Some("open".into()),
            address: None,
            zip_code: Some("78731".into()),
            latitude: None,
            longitude: None,
        }))
        .await
        .unwrap();
    store
        .upsert_lead(Lead {
            id: 7,
            property_id: 1,
            contractor_id: Some(3),
            trade: None,
            intent_score: 0.55,
            status: LeadStatus::Delivered,
        })
        .await
        .unwrap();
    store
}

async fn test_router() -> Router {
    let engine = Engine::new(EngineConfig::default(), seeded_store().await).unwrap();
    api::router(Arc::new(engine))
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let v = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, v)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build GET")
}

fn post(uri: &str, payload: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("build POST")
}

#[tokio::test]
async fn health_is_ok() {
    let app = test_router().await;
    let (status, v) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["status"], "ok");
}

#[tokio::test]
async fn score_existing_property_with_trade() {
    let app = test_router().await;
    let (status, v) = send(&app, get("/properties/1/score?trade=roofing&as_of=2025-06-30")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["property_id"], 1);
    assert_eq!(v["trade"], "roofing");
    let score = v["score"].as_f64().unwrap();
    assert!(score > 0.0 && score <= 1.0, "score out of range: {score}");
    assert!(v["components"]["roof_violation_boost"].is_number());
    assert_eq!(v["components"]["age_window_boost"], 0.2);
    assert!(v["features"]["days_since_last_violation"].is_number());
}

#[tokio::test]
async fn missing_property_is_inline_error() {
    let app = test_router().await;
    let (status, v) = send(&app, get("/properties/999/score")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["score"], 0.0);
    assert_eq!(v["error"], "Property not found");
}

#[tokio::test]
async fn unknown_trade_is_rejected() {
    let app = test_router().await;
    let (status, v) = send(&app, get("/properties/1/score?trade=plumbing")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(v["error"].as_str().unwrap().contains("plumbing"));

    let (status, _) = send(
        &app,
        post("/scores/batch", json!({ "property_ids": [1], "trade": "windows" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn batch_keeps_order_and_limit() {
    let app = test_router().await;
    let (status, v) = send(
        &app,
        post(
            "/scores/batch",
            json!({ "property_ids": [999, 1, 5], "trade": "hvac", "limit": 2, "as_of": "2025-06-30" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let arr = v.as_array().unwrap();
    assert_eq!(arr.len(), 2);
    assert_eq!(arr[0]["property_id"], 999);
    assert_eq!(arr[0]["error"], "Property not found");
    assert_eq!(arr[1]["property_id"], 1);
    assert!(arr[1].get("error").is_none());
}

#[tokio::test]
async fn match_endpoint_reports_method() {
    let app = test_router().await;
    let (status, v) = send(
        &app,
        post("/match", json!({ "address": "4507 Knap Hollow, Austin, TX 78731" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["property_id"], 1);
    assert_eq!(v["method"], "high_confidence");
    assert_eq!(v["strategy"], "zip_address");

    let (status, v) = send(&app, post("/match", json!({ "zip_code": "78731" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["method"], "no_match");
    assert_eq!(v["confidence"], 0.0);
}

#[tokio::test]
async fn calibration_without_feedback_is_payload_error() {
    let app = test_router().await;
    let (status, v) = send(&app, get("/calibration/adjustments")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["data_points"], 0);
    assert_eq!(v["required"], 5);
    assert!(v["error"].as_str().unwrap().contains("insufficient"));

    let (status, v) = send(&app, get("/calibration/recommendations?trade=siding")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(v.get("error").is_some());
}

#[tokio::test]
async fn feedback_create_update_and_errors() {
    let app = test_router().await;
    let body = json!({ "lead_id": 7, "contractor_id": 3, "outcome": "won", "converted": true, "timing_rating": 4 });
    let (status, v) = send(&app, post("/feedback", body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(v["created"], true);
    assert_eq!(v["outcome"], "won");

    let (status, v) = send(&app, post("/feedback", body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["created"], false);

    let (status, _) = send(
        &app,
        post("/feedback", json!({ "lead_id": 8, "contractor_id": 3, "outcome": "won" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        post("/feedback", json!({ "lead_id": 7, "contractor_id": 3, "outcome": "won", "lead_quality_rating": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn calibration_after_enough_feedback() {
    let store = seeded_store().await;
    for id in 10..16 {
        store
            .upsert_lead(Lead {
                id,
                property_id: 1,
                contractor_id: Some(3),
                trade: None,
                intent_score: 0.8,
                status: LeadStatus::Delivered,
            })
            .await
            .unwrap();
    }
    let app = api::router(Arc::new(Engine::new(EngineConfig::default(), store).unwrap()));
    for id in 10..16 {
        let converted = id < 12;
        let outcome = if converted { "won" } else { "lost" };
        let (status, _) = send(
            &app,
            post(
                "/feedback",
                json!({ "lead_id": id, "contractor_id": 3, "outcome": outcome, "converted": converted }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    // 6 leads at 0.8: 2 converted -> 33.33% vs 80% expected -> clamped to 0.5
    let (status, v) = send(&app, get("/calibration/adjustments")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["trade"], "all");
    assert_eq!(v["adjustments"]["0.7-0.9"]["adjustment_factor"], 0.5);
    assert_eq!(v["adjustments"]["0.7-0.9"]["adjustment_pct"], -50.0);

    let (_, v) = send(&app, get("/calibration/recommendations")).await;
    let recs = v["recommendations"].as_array().unwrap();
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0]["score_range"], "0.7-0.9");
    assert_eq!(recs[0]["priority"], "high");
}
