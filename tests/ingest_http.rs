// tests/ingest_http.rs
//
// Paginated HTTP source against a throwaway local axum server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::Query, extract::State, http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Value};

use locallift_intent::config::{IngestConfig, SourceConfig};
use locallift_intent::ingest::http::{HttpSignalSource, RetryPolicy};
use locallift_intent::ingest::SignalSource;
use locallift_intent::model::{Property, SignalKind};
use locallift_intent::store::{MemoryStore, SignalStore};
use locallift_intent::{Engine, EngineConfig, EngineError};

type Hits = Arc<AtomicUsize>;

/// First request fails with 500, then serves `rows` in `$limit`/`$offset` pages.
async fn flaky_pages(
    State((hits, rows)): State<(Hits, Arc<Vec<Value>>)>,
    Query(q): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Value>>, StatusCode> {
    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    let offset: usize = q.get("$offset").and_then(|s| s.parse().ok()).unwrap_or(0);
    let limit: usize = q.get("$limit").and_then(|s| s.parse().ok()).unwrap_or(1000);
    Ok(Json(rows.iter().skip(offset).take(limit).cloned().collect()))
}

async fn always_down(State(hits): State<Hits>) -> StatusCode {
    hits.fetch_add(1, Ordering::SeqCst);
    StatusCode::SERVICE_UNAVAILABLE
}

async fn not_found(State(hits): State<Hits>) -> StatusCode {
    hits.fetch_add(1, Ordering::SeqCst);
    StatusCode::NOT_FOUND
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/resource.json")
}

fn source(url: String) -> SourceConfig {
    SourceConfig {
        name: "test_violations".into(),
        kind: SignalKind::Violation,
        url,
        fields: Default::default(),
    }
}

fn fast_ingest() -> IngestConfig {
    IngestConfig {
        timeout_secs: 5,
        max_attempts: 3,
        backoff_base_ms: 1,
        backoff_max_ms: 5,
        page_size: 2,
        ..Default::default()
    }
}

fn rows() -> Vec<Value> {
    vec![
        json!({ "id": "v-1", "address": "4507 KNAP HOLW", "zip_code": "78731", "type": "Roof damage", "date": "2025-06-01T00:00:00.000" }),
        json!({ "id": "v-2", "address": "9 NOWHERE RD", "zip_code": "78731", "type": "Trash" }),
        json!({ "id": "v-3", "address": "4507 Knap Hollow", "zip_code": "78731", "type": "Fence" }),
        json!({ "address": "no id, skipped" }),
    ]
}

#[tokio::test]
async fn retries_server_error_then_pages() {
    let hits: Hits = Arc::default();
    let app = Router::new()
        .route("/resource.json", get(flaky_pages))
        .with_state((hits.clone(), Arc::new(rows())));
    let url = serve(app).await;

    let src = HttpSignalSource::new(&source(url), &fast_ingest()).unwrap();
    let page = src.fetch_page(0, 2).await.unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].external_id, "v-1");
    assert_eq!(page[0].date, chrono::NaiveDate::from_ymd_opt(2025, 6, 1));
    assert_eq!(page[1].date, None);
    // one failed attempt plus the successful one
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    // the id-less row is dropped
    let tail = src.fetch_page(2, 2).await.unwrap();
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0].external_id, "v-3");
}

#[tokio::test]
async fn exhausted_retries_surface_upstream_error() {
    let hits: Hits = Arc::default();
    let app = Router::new()
        .route("/resource.json", get(always_down))
        .with_state(hits.clone());
    let url = serve(app).await;

    let src = HttpSignalSource::new(&source(url), &fast_ingest())
        .unwrap()
        .with_retry(RetryPolicy {
            max_attempts: 2,
            base: Duration::from_millis(1),
            max: Duration::from_millis(2),
        });
    let err = src.fetch_page(0, 10).await.unwrap_err();
    match err {
        EngineError::Upstream {
            source_name,
            attempts,
            message,
        } => {
            assert_eq!(source_name, "test_violations");
            assert_eq!(attempts, 2);
            assert!(message.contains("503"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn client_error_is_not_retried() {
    let hits: Hits = Arc::default();
    let app = Router::new()
        .route("/resource.json", get(not_found))
        .with_state(hits.clone());
    let url = serve(app).await;

    let src = HttpSignalSource::new(&source(url), &fast_ingest()).unwrap();
    let err = src.fetch_page(0, 10).await.unwrap_err();
    assert!(matches!(err, EngineError::Upstream { attempts: 1, .. }));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn engine_links_configured_http_source() {
    let hits: Hits = Arc::default();
    let app = Router::new()
        .route("/resource.json", get(flaky_pages))
        .with_state((hits.clone(), Arc::new(rows())));
    let url = serve(app).await;

    let store = Arc::new(MemoryStore::new());
    store
        .upsert_property(Property {
            id: 1,
            situs_address: Some("4507 KNAP HOLW".into()),
            situs_zip: Some("78731".into()),
            market_value: None,
            first_improvement_year: Some(2007),
            last_improvement_year: None,
            latitude: None,
            longitude: None,
        })
        .await
        .unwrap();

    let mut cfg = EngineConfig::default();
    cfg.ingest = fast_ingest();
    cfg.ingest.sources = vec![source(url)];
    let engine = Engine::new(cfg, store.clone()).unwrap();

    let sources = engine.configured_sources().unwrap();
    assert_eq!(sources.len(), 1);
    let stats = engine.link_signals(&sources[0]).await.unwrap();
    assert_eq!(stats.source, "test_violations");
    assert_eq!(stats.total, 3);
    assert_eq!(stats.matched, 2);
    assert_eq!(stats.unmatched, 1);
    assert_eq!(stats.inserted, 3);

    let linked = store.violations_for(1).await.unwrap();
    let mut ids: Vec<_> = linked.iter().map(|v| v.external_id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, ["v-1", "v-3"]);

    // a second pass updates in place
    let again = engine.link_signals(&sources[0]).await.unwrap();
    assert_eq!(again.inserted, 0);
    assert_eq!(store.violations_for(1).await.unwrap().len(), 2);
}
