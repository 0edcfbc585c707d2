//! LocalLift intent engine, binary entrypoint.
//! Loads config, installs logging + metrics, optionally seeds the in-memory
//! store from a snapshot, starts the periodic jobs and serves the HTTP API.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use locallift_intent::ingest::scheduler::{spawn_link_scheduler, spawn_rescore_scheduler, SchedulerCfg};
use locallift_intent::ingest::SignalSource;
use locallift_intent::metrics::Metrics;
use locallift_intent::store::{MemoryStore, SignalStore};
use locallift_intent::{api, telemetry, Engine, EngineConfig};

/// JSON snapshot (`store::Snapshot`) to seed the store with at startup.
const ENV_SNAPSHOT_PATH: &str = "LOCALLIFT_SNAPSHOT_PATH";

fn open_store() -> anyhow::Result<MemoryStore> {
    match std::env::var(ENV_SNAPSHOT_PATH) {
        Ok(p) => {
            let path = PathBuf::from(&p);
            let store = MemoryStore::from_json_file(&path)
                .with_context(|| format!("seeding store from {}", path.display()))?;
            let counts = store.counts()?;
            tracing::info!(target: "store", path = %path.display(), ?counts, "store seeded");
            Ok(store)
        }
        Err(_) => Ok(MemoryStore::new()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Missing .env is fine.
    let _ = dotenvy::dotenv();

    let config = EngineConfig::load().context("loading configuration")?;
    telemetry::init(&config.telemetry)?;
    let metrics = Metrics::init()?;

    let store: Arc<dyn SignalStore> = Arc::new(open_store()?);
    let engine = Arc::new(Engine::new(config, store).context("building engine")?);

    let sched = SchedulerCfg::from_engine(&engine);
    let sources: Vec<Arc<dyn SignalSource>> = engine
        .configured_sources()?
        .into_iter()
        .map(|s| Arc::new(s) as Arc<dyn SignalSource>)
        .collect();
    let _link_job = spawn_link_scheduler(engine.clone(), sources, sched.link_interval_secs);
    let _rescore_job = spawn_rescore_scheduler(engine.clone(), sched.rescore_interval_secs);

    let addr = engine.config().server.bind_addr();
    let app = api::router(engine).merge(metrics.router());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await.context("http server")?;
    Ok(())
}
