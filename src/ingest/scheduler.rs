// src/ingest/scheduler.rs
//! Periodic triggers: signal linking per source and the daily rescore of all
//! trades. An interval of 0 disables a job.

use super::SignalSource;
use crate::engine::Engine;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerCfg {
    pub link_interval_secs: u64,
    pub rescore_interval_secs: u64,
}

impl SchedulerCfg {
    pub fn from_engine(engine: &Engine) -> Self {
        let ingest = &engine.config().ingest;
        Self {
            link_interval_secs: ingest.link_interval_secs,
            rescore_interval_secs: ingest.rescore_interval_secs,
        }
    }
}

/// Link every source once per tick; the first run starts immediately.
/// Source failures are logged and do not stop the loop.
pub fn spawn_link_scheduler(
    engine: Arc<Engine>,
    sources: Vec<Arc<dyn SignalSource>>,
    interval_secs: u64,
) -> Option<JoinHandle<()>> {
    if interval_secs == 0 || sources.is_empty() {
        tracing::info!(target: "ingest", interval_secs, sources = sources.len(), "link scheduler disabled");
        return None;
    }
    let period = Duration::from_secs(interval_secs);
    Some(tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now(), period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            for source in &sources {
                match engine.link_signals(source.as_ref()).await {
                    Ok(stats) => tracing::info!(
                        target: "ingest",
                        source = %stats.source,
                        total = stats.total,
                        matched = stats.matched,
                        "link tick"
                    ),
                    Err(e) => tracing::warn!(target: "ingest", error = ?e, source = source.name(), "link tick failed"),
                }
            }
        }
    }))
}

/// Rescore all trades once per tick, first run one period after start.
pub fn spawn_rescore_scheduler(engine: Arc<Engine>, interval_secs: u64) -> Option<JoinHandle<()>> {
    if interval_secs == 0 {
        tracing::info!(target: "scoring", "rescore scheduler disabled");
        return None;
    }
    let period = Duration::from_secs(interval_secs);
    Some(tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let done = engine.recalculate_all_trades().await;
            tracing::info!(
                target: "scoring",
                trades = done.len(),
                scored = done.iter().map(|(_, s)| s.scored).sum::<usize>(),
                "rescore tick"
            );
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::ingest::StaticSource;
    use crate::model::{SignalKind, SignalRecord};
    use crate::store::MemoryStore;

    fn engine(store: Arc<MemoryStore>) -> Arc<Engine> {
        Arc::new(Engine::new(EngineConfig::default(), store).unwrap())
    }

    #[tokio::test]
    async fn zero_interval_disables_jobs() {
        let e = engine(Arc::new(MemoryStore::new()));
        let src: Arc<dyn SignalSource> = Arc::new(StaticSource::new("empty", vec![]));
        assert!(spawn_link_scheduler(e.clone(), vec![src], 0).is_none());
        assert!(spawn_link_scheduler(e.clone(), vec![], 60).is_none());
        assert!(spawn_rescore_scheduler(e, 0).is_none());
    }

    #[tokio::test]
    async fn link_job_runs_on_start() {
        let store = Arc::new(MemoryStore::new());
        let e = engine(store.clone());
        let rec = SignalRecord {
            external_id: "storm-1".into(),
            kind: SignalKind::Storm,
            address: None,
            zip_code: Some("78731".into()),
            latitude: None,
            longitude: None,
            category: Some("Hail".into()),
            description: None,
            date: None,
            magnitude: Some(1.0),
            status: None,
        };
        let src: Arc<dyn SignalSource> = Arc::new(StaticSource::new("storms", vec![rec]));
        let handle = spawn_link_scheduler(e, vec![src], 3600).unwrap();

        let mut linked = false;
        for _ in 0..50 {
            if store.counts().unwrap().storms == 1 {
                linked = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();
        assert!(linked);
    }
}
