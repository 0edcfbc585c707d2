// src/ingest/mod.rs
//! Signal ingestion: paged sources, linkage to properties, periodic jobs.

pub mod http;
pub mod scheduler;

use crate::error::EngineResult;
use crate::matching::{MatchMethod, MatchQuery, PropertyMatcher};
use crate::model::SignalRecord;
use crate::store::SignalStore;
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;

/// A paginated provider of raw civic records.
#[async_trait::async_trait]
pub trait SignalSource: Send + Sync {
    /// Records `offset..offset+limit`. A short or empty page ends the scan.
    async fn fetch_page(&self, offset: usize, limit: usize) -> EngineResult<Vec<SignalRecord>>;
    fn name(&self) -> &str;
}

/// Source over records already in memory (snapshots, tests).
pub struct StaticSource {
    name: String,
    records: Vec<SignalRecord>,
}

impl StaticSource {
    pub fn new(name: impl Into<String>, records: Vec<SignalRecord>) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }
}

#[async_trait::async_trait]
impl SignalSource for StaticSource {
    async fn fetch_page(&self, offset: usize, limit: usize) -> EngineResult<Vec<SignalRecord>> {
        Ok(self
            .records
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub source: String,
    pub total: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub high_confidence: usize,
    pub medium_confidence: usize,
    /// External ids not seen before this run.
    pub inserted: usize,
}

impl LinkStats {
    fn record(&mut self, method: MatchMethod, fresh: bool) {
        self.total += 1;
        match method {
            MatchMethod::HighConfidence => {
                self.matched += 1;
                self.high_confidence += 1;
            }
            MatchMethod::MediumConfidence => {
                self.matched += 1;
                self.medium_confidence += 1;
            }
            MatchMethod::NoMatch => self.unmatched += 1,
        }
        if fresh {
            self.inserted += 1;
        }
    }
}

/// Matches every record of a source and upserts it with its linkage.
#[derive(Clone)]
pub struct SignalLinker {
    matcher: PropertyMatcher,
    store: Arc<dyn SignalStore>,
    page_size: usize,
}

impl SignalLinker {
    pub fn new(matcher: PropertyMatcher, store: Arc<dyn SignalStore>, page_size: usize) -> Self {
        Self {
            matcher,
            store,
            page_size: page_size.max(1),
        }
    }

    /// Unmatched records are still stored (with no property), so a later run
    /// with better property data can link them. Re-running is idempotent.
    pub async fn link_signals(&self, source: &dyn SignalSource) -> EngineResult<LinkStats> {
        let mut stats = LinkStats {
            source: source.name().to_string(),
            ..Default::default()
        };
        let mut offset = 0;
        loop {
            let page = source.fetch_page(offset, self.page_size).await?;
            let n = page.len();
            for rec in page {
                let m = self.matcher.match_signal(&MatchQuery::from(&rec)).await?;
                let fresh = self.store.upsert_signal(rec.into_linked(m.property_id)).await?;
                stats.record(m.method, fresh);
            }
            counter!("ingest_records_total", "source" => stats.source.clone()).increment(n as u64);
            tracing::debug!(target: "ingest", source = %stats.source, offset, fetched = n, "page linked");
            if n < self.page_size {
                break;
            }
            offset += n;
        }

        tracing::info!(
            target: "ingest",
            source = %stats.source,
            total = stats.total,
            matched = stats.matched,
            unmatched = stats.unmatched,
            high = stats.high_confidence,
            medium = stats.medium_confidence,
            "signal linking complete"
        );
        Ok(stats)
    }
}
