// src/store/memory.rs
//! In-process [`SignalStore`] behind `RwLock`ed tables, optionally seeded
//! from a JSON [`Snapshot`]. Upserts are keyed on property id and on signal
//! external id.

use super::{PropertyFilter, SignalStore};
use crate::error::{EngineError, EngineResult};
use crate::model::{
    CalibrationSample, ContractorId, Feedback, Lead, LeadId, LinkedSignal, Property, PropertyId,
    ScoreRecord, ServiceRequest, StormEvent, Trade, Violation,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Serializable dump used to seed a [`MemoryStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub violations: Vec<Violation>,
    #[serde(default)]
    pub service_requests: Vec<ServiceRequest>,
    #[serde(default)]
    pub storms: Vec<StormEvent>,
    #[serde(default)]
    pub leads: Vec<Lead>,
    #[serde(default)]
    pub feedback: Vec<Feedback>,
}

#[derive(Default)]
struct Tables {
    properties: BTreeMap<PropertyId, Property>,
    violations: BTreeMap<String, Violation>,
    requests: BTreeMap<String, ServiceRequest>,
    storms: BTreeMap<String, StormEvent>,
    scores: BTreeMap<(PropertyId, Option<Trade>), ScoreRecord>,
    leads: BTreeMap<LeadId, Lead>,
    feedback: BTreeMap<(LeadId, ContractorId), Feedback>,
}

impl Tables {
    fn signal_property_ids(&self) -> HashSet<PropertyId> {
        self.violations
            .values()
            .filter_map(|v| v.property_id)
            .chain(self.requests.values().filter_map(|r| r.property_id))
            .collect()
    }
}

/// Row counts, mainly for tests and startup logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub properties: usize,
    pub violations: usize,
    pub service_requests: usize,
    pub storms: usize,
    pub scores: usize,
    pub leads: usize,
    pub feedback: usize,
}

/// In-process store over `RwLock`-guarded ordered maps.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut t = Tables::default();
        for p in snapshot.properties {
            t.properties.insert(p.id, p);
        }
        for v in snapshot.violations {
            t.violations.insert(v.external_id.clone(), v);
        }
        for r in snapshot.service_requests {
            t.requests.insert(r.external_id.clone(), r);
        }
        for s in snapshot.storms {
            t.storms.insert(s.external_id.clone(), s);
        }
        for l in snapshot.leads {
            t.leads.insert(l.id, l);
        }
        for f in snapshot.feedback {
            t.feedback.insert((f.lead_id, f.contractor_id), f);
        }
        Self {
            tables: RwLock::new(t),
        }
    }

    pub fn from_json_file(path: &Path) -> EngineResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Store(format!("reading snapshot {}: {e}", path.display()))
        })?;
        let snapshot: Snapshot = serde_json::from_str(&raw).map_err(|e| {
            EngineError::Store(format!("parsing snapshot {}: {e}", path.display()))
        })?;
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn counts(&self) -> EngineResult<StoreCounts> {
        let t = self.read()?;
        Ok(StoreCounts {
            properties: t.properties.len(),
            violations: t.violations.len(),
            service_requests: t.requests.len(),
            storms: t.storms.len(),
            scores: t.scores.len(),
            leads: t.leads.len(),
            feedback: t.feedback.len(),
        })
    }

    fn read(&self) -> EngineResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| EngineError::Store("memory store lock poisoned".into()))
    }

    fn write(&self) -> EngineResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| EngineError::Store("memory store lock poisoned".into()))
    }
}

#[async_trait::async_trait]
impl SignalStore for MemoryStore {
    async fn get_property(&self, id: PropertyId) -> EngineResult<Option<Property>> {
        Ok(self.read()?.properties.get(&id).cloned())
    }

    async fn query_properties(&self, filter: &PropertyFilter) -> EngineResult<Vec<Property>> {
        let t = self.read()?;
        let with_signals = filter.with_signals.then(|| t.signal_property_ids());
        let limit = filter.limit.unwrap_or(usize::MAX);
        let out = t
            .properties
            .values()
            .filter(|p| match &filter.zip {
                Some(z) => p.situs_zip.as_deref() == Some(z.as_str()),
                None => true,
            })
            .filter(|p| match (&filter.bbox, p.centroid()) {
                (Some(b), Some((lat, lon))) => b.contains(lat, lon),
                (Some(_), None) => false,
                (None, _) => true,
            })
            .filter(|p| match &with_signals {
                Some(ids) => ids.contains(&p.id),
                None => true,
            })
            .take(limit)
            .cloned()
            .collect();
        Ok(out)
    }

    async fn upsert_property(&self, property: Property) -> EngineResult<()> {
        self.write()?.properties.insert(property.id, property);
        Ok(())
    }

    async fn violations_for(&self, id: PropertyId) -> EngineResult<Vec<Violation>> {
        let t = self.read()?;
        Ok(t.violations
            .values()
            .filter(|v| v.property_id == Some(id))
            .cloned()
            .collect())
    }

    async fn requests_for(&self, id: PropertyId) -> EngineResult<Vec<ServiceRequest>> {
        let t = self.read()?;
        Ok(t.requests
            .values()
            .filter(|r| r.property_id == Some(id))
            .cloned()
            .collect())
    }

    async fn storms_in_zip(&self, zip: &str, since: NaiveDate) -> EngineResult<Vec<StormEvent>> {
        let t = self.read()?;
        Ok(t.storms
            .values()
            .filter(|s| s.zip_code.as_deref() == Some(zip))
            .filter(|s| s.event_date.is_some_and(|d| d >= since))
            .cloned()
            .collect())
    }

    async fn zip_signal_count(&self, zip: &str) -> EngineResult<usize> {
        let t = self.read()?;
        let in_zip: HashSet<PropertyId> = t
            .properties
            .values()
            .filter(|p| p.situs_zip.as_deref() == Some(zip))
            .map(|p| p.id)
            .collect();
        let linked = |pid: Option<PropertyId>| pid.is_some_and(|id| in_zip.contains(&id));
        let v = t.violations.values().filter(|v| linked(v.property_id)).count();
        let r = t.requests.values().filter(|r| linked(r.property_id)).count();
        Ok(v + r)
    }

    async fn upsert_signal(&self, signal: LinkedSignal) -> EngineResult<bool> {
        let mut t = self.write()?;
        let fresh = match signal {
            LinkedSignal::Violation(v) => t.violations.insert(v.external_id.clone(), v).is_none(),
            LinkedSignal::Request(r) => t.requests.insert(r.external_id.clone(), r).is_none(),
            LinkedSignal::Storm(s) => t.storms.insert(s.external_id.clone(), s).is_none(),
        };
        Ok(fresh)
    }

    async fn upsert_scores(&self, records: &[ScoreRecord]) -> EngineResult<()> {
        let mut t = self.write()?;
        for r in records {
            t.scores.insert((r.property_id, r.trade), r.clone());
        }
        Ok(())
    }

    async fn get_score(
        &self,
        id: PropertyId,
        trade: Option<Trade>,
    ) -> EngineResult<Option<ScoreRecord>> {
        Ok(self.read()?.scores.get(&(id, trade)).cloned())
    }

    async fn get_lead(&self, id: LeadId) -> EngineResult<Option<Lead>> {
        Ok(self.read()?.leads.get(&id).cloned())
    }

    async fn upsert_lead(&self, lead: Lead) -> EngineResult<()> {
        self.write()?.leads.insert(lead.id, lead);
        Ok(())
    }

    async fn upsert_feedback(&self, feedback: Feedback) -> EngineResult<bool> {
        let key = (feedback.lead_id, feedback.contractor_id);
        Ok(self.write()?.feedback.insert(key, feedback).is_none())
    }

    async fn calibration_samples(
        &self,
        trade: Option<Trade>,
    ) -> EngineResult<Vec<CalibrationSample>> {
        let t = self.read()?;
        let mut out = Vec::new();
        for fb in t.feedback.values() {
            let Some(lead) = t.leads.get(&fb.lead_id) else {
                continue;
            };
            if trade.is_some() && lead.trade != trade {
                continue;
            }
            let score = t
                .scores
                .get(&(lead.property_id, lead.trade))
                .map(|s| s.score)
                .unwrap_or(lead.intent_score);
            out.push(CalibrationSample {
                score,
                converted: fb.converted,
            });
        }
        Ok(out)
    }
}
