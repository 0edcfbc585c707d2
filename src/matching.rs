// src/matching.rs
//! Property matcher: resolves a signal's free-text address / ZIP / lat-lon to
//! a canonical property with a confidence in [0, 1].
//!
//! Strategies run in order, each only while the best confidence so far is
//! below the match threshold:
//! 1. ZIP-scoped structured match (+ street number boost)
//! 2. bounding-box match blending address similarity with proximity
//! 3. ZIP-scoped fuzzy match against the raw stored address
//!
//! A property is returned only at or above the threshold; the best confidence
//! is reported either way.

use crate::address::{normalize, similarity, NormalizedAddress};
use crate::config::MatchingConfig;
use crate::error::EngineResult;
use crate::model::{Property, PropertyId, SignalRecord};
use crate::store::{BoundingBox, PropertyFilter, SignalStore};
use crate::telemetry::anon_hash;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

const SCORE_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    ZipAddress,
    Coordinates,
    ZipFuzzy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    HighConfidence,
    MediumConfidence,
    NoMatch,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::HighConfidence => "high_confidence",
            MatchMethod::MediumConfidence => "medium_confidence",
            MatchMethod::NoMatch => "no_match",
        }
    }
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ephemeral matcher output; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub property: Option<Property>,
    pub confidence: f64,
    /// Strategy that produced the best candidate, if any candidate scored.
    pub strategy: Option<MatchStrategy>,
}

impl MatchResult {
    fn none(confidence: f64) -> Self {
        Self {
            property: None,
            confidence,
            strategy: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignalMatch {
    pub property_id: Option<PropertyId>,
    pub confidence: f64,
    pub method: MatchMethod,
}

/// Match input; the shape ingestion records and the `/match` endpoint share.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchQuery {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl From<&SignalRecord> for MatchQuery {
    fn from(r: &SignalRecord) -> Self {
        Self {
            address: r.address.clone(),
            zip_code: r.zip_code.clone(),
            latitude: r.latitude,
            longitude: r.longitude,
        }
    }
}

struct Candidate {
    property: Property,
    score: f64,
    tie: f64,
    strategy: MatchStrategy,
}

/// Running maximum with deterministic tie-breaking: higher score, then closer
/// Levenshtein similarity, then lower property id.
#[derive(Default)]
struct Best(Option<Candidate>);

impl Best {
    fn score(&self) -> f64 {
        self.0.as_ref().map_or(0.0, |c| c.score)
    }

    fn offer(&mut self, c: Candidate) {
        let better = match &self.0 {
            None => c.score > 0.0,
            Some(b) => {
                if (c.score - b.score).abs() > SCORE_EPS {
                    c.score > b.score
                } else if (c.tie - b.tie).abs() > SCORE_EPS {
                    c.tie > b.tie
                } else {
                    c.property.id < b.property.id
                }
            }
        };
        if better {
            self.0 = Some(c);
        }
    }
}

#[derive(Clone)]
pub struct PropertyMatcher {
    store: Arc<dyn SignalStore>,
    cfg: MatchingConfig,
}

impl PropertyMatcher {
    pub fn new(store: Arc<dyn SignalStore>, cfg: MatchingConfig) -> Self {
        Self { store, cfg }
    }

    pub fn threshold(&self) -> f64 {
        self.cfg.match_threshold
    }

    pub async fn match_address(&self, q: &MatchQuery) -> EngineResult<MatchResult> {
        counter!("match_attempts_total").increment(1);

        let input = normalize(q.address.as_deref());
        let coords = q.latitude.zip(q.longitude);
        let has_address = !input.normalized.is_empty();
        if !has_address && coords.is_none() {
            return Ok(MatchResult::none(0.0));
        }

        // The record's own ZIP field wins over one parsed out of the text.
        let zip = q
            .zip_code
            .as_deref()
            .map(str::trim)
            .filter(|z| !z.is_empty())
            .map(str::to_string)
            .or_else(|| input.zip_code.clone());
        if let (Some(given), Some(parsed)) = (&zip, &input.zip_code) {
            if given != parsed {
                tracing::debug!(target: "matching", given = %given, parsed = %parsed, "zip mismatch");
            }
        }

        let threshold = self.cfg.match_threshold;
        let mut best = Best::default();

        // Shared by strategies 1 and 3.
        let zip_candidates = match (&zip, has_address) {
            (Some(z), true) => self.store.query_properties(&PropertyFilter::in_zip(z)).await?,
            _ => Vec::new(),
        };

        for p in &zip_candidates {
            self.offer_structured(&mut best, &input, p);
        }

        if best.score() < threshold {
            if let Some((lat, lon)) = coords {
                let delta = self.cfg.bbox_delta;
                let bbox = BoundingBox::around(lat, lon, delta);
                let nearby = self.store.query_properties(&PropertyFilter::in_box(bbox)).await?;
                for p in nearby {
                    self.offer_coordinate(&mut best, &input, p, lat, lon);
                }
            }
        }

        if best.score() < threshold && has_address {
            for p in &zip_candidates {
                let Some(raw) = p.situs_address.as_deref() else {
                    continue;
                };
                best.offer(Candidate {
                    score: similarity(&input.normalized, raw),
                    tie: strsim::normalized_levenshtein(&input.normalized, raw),
                    property: p.clone(),
                    strategy: MatchStrategy::ZipFuzzy,
                });
            }
        }

        let result = match best.0 {
            Some(c) if c.score >= threshold => MatchResult {
                confidence: c.score,
                strategy: Some(c.strategy),
                property: Some(c.property),
            },
            Some(c) => MatchResult {
                property: None,
                confidence: c.score,
                strategy: Some(c.strategy),
            },
            None => MatchResult::none(0.0),
        };

        tracing::debug!(
            target: "matching",
            addr = %anon_hash(q.address.as_deref().unwrap_or_default()),
            zip = zip.as_deref().unwrap_or("-"),
            candidates = zip_candidates.len(),
            confidence = result.confidence,
            strategy = ?result.strategy,
            matched = result.property.as_ref().map(|p| p.id),
            "match_address"
        );
        Ok(result)
    }

    fn offer_structured(&self, best: &mut Best, input: &NormalizedAddress, p: &Property) {
        if p.situs_address.is_none() {
            return;
        }
        let cand = normalize(p.situs_address.as_deref());
        let mut score = similarity(&input.normalized, &cand.normalized);
        if let (Some(a), Some(b)) = (&input.street_number, &cand.street_number) {
            if a == b {
                score = (score + self.cfg.street_number_boost).min(1.0);
            }
        }
        best.offer(Candidate {
            score,
            tie: strsim::normalized_levenshtein(&input.normalized, &cand.normalized),
            property: p.clone(),
            strategy: MatchStrategy::ZipAddress,
        });
    }

    fn offer_coordinate(
        &self,
        best: &mut Best,
        input: &NormalizedAddress,
        p: Property,
        lat: f64,
        lon: f64,
    ) {
        let Some((plat, plon)) = p.centroid() else {
            return;
        };
        if p.situs_address.is_none() {
            return;
        }
        let cand = normalize(p.situs_address.as_deref());
        let addr_score = similarity(&input.normalized, &cand.normalized);
        let span = 2.0 * self.cfg.bbox_delta;
        let distance_score = 1.0 - (((plat - lat).abs() + (plon - lon).abs()) / span).min(1.0);
        let score = (self.cfg.address_weight * addr_score
            + self.cfg.distance_weight * distance_score)
            .clamp(0.0, 1.0);
        best.offer(Candidate {
            score,
            tie: strsim::normalized_levenshtein(&input.normalized, &cand.normalized),
            property: p,
            strategy: MatchStrategy::Coordinates,
        });
    }

    /// Method band for a confidence; `no_match` when nothing was linked.
    pub fn classify(&self, matched: bool, confidence: f64) -> MatchMethod {
        if !matched {
            MatchMethod::NoMatch
        } else if confidence >= self.cfg.high_confidence {
            MatchMethod::HighConfidence
        } else {
            MatchMethod::MediumConfidence
        }
    }

    /// Entry point for every ingestion linker (violations, 311, storms).
    pub async fn match_signal(&self, q: &MatchQuery) -> EngineResult<SignalMatch> {
        let r = self.match_address(q).await?;
        let property_id = r.property.as_ref().map(|p| p.id);
        let method = self.classify(property_id.is_some(), r.confidence);
        counter!("match_outcomes_total", "method" => method.as_str()).increment(1);
        Ok(SignalMatch {
            property_id,
            confidence: r.confidence,
            method,
        })
    }
}
