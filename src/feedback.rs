// src/feedback.rs
//! Contractor feedback intake. Feeds the calibration engine.

use crate::error::{EngineError, EngineResult};
use crate::model::{ContractorId, Feedback, FeedbackOutcome, LeadId, LeadStatus};
use crate::store::SignalStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Raw submission as received from a contractor. Ratings are wide integers so
/// out-of-range values reach validation instead of failing deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedbackSubmission {
    pub lead_id: LeadId,
    pub contractor_id: ContractorId,
    pub outcome: String,
    #[serde(default)]
    pub converted: bool,
    #[serde(default)]
    pub conversion_value: Option<f64>,
    #[serde(default)]
    pub lead_quality_rating: Option<i64>,
    #[serde(default)]
    pub contact_accuracy_rating: Option<i64>,
    #[serde(default)]
    pub timing_rating: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackReceipt {
    #[serde(flatten)]
    pub feedback: Feedback,
    /// False when an earlier submission for the same (lead, contractor) was replaced.
    pub created: bool,
}

fn rating(name: &str, value: Option<i64>) -> EngineResult<Option<u8>> {
    match value {
        None => Ok(None),
        Some(v @ 1..=5) => Ok(Some(v as u8)),
        Some(v) => Err(EngineError::validation(format!(
            "{name} must be between 1 and 5 (got {v})"
        ))),
    }
}

impl FeedbackSubmission {
    /// Checks everything that does not need the store.
    pub fn validate(&self) -> EngineResult<Feedback> {
        let outcome: FeedbackOutcome = self.outcome.parse()?;
        if let Some(v) = self.conversion_value {
            if !v.is_finite() || v < 0.0 {
                return Err(EngineError::validation(
                    "conversion_value must be a non-negative number",
                ));
            }
        }
        Ok(Feedback {
            lead_id: self.lead_id,
            contractor_id: self.contractor_id,
            outcome,
            converted: self.converted,
            conversion_value: self.conversion_value,
            lead_quality_rating: rating("lead_quality_rating", self.lead_quality_rating)?,
            contact_accuracy_rating: rating("contact_accuracy_rating", self.contact_accuracy_rating)?,
            timing_rating: rating("timing_rating", self.timing_rating)?,
            notes: self.notes.clone().filter(|n| !n.trim().is_empty()),
            submitted_at: Utc::now(),
        })
    }
}

#[derive(Clone)]
pub struct FeedbackService {
    store: Arc<dyn SignalStore>,
}

impl FeedbackService {
    pub fn new(store: Arc<dyn SignalStore>) -> Self {
        Self { store }
    }

    /// Validate, then upsert keyed by (lead, contractor). A converted outcome
    /// also moves the lead to `converted`.
    pub async fn submit_feedback(&self, sub: FeedbackSubmission) -> EngineResult<FeedbackReceipt> {
        let feedback = sub.validate()?;
        let mut lead = self
            .store
            .get_lead(sub.lead_id)
            .await?
            .ok_or_else(|| EngineError::not_found("lead", sub.lead_id))?;

        let created = self.store.upsert_feedback(feedback.clone()).await?;
        if feedback.converted && lead.status != LeadStatus::Converted {
            lead.status = LeadStatus::Converted;
            self.store.upsert_lead(lead).await?;
        }

        tracing::info!(
            target: "feedback",
            lead_id = feedback.lead_id,
            contractor_id = feedback.contractor_id,
            outcome = ?feedback.outcome,
            converted = feedback.converted,
            created,
            "feedback recorded"
        );
        Ok(FeedbackReceipt { feedback, created })
    }
}
