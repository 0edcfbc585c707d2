// src/error.rs
//! Error taxonomy shared by every component.
//!
//! "No data" is not an error here: matching and feature computation return
//! empty/zero sentinels so batch loops keep going. These variants are for the
//! conditions a caller has to distinguish.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Referenced property/lead/contractor is absent.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Malformed input, rejected before anything is persisted.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Outbound HTTP call failed after all retries.
    #[error("upstream {source_name} failed after {attempts} attempt(s): {message}")]
    Upstream {
        source_name: String,
        attempts: u32,
        message: String,
    },

    /// Too few feedback samples to say anything useful.
    #[error("insufficient feedback data (need {required}, have {available})")]
    InsufficientData { required: usize, available: usize },

    #[error("store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            EngineError::InsufficientData { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::Store(_) | EngineError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
