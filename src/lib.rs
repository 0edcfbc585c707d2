// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod address;
pub mod api;
pub mod calibration;
pub mod config;
pub mod decay;
pub mod engine;
pub mod error;
pub mod features;
pub mod feedback;
pub mod ingest;
pub mod matching;
pub mod metrics;
pub mod model;
pub mod scoring;
pub mod store;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::config::EngineConfig;
pub use crate::engine::Engine;
pub use crate::error::{EngineError, EngineResult};
pub use crate::model::Trade;
