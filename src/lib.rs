//! Blobscope: Deep Binary Diagnostics
//!
//! Concurrent diagnostic pipeline for opaque binary blobs: entropy
//! profiling, frame metadata extraction, and statistical anomaly
//! detection, executed as a bounded-concurrency streaming pipeline with
//! per-stage circuit breaking.
//!
//! ## Architecture
//!
//! - **Analysis**: entropy math, frame header schema, anomaly detectors
//! - **Pipeline**: circuit breaker, stage abstraction, streaming engine
//! - **Stages**: the concrete metadata → profile → anomaly sequence
//! - **Orchestrator**: job lifecycle, result store, retention eviction
//! - **API**: Axum HTTP surface over the orchestrator

pub mod analysis;
pub mod api;
pub mod config;
pub mod health;
pub mod orchestrator;
pub mod pipeline;
pub mod stages;
pub mod types;

// Re-export the service configuration
pub use config::ServiceConfig;

// Re-export commonly used types
pub use types::{
    AnomalyFinding, DiagnosticResult, EntropyProfile, HealthStatus, JobRecord,
    JobStatus, ProcessingContext, SystemTelemetry,
};

// Re-export the pipeline surface
pub use orchestrator::{Orchestrator, SubmitError};
pub use pipeline::{JobOutcome, PipelineEngine, Stage, StageError};
