//! Diagnostic Pipeline
//!
//! The concurrent execution core:
//!
//! - `breaker`: per-stage circuit breaker state machine
//! - `stage`: the [`Stage`] capability interface and its breaker-guarded wrapper
//! - `engine`: bounded-concurrency streaming executor with graceful shutdown
//! - `metrics`: process-wide pipeline counters
//!
//! Failure containment guarantee: a stage failure is local to the job being
//! processed. It feeds that stage's breaker and the failure counters, and
//! never affects other stages' breakers, other in-flight jobs, or the
//! engine's control loop.

mod breaker;
mod engine;
mod metrics;
mod stage;

pub use breaker::{BreakerState, CircuitBreaker};
pub use engine::{JobOutcome, PipelineEngine};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use stage::{GuardedStage, Stage, StageError};
