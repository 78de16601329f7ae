//! Pipeline Stage Abstraction
//!
//! [`Stage`] is the capability interface every unit of work in the fixed
//! processing sequence implements. The engine never calls `process`
//! directly — each stage is wrapped in a [`GuardedStage`] that consults the
//! stage's circuit breaker first and records the outcome after.

use crate::pipeline::breaker::CircuitBreaker;
use crate::types::{HealthStatus, ProcessingContext};
use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

/// Error surfaced by a guarded stage call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StageError {
    /// The stage's breaker rejected the call before `process` ran.
    #[error("circuit breaker open for stage {stage}")]
    CircuitOpen { stage: String },
    /// The stage's own processing failed on this input.
    #[error("stage {stage} failed: {reason}")]
    Failed { stage: String, reason: String },
}

impl StageError {
    pub fn failed(stage: &str, reason: impl Into<String>) -> Self {
        StageError::Failed {
            stage: stage.to_string(),
            reason: reason.into(),
        }
    }

    /// Name of the stage that produced this error.
    pub fn stage(&self) -> &str {
        match self {
            StageError::CircuitOpen { stage } | StageError::Failed { stage, .. } => stage,
        }
    }
}

/// A named unit of work in the diagnostic sequence.
///
/// Stages are stateless with respect to any single job: `process` receives
/// the context by value and returns the updated context. Long-lived
/// collaborators (fitted detectors, schemas) are held behind `Arc` and are
/// read-only from the pipeline's perspective.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stable stage name, used for metrics keys and breaker logs.
    fn name(&self) -> &str;

    /// Run this stage's transformation over the context.
    async fn process(&self, ctx: ProcessingContext) -> Result<ProcessingContext, StageError>;

    /// Report this stage's own health, independent of its breaker state.
    /// Consumed by the health surface, never by the engine itself.
    async fn health_check(&self) -> HealthStatus {
        HealthStatus::Healthy
    }
}

/// A stage paired with its circuit breaker — the only entry point the
/// engine uses.
pub struct GuardedStage {
    stage: Box<dyn Stage>,
    breaker: CircuitBreaker,
}

impl GuardedStage {
    pub fn new(stage: Box<dyn Stage>, breaker: CircuitBreaker) -> Self {
        Self { stage, breaker }
    }

    pub fn name(&self) -> &str {
        self.stage.name()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub async fn health_check(&self) -> HealthStatus {
        self.stage.health_check().await
    }

    /// Guarded call: breaker denial fails fast without invoking `process`;
    /// otherwise the outcome is recorded on the breaker and any error is
    /// re-raised to the caller. Call latency is measured by the engine.
    pub async fn execute(
        &self,
        ctx: ProcessingContext,
    ) -> Result<ProcessingContext, StageError> {
        if !self.breaker.allow() {
            debug!(stage = self.name(), "Rejecting call, circuit open");
            return Err(StageError::CircuitOpen {
                stage: self.name().to_string(),
            });
        }

        match self.stage.process(ctx).await {
            Ok(next) => {
                self.breaker.record_success();
                Ok(next)
            }
            Err(e) => {
                self.breaker.record_failure();
                Err(e)
            }
        }
    }
}
