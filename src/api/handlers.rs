//! HTTP Handlers
//!
//! Thin translation layer between the HTTP surface and the orchestrator:
//! handlers validate, delegate, and wrap the outcome in the response
//! envelope. No pipeline logic lives here.

use crate::analysis::{build_profile, AnomalyDetector, DetectorError};
use crate::api::envelope::{ApiErrorResponse, ApiResponse};
use crate::config::defaults::{ENTROPY_WINDOW_SIZE, ENTROPY_WINDOW_STEP};
use crate::health::HealthMonitor;
use crate::orchestrator::{Orchestrator, SubmitError};
use crate::types::{AnomalyFinding, EntropyProfile, HealthStatus, JobStatus};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::Response;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppContext {
    pub orchestrator: Arc<Orchestrator>,
    pub detectors: Vec<Arc<dyn AnomalyDetector>>,
    pub monitor: Arc<HealthMonitor>,
}

// ============================================================================
// Diagnostics
// ============================================================================

#[derive(Debug, Serialize)]
struct SubmitReceipt {
    job_id: Uuid,
    status: JobStatus,
}

/// `POST /api/v1/diagnostics` — accept a raw blob for asynchronous diagnosis.
pub async fn submit_diagnostic(State(ctx): State<AppContext>, body: Bytes) -> Response {
    match ctx.orchestrator.submit(body.to_vec()) {
        Ok(job_id) => ApiResponse::accepted(SubmitReceipt {
            job_id,
            status: JobStatus::Pending,
        }),
        Err(e @ SubmitError::InvalidInput(_)) => ApiErrorResponse::bad_request(e.to_string()),
        Err(e @ SubmitError::ShuttingDown) => {
            ApiErrorResponse::service_unavailable(e.to_string())
        }
    }
}

/// `GET /api/v1/diagnostics/{id}` — lifecycle record for one job.
pub async fn job_status(State(ctx): State<AppContext>, Path(id): Path<Uuid>) -> Response {
    match ctx.orchestrator.status(id) {
        Some(record) => ApiResponse::ok(record),
        None => ApiErrorResponse::not_found(format!("no job {id}")),
    }
}

/// `GET /api/v1/diagnostics/{id}/result` — diagnostic result of a
/// completed job.
pub async fn job_result(State(ctx): State<AppContext>, Path(id): Path<Uuid>) -> Response {
    let Some(record) = ctx.orchestrator.status(id) else {
        return ApiErrorResponse::not_found(format!("no job {id}"));
    };

    match record.status {
        JobStatus::Completed => match ctx.orchestrator.result(id) {
            Some(result) => ApiResponse::ok(result),
            // Completed without a stored result would be a drain-loop bug.
            None => {
                warn!(job_id = %id, "Completed job has no stored result");
                ApiErrorResponse::internal(format!("result missing for job {id}"))
            }
        },
        JobStatus::Failed => {
            ApiErrorResponse::conflict(format!("job {id} failed, no result was produced"))
        }
        JobStatus::Pending | JobStatus::Processing => {
            ApiErrorResponse::conflict(format!("job {id} is still {}", record.status))
        }
    }
}

// ============================================================================
// Synchronous anomaly detection
// ============================================================================

#[derive(Debug, Serialize)]
struct DetectionReport {
    entropy_profile: EntropyProfile,
    findings: Vec<AnomalyFinding>,
}

/// `POST /api/v1/anomalies/detect` — score a blob against the fitted
/// detectors without creating a job.
pub async fn detect_anomalies(State(ctx): State<AppContext>, body: Bytes) -> Response {
    if body.is_empty() {
        return ApiErrorResponse::bad_request("empty payload");
    }

    let profile = match build_profile(&body, ENTROPY_WINDOW_SIZE, ENTROPY_WINDOW_STEP) {
        Ok(profile) => profile,
        Err(e) => return ApiErrorResponse::bad_request(e.to_string()),
    };

    let features = profile.feature_vector();
    let detectors = ctx.detectors.clone();
    let scored = tokio::task::spawn_blocking(move || {
        let mut findings = Vec::new();
        for detector in &detectors {
            match detector.score(&features) {
                Ok(finding) => findings.push(finding),
                Err(DetectorError::NotFitted) => {}
                Err(e) => {
                    warn!(detector = detector.name(), error = %e, "Detector scoring failed")
                }
            }
        }
        findings
    })
    .await;

    match scored {
        Ok(findings) => ApiResponse::ok(DetectionReport {
            entropy_profile: profile,
            findings,
        }),
        Err(e) => ApiErrorResponse::internal(format!("scoring task failed: {e}")),
    }
}

// ============================================================================
// Health & telemetry
// ============================================================================

#[derive(Debug, Serialize)]
struct StageHealth {
    name: String,
    status: HealthStatus,
    breaker: String,
}

#[derive(Debug, Serialize)]
struct HealthReport {
    status: HealthStatus,
    stages: Vec<StageHealth>,
    cpu_usage: f64,
    memory_usage: f64,
    active_jobs: usize,
    queue_depth: usize,
}

fn worst(a: HealthStatus, b: HealthStatus) -> HealthStatus {
    fn rank(s: HealthStatus) -> u8 {
        match s {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 2,
        }
    }
    if rank(b) > rank(a) {
        b
    } else {
        a
    }
}

/// `GET /api/v1/health` — aggregate health: worst of per-stage health,
/// breaker states, and resource pressure.
pub async fn health(State(ctx): State<AppContext>) -> Response {
    let telemetry = ctx
        .monitor
        .sample(ctx.orchestrator.active_jobs(), ctx.orchestrator.queue_depth());
    let mut overall = HealthMonitor::classify(&telemetry);

    let mut stages = Vec::new();
    for stage in ctx.orchestrator.stages().iter() {
        let status = stage.health_check().await;
        let breaker_state = stage.breaker().state();
        overall = worst(overall, status);
        if breaker_state != crate::pipeline::BreakerState::Closed {
            // An open (or probing) breaker means a stage is failing jobs.
            overall = worst(overall, HealthStatus::Degraded);
        }
        stages.push(StageHealth {
            name: stage.name().to_string(),
            status,
            breaker: breaker_state.to_string(),
        });
    }

    ApiResponse::ok(HealthReport {
        status: overall,
        stages,
        cpu_usage: telemetry.cpu_usage,
        memory_usage: telemetry.memory_usage,
        active_jobs: telemetry.active_jobs,
        queue_depth: telemetry.queue_depth,
    })
}

/// `GET /api/v1/health/live` — process liveness.
pub async fn liveness() -> Response {
    ApiResponse::ok(serde_json::json!({ "status": "alive" }))
}

/// `GET /api/v1/health/ready` — readiness to accept submissions.
pub async fn readiness(State(ctx): State<AppContext>) -> Response {
    if ctx.orchestrator.is_accepting() {
        ApiResponse::ok(serde_json::json!({ "status": "ready" }))
    } else {
        ApiErrorResponse::service_unavailable("not accepting submissions")
    }
}

/// `GET /api/v1/telemetry` — current resource and queue sample.
pub async fn telemetry(State(ctx): State<AppContext>) -> Response {
    let sample = ctx
        .monitor
        .sample(ctx.orchestrator.active_jobs(), ctx.orchestrator.queue_depth());
    ApiResponse::ok(sample)
}

/// `GET /api/v1/metrics` — cumulative pipeline counters.
pub async fn metrics(State(ctx): State<AppContext>) -> Response {
    ApiResponse::ok(ctx.orchestrator.metrics())
}
