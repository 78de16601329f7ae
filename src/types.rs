//! Core Data Types
//!
//! Shared types for the diagnostic pipeline: job lifecycle records, the
//! per-job processing context that flows through the stages, and the
//! immutable diagnostic result assembled when a job leaves the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ============================================================================
// Job Lifecycle
// ============================================================================

/// Diagnostic job execution status.
///
/// `Completed` and `Failed` are terminal — once reached, a job record never
/// changes status again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Whether this status is terminal (no further transitions allowed).
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Externally visible state of one submitted job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique identifier, generated at submission. Immutable.
    pub id: Uuid,
    /// Current lifecycle status. Monotonic once terminal.
    pub status: JobStatus,
    /// Submission timestamp. Immutable.
    pub submitted_at: DateTime<Utc>,
    /// Set when the job reaches a terminal status (drives retention eviction).
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Create a fresh record in `Pending`.
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            submitted_at: Utc::now(),
            completed_at: None,
        }
    }
}

// ============================================================================
// Metadata Values
// ============================================================================

/// Tagged value type for the open string-keyed metadata map accumulated by
/// pipeline stages. Serializes untagged so API consumers see plain JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Unsigned(u64),
    Float(f64),
    Text(String),
}

/// String-keyed metadata mapping. Keys may be overwritten; insertion order
/// is irrelevant.
pub type MetadataMap = BTreeMap<String, MetaValue>;

// ============================================================================
// Analysis Outputs
// ============================================================================

/// Entropy profile of a binary blob — the feature summary produced by the
/// profiling stage and consumed by the anomaly detectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntropyProfile {
    /// Shannon entropy over the whole blob, in bits per byte.
    pub global_entropy: f64,
    /// Entropy rate (per-byte entropy under the IID source assumption).
    pub entropy_rate: f64,
    /// Mean of the sliding-window entropies.
    pub windowed_entropy_mean: f64,
    /// Sample variance of the sliding-window entropies.
    pub windowed_entropy_variance: f64,
    /// Minimum windowed entropy.
    pub windowed_entropy_min: f64,
    /// Maximum windowed entropy.
    pub windowed_entropy_max: f64,
}

impl EntropyProfile {
    /// Feature vector consumed by the anomaly detectors.
    ///
    /// The synchronous detection endpoint and the pipeline's anomaly stage
    /// both go through this method so scores stay comparable.
    pub fn feature_vector(&self) -> Vec<f64> {
        vec![
            self.global_entropy,
            self.windowed_entropy_mean,
            self.windowed_entropy_variance,
            self.windowed_entropy_min,
            self.windowed_entropy_max,
        ]
    }
}

/// Output of a single anomaly detector for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFinding {
    /// Name of the detector that produced this finding.
    pub detector_name: String,
    /// Numeric anomaly score (detector-specific scale).
    pub score: f64,
    /// Whether the detector flagged the input as anomalous.
    pub is_anomaly: bool,
    /// Detector-specific details (thresholds, probabilities, ...).
    pub details: MetadataMap,
}

// ============================================================================
// Processing Context
// ============================================================================

/// The unit that flows through the pipeline.
///
/// Exclusively owned by the task executing one job — stages receive the
/// context by value and return it (or an updated form), so no two stages
/// ever mutate the same context concurrently.
#[derive(Debug, Clone)]
pub struct ProcessingContext {
    /// Foreign key to the job record.
    pub job_id: Uuid,
    /// Input bytes. Immutable for the context's lifetime.
    pub raw_data: Vec<u8>,
    /// Context creation timestamp (job admission into the engine).
    pub created_at: DateTime<Utc>,
    /// Open metadata mapping accumulated by stages.
    pub metadata: MetadataMap,
    /// Feature summary, set by the profiling stage, read by later stages.
    pub entropy_profile: Option<EntropyProfile>,
    /// Ordered detector outputs. Append-only.
    pub findings: Vec<AnomalyFinding>,
}

impl ProcessingContext {
    pub fn new(job_id: Uuid, raw_data: Vec<u8>) -> Self {
        Self {
            job_id,
            raw_data,
            created_at: Utc::now(),
            metadata: MetadataMap::new(),
            entropy_profile: None,
            findings: Vec::new(),
        }
    }

    /// Assemble the immutable diagnostic result from a finished context.
    pub fn into_result(self) -> DiagnosticResult {
        DiagnosticResult {
            job_id: self.job_id,
            timestamp: self.created_at,
            entropy_profile: self.entropy_profile,
            findings: self.findings,
            metadata: self.metadata,
        }
    }
}

// ============================================================================
// Diagnostic Result
// ============================================================================

/// Immutable snapshot of one completed job. Written once, keyed by job id,
/// never mutated after insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticResult {
    pub job_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub entropy_profile: Option<EntropyProfile>,
    pub findings: Vec<AnomalyFinding>,
    pub metadata: MetadataMap,
}

// ============================================================================
// Health & Telemetry
// ============================================================================

/// Component / system health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Real-time system telemetry sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemTelemetry {
    /// CPU usage percent (0-100).
    pub cpu_usage: f64,
    /// Memory usage percent (0-100).
    pub memory_usage: f64,
    /// Jobs currently in `Processing`.
    pub active_jobs: usize,
    /// Items waiting in the submission queue.
    pub queue_depth: usize,
    /// Sample timestamp.
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn meta_value_serializes_untagged() {
        let v = serde_json::to_value(MetaValue::Unsigned(42)).unwrap();
        assert_eq!(v, serde_json::json!(42));
        let v = serde_json::to_value(MetaValue::Text("abc".into())).unwrap();
        assert_eq!(v, serde_json::json!("abc"));
    }

    #[test]
    fn context_into_result_preserves_fields() {
        let id = Uuid::new_v4();
        let mut ctx = ProcessingContext::new(id, vec![1, 2, 3]);
        ctx.metadata
            .insert("version".into(), MetaValue::Unsigned(2));
        let result = ctx.into_result();
        assert_eq!(result.job_id, id);
        assert_eq!(
            result.metadata.get("version"),
            Some(&MetaValue::Unsigned(2))
        );
        assert!(result.findings.is_empty());
    }
}
