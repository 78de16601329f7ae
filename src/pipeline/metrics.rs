//! Pipeline Metrics
//!
//! Process-wide counters mutated only by the engine's result path. Reads
//! are eventually consistent — a snapshot taken mid-job may lag by one
//! update, which is fine for observability.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

/// Live metric counters shared between the engine and the API layer.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    items_processed: AtomicU64,
    items_failed: AtomicU64,
    total_processing_micros: AtomicU64,
    stage_latency_micros: RwLock<HashMap<String, u64>>,
}

/// Point-in-time serializable view of the metrics.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub items_processed: u64,
    pub items_failed: u64,
    pub total_processing_secs: f64,
    /// Cumulative latency per stage, in seconds.
    pub stage_latencies: HashMap<String, f64>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, elapsed: Duration) {
        self.items_processed.fetch_add(1, Ordering::Relaxed);
        self.total_processing_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self, elapsed: Duration) {
        self.items_failed.fetch_add(1, Ordering::Relaxed);
        self.total_processing_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// Accumulate latency for one stage invocation.
    pub fn record_stage_latency(&self, stage: &str, elapsed: Duration) {
        let mut latencies = match self.stage_latency_micros.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *latencies.entry(stage.to_string()).or_insert(0) += elapsed.as_micros() as u64;
    }

    pub fn items_processed(&self) -> u64 {
        self.items_processed.load(Ordering::Relaxed)
    }

    pub fn items_failed(&self) -> u64 {
        self.items_failed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let latencies = match self.stage_latency_micros.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        MetricsSnapshot {
            items_processed: self.items_processed.load(Ordering::Relaxed),
            items_failed: self.items_failed.load(Ordering::Relaxed),
            total_processing_secs: self.total_processing_micros.load(Ordering::Relaxed) as f64
                / 1_000_000.0,
            stage_latencies: latencies
                .iter()
                .map(|(k, v)| (k.clone(), *v as f64 / 1_000_000.0))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = PipelineMetrics::new();
        metrics.record_success(Duration::from_millis(10));
        metrics.record_success(Duration::from_millis(5));
        metrics.record_failure(Duration::from_millis(2));

        let snap = metrics.snapshot();
        assert_eq!(snap.items_processed, 2);
        assert_eq!(snap.items_failed, 1);
        assert!((snap.total_processing_secs - 0.017).abs() < 1e-6);
    }

    #[test]
    fn stage_latencies_accumulate_per_stage() {
        let metrics = PipelineMetrics::new();
        metrics.record_stage_latency("profile", Duration::from_millis(4));
        metrics.record_stage_latency("profile", Duration::from_millis(6));
        metrics.record_stage_latency("metadata", Duration::from_millis(1));

        let snap = metrics.snapshot();
        assert!((snap.stage_latencies["profile"] - 0.010).abs() < 1e-6);
        assert!((snap.stage_latencies["metadata"] - 0.001).abs() < 1e-6);
    }
}
