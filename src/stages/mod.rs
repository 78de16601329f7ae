//! Concrete Pipeline Stages
//!
//! The three stages of the diagnostic sequence, in execution order:
//!
//! 1. `metadata` — best-effort frame header extraction (never fails)
//! 2. `profile` — entropy profile computation
//! 3. `anomaly` — detector scoring against the profile's feature vector
//!
//! [`build_detectors`] and [`build_stages`] wire configured thresholds into
//! the stage list; each stage gets its own circuit breaker so one stage's
//! failures never open another's.

mod anomaly;
mod metadata;
mod profile;

pub use anomaly::AnomalyStage;
pub use metadata::MetadataStage;
pub use profile::ProfileStage;

use crate::analysis::{AnomalyDetector, FrameSchema, NearestNeighborDetector, ZScoreDetector};
use crate::config::{DetectorConfig, PipelineConfig};
use crate::pipeline::{CircuitBreaker, GuardedStage};
use std::sync::Arc;

/// Construct the configured detector set.
///
/// Detectors start unfitted; they produce no findings until a reference
/// set is supplied through the fitting surface.
pub fn build_detectors(config: &DetectorConfig) -> Vec<Arc<dyn AnomalyDetector>> {
    vec![
        Arc::new(ZScoreDetector::new(config.zscore_threshold)),
        Arc::new(NearestNeighborDetector::new(
            config.neighbor_count,
            config.neighbor_ratio_threshold,
        )),
    ]
}

/// Assemble the guarded stage chain the engine executes.
pub fn build_stages(
    pipeline: &PipelineConfig,
    detectors: Vec<Arc<dyn AnomalyDetector>>,
) -> Vec<GuardedStage> {
    let breaker = || {
        CircuitBreaker::new(
            pipeline.breaker_failure_threshold,
            pipeline.breaker_recovery_timeout(),
        )
    };

    vec![
        GuardedStage::new(Box::new(MetadataStage::new(FrameSchema::default())), breaker()),
        GuardedStage::new(Box::new(ProfileStage::default()), breaker()),
        GuardedStage::new(Box::new(AnomalyStage::new(detectors)), breaker()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_chain_is_ordered() {
        let cfg = PipelineConfig::default();
        let stages = build_stages(&cfg, build_detectors(&DetectorConfig::default()));
        let names: Vec<&str> = stages.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["metadata", "profile", "anomaly"]);
    }
}
