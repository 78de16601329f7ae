//! Anomaly Scoring Stage
//!
//! Final stage: scores the entropy profile's feature vector against every
//! configured detector. Scoring may be long-running for large fitted
//! models, so it is delegated to the blocking pool instead of the async
//! scheduler.
//!
//! An unfitted detector contributes no finding — that is normal operation
//! (the service starts with unfitted models), never a stage failure. A
//! context without a profile passes through untouched.

use crate::analysis::{AnomalyDetector, DetectorError};
use crate::pipeline::{Stage, StageError};
use crate::types::{HealthStatus, ProcessingContext};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct AnomalyStage {
    detectors: Vec<Arc<dyn AnomalyDetector>>,
}

impl AnomalyStage {
    pub fn new(detectors: Vec<Arc<dyn AnomalyDetector>>) -> Self {
        Self { detectors }
    }
}

#[async_trait]
impl Stage for AnomalyStage {
    fn name(&self) -> &str {
        "anomaly"
    }

    async fn process(
        &self,
        mut ctx: ProcessingContext,
    ) -> Result<ProcessingContext, StageError> {
        let Some(profile) = ctx.entropy_profile.as_ref() else {
            debug!(job_id = %ctx.job_id, "No entropy profile, skipping anomaly scoring");
            return Ok(ctx);
        };

        let features = profile.feature_vector();
        let detectors: Vec<Arc<dyn AnomalyDetector>> = self.detectors.clone();
        let job_id = ctx.job_id;

        // Model inference may be long-running; keep it off the scheduler.
        let findings = tokio::task::spawn_blocking(move || {
            let mut findings = Vec::new();
            for detector in &detectors {
                match detector.score(&features) {
                    Ok(finding) => findings.push(finding),
                    Err(DetectorError::NotFitted) => {
                        debug!(
                            job_id = %job_id,
                            detector = detector.name(),
                            "Detector not fitted, no finding produced"
                        );
                    }
                    Err(e) => {
                        warn!(
                            job_id = %job_id,
                            detector = detector.name(),
                            error = %e,
                            "Detector rejected feature vector"
                        );
                    }
                }
            }
            findings
        })
        .await
        .map_err(|e| StageError::failed("anomaly", format!("scoring task failed: {e}")))?;

        ctx.findings.extend(findings);
        Ok(ctx)
    }

    async fn health_check(&self) -> HealthStatus {
        if self.detectors.iter().any(|d| d.is_fitted()) {
            HealthStatus::Healthy
        } else {
            // Operational but producing no findings until a model is fitted.
            HealthStatus::Degraded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{build_profile, ZScoreDetector};
    use uuid::Uuid;

    fn ctx_with_profile(data: &[u8]) -> ProcessingContext {
        let mut ctx = ProcessingContext::new(Uuid::new_v4(), data.to_vec());
        ctx.entropy_profile = Some(build_profile(data, 256, 128).unwrap());
        ctx
    }

    #[tokio::test]
    async fn unfitted_detectors_yield_empty_findings() {
        let stage = AnomalyStage::new(vec![Arc::new(ZScoreDetector::new(3.0))]);
        let out = stage.process(ctx_with_profile(&[0u8; 64])).await.unwrap();
        assert!(out.findings.is_empty());
        assert_eq!(stage.health_check().await, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn fitted_detector_produces_a_finding() {
        let detector = Arc::new(ZScoreDetector::new(3.0));
        let reference: Vec<Vec<f64>> = (0..8)
            .map(|i| {
                build_profile(&vec![(i as u8); 64], 256, 128)
                    .unwrap()
                    .feature_vector()
            })
            .collect();
        detector.fit(&reference).unwrap();

        let stage = AnomalyStage::new(vec![detector]);
        let out = stage.process(ctx_with_profile(&[7u8; 64])).await.unwrap();
        assert_eq!(out.findings.len(), 1);
        assert_eq!(out.findings[0].detector_name, "zscore");
        assert_eq!(stage.health_check().await, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn missing_profile_passes_through() {
        let stage = AnomalyStage::new(vec![Arc::new(ZScoreDetector::new(3.0))]);
        let ctx = ProcessingContext::new(Uuid::new_v4(), vec![1, 2, 3]);
        let out = stage.process(ctx).await.unwrap();
        assert!(out.findings.is_empty());
    }
}
