//! Entropy Profiling Stage
//!
//! Second stage: computes the blob's entropy profile (the feature summary
//! the anomaly stage scores against). Submission validation rejects empty
//! payloads before they reach the pipeline, so an empty blob here is an
//! unrecoverable input problem and fails the run.

use crate::analysis::{build_profile, EntropyError};
use crate::pipeline::{Stage, StageError};
use crate::types::ProcessingContext;
use async_trait::async_trait;

pub struct ProfileStage {
    window: usize,
    step: usize,
}

impl ProfileStage {
    pub fn new(window: usize, step: usize) -> Self {
        Self { window, step }
    }
}

impl Default for ProfileStage {
    fn default() -> Self {
        Self::new(
            crate::config::defaults::ENTROPY_WINDOW_SIZE,
            crate::config::defaults::ENTROPY_WINDOW_STEP,
        )
    }
}

#[async_trait]
impl Stage for ProfileStage {
    fn name(&self) -> &str {
        "profile"
    }

    async fn process(
        &self,
        mut ctx: ProcessingContext,
    ) -> Result<ProcessingContext, StageError> {
        let profile = build_profile(&ctx.raw_data, self.window, self.step).map_err(
            |e: EntropyError| StageError::failed(self.name(), e.to_string()),
        )?;
        ctx.entropy_profile = Some(profile);
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn sets_profile_on_context() {
        let stage = ProfileStage::default();
        let ctx = ProcessingContext::new(Uuid::new_v4(), vec![0u8; 10]);
        let out = stage.process(ctx).await.unwrap();
        let profile = out.entropy_profile.expect("profile set");
        assert!(profile.global_entropy.abs() < 1e-12);
    }

    #[tokio::test]
    async fn empty_blob_fails_the_stage() {
        let stage = ProfileStage::default();
        let ctx = ProcessingContext::new(Uuid::new_v4(), Vec::new());
        let err = stage.process(ctx).await.unwrap_err();
        assert_eq!(err.stage(), "profile");
    }
}
