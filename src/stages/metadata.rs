//! Frame Metadata Stage
//!
//! First stage in the sequence: best-effort extraction of the telemetry
//! frame header into the context's metadata map. Parsing problems degrade
//! to a `parse_error` marker — they never fail the run, so every later
//! stage still sees the blob.

use crate::analysis::FrameSchema;
use crate::pipeline::{Stage, StageError};
use crate::types::{MetaValue, ProcessingContext};
use async_trait::async_trait;
use tracing::debug;

pub struct MetadataStage {
    schema: FrameSchema,
}

impl MetadataStage {
    pub fn new(schema: FrameSchema) -> Self {
        Self { schema }
    }
}

#[async_trait]
impl Stage for MetadataStage {
    fn name(&self) -> &str {
        "metadata"
    }

    async fn process(
        &self,
        mut ctx: ProcessingContext,
    ) -> Result<ProcessingContext, StageError> {
        let extracted = self.schema.extract(&ctx.raw_data);
        if extracted.get("parse_error") == Some(&MetaValue::Bool(true)) {
            debug!(job_id = %ctx.job_id, "Frame header unparseable, continuing degraded");
        }
        ctx.metadata.extend(extracted);
        Ok(ctx)
    }
}
