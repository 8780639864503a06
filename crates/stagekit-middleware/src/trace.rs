//! `tracing`: emits span-like records keyed by `executionId`, entering
//! and exiting a tracing span for the lifetime of each stage.

use async_trait::async_trait;

use stagekit_core::context::ExecutionContext;
use stagekit_core::middleware::Middleware;
use stagekit_core::result::{PipelineResult, StageResult};
use stagekit_error::StagekitError;

/// Opens a `tracing` span per pipeline execution and records stage
/// entry/exit events inside it. Distinct from the `logging` middleware:
/// this one is meant to integrate with a distributed tracing backend via
/// `tracing`'s span hierarchy rather than produce human-readable lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMiddleware;

impl TracingMiddleware {
    /// Build the tracing middleware.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for TracingMiddleware {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn on_pipeline_start(&self, ctx: &ExecutionContext) -> Result<(), StagekitError> {
        let _span = tracing::info_span!("pipeline_execution", execution_id = %ctx.execution_id).entered();
        tracing::trace!("span opened");
        Ok(())
    }

    async fn on_stage_start(&self, ctx: &ExecutionContext, stage: &str) -> Result<(), StagekitError> {
        let _span = tracing::info_span!("stage", execution_id = %ctx.execution_id, stage).entered();
        tracing::trace!("span: stage entered");
        Ok(())
    }

    async fn on_stage_complete(
        &self,
        ctx: &ExecutionContext,
        stage: &str,
        result: &StageResult,
    ) -> Result<(), StagekitError> {
        tracing::trace!(
            execution_id = %ctx.execution_id,
            stage,
            success = result.success,
            "span: stage exited"
        );
        Ok(())
    }

    async fn on_pipeline_complete(&self, result: &PipelineResult) -> Result<(), StagekitError> {
        tracing::trace!(
            execution_id = %result.context.execution_id,
            success = result.success,
            "span: pipeline exited"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn hooks_never_fail() {
        let mw = TracingMiddleware::new();
        let ctx = ExecutionContext::new(json!(null));
        assert!(mw.on_pipeline_start(&ctx).await.is_ok());
        assert!(mw.on_stage_start(&ctx, "s").await.is_ok());
    }
}
