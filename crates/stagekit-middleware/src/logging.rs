//! `logging`: emits human-readable records at stage/pipeline
//! start/complete/error via `tracing`.

use async_trait::async_trait;

use stagekit_core::context::ExecutionContext;
use stagekit_core::middleware::Middleware;
use stagekit_core::result::{PipelineResult, StageResult};
use stagekit_error::StagekitError;

/// Logs every lifecycle hook at an appropriate level. Carries no state;
/// safe to share across pipelines.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    /// Construct the logging middleware.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "logging"
    }

    async fn on_pipeline_start(&self, ctx: &ExecutionContext) -> Result<(), StagekitError> {
        tracing::info!(execution_id = %ctx.execution_id, "pipeline started");
        Ok(())
    }

    async fn on_stage_start(&self, ctx: &ExecutionContext, stage: &str) -> Result<(), StagekitError> {
        tracing::debug!(execution_id = %ctx.execution_id, stage, "stage started");
        Ok(())
    }

    async fn on_stage_complete(
        &self,
        ctx: &ExecutionContext,
        stage: &str,
        result: &StageResult,
    ) -> Result<(), StagekitError> {
        if result.success {
            tracing::info!(
                execution_id = %ctx.execution_id,
                stage,
                attempts = result.metadata.attempts,
                duration_ms = result.metadata.duration.as_millis() as u64,
                "stage completed"
            );
        } else {
            tracing::warn!(
                execution_id = %ctx.execution_id,
                stage,
                error = ?result.error,
                "stage failed"
            );
        }
        Ok(())
    }

    async fn on_error(
        &self,
        ctx: &ExecutionContext,
        stage: &str,
        error: &StagekitError,
    ) -> Result<(), StagekitError> {
        tracing::error!(execution_id = %ctx.execution_id, stage, %error, "stage error");
        Ok(())
    }

    async fn on_pipeline_complete(&self, result: &PipelineResult) -> Result<(), StagekitError> {
        tracing::info!(
            execution_id = %result.context.execution_id,
            success = result.success,
            "pipeline completed"
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
        let mw = LoggingMiddleware::new();
        let ctx = ExecutionContext::new(json!(null));
        assert!(mw.on_pipeline_start(&ctx).await.is_ok());
        assert!(mw.on_stage_start(&ctx, "s").await.is_ok());
        assert!(mw
            .on_stage_complete(&ctx, "s", &StageResult::success(json!(1)))
            .await
            .is_ok());
        assert!(mw.on_error(&ctx, "s", &StagekitError::cancelled()).await.is_ok());
    }
}
