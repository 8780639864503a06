//! `performance`: alerts when a stage or the pipeline exceeds a duration
//! threshold.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use stagekit_core::context::ExecutionContext;
use stagekit_core::middleware::Middleware;
use stagekit_core::result::{PipelineResult, StageResult};
use stagekit_error::StagekitError;

/// Logs a warning whenever a stage's or the pipeline's duration exceeds
/// its configured threshold. Either threshold may be omitted to disable
/// that half of the check.
pub struct PerformanceMiddleware {
    stage_threshold: Option<Duration>,
    pipeline_threshold: Option<Duration>,
}

impl PerformanceMiddleware {
    /// Build a performance middleware with both thresholds unset
    /// (effectively a no-op until configured).
    #[must_use]
    pub fn new() -> Self {
        Self {
            stage_threshold: None,
            pipeline_threshold: None,
        }
    }

    /// Alert when a single stage attempt exceeds `threshold`.
    #[must_use]
    pub fn with_stage_threshold(mut self, threshold: Duration) -> Self {
        self.stage_threshold = Some(threshold);
        self
    }

    /// Alert when the whole pipeline execution exceeds `threshold`.
    #[must_use]
    pub fn with_pipeline_threshold(mut self, threshold: Duration) -> Self {
        self.pipeline_threshold = Some(threshold);
        self
    }
}

impl Default for PerformanceMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for PerformanceMiddleware {
    fn name(&self) -> &str {
        "performance"
    }

    async fn on_stage_complete(
        &self,
        ctx: &ExecutionContext,
        stage: &str,
        result: &StageResult,
    ) -> Result<(), StagekitError> {
        if let Some(threshold) = self.stage_threshold {
            if result.metadata.duration > threshold {
                tracing::warn!(
                    execution_id = %ctx.execution_id,
                    stage,
                    duration_ms = result.metadata.duration.as_millis() as u64,
                    threshold_ms = threshold.as_millis() as u64,
                    "stage exceeded performance threshold"
                );
            }
        }
        Ok(())
    }

    async fn on_pipeline_complete(&self, result: &PipelineResult) -> Result<(), StagekitError> {
        if let Some(threshold) = self.pipeline_threshold {
            if let Some(start) = result.context.metadata.read().start_time {
                let elapsed = Utc::now().signed_duration_since(start);
                if let Ok(elapsed) = elapsed.to_std() {
                    if elapsed > threshold {
                        tracing::warn!(
                            execution_id = %result.context.execution_id,
                            duration_ms = elapsed.as_millis() as u64,
                            threshold_ms = threshold.as_millis() as u64,
                            "pipeline exceeded performance threshold"
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn stage_threshold_does_not_error_when_exceeded() {
        let mw = PerformanceMiddleware::new().with_stage_threshold(Duration::from_millis(1));
        let ctx = ExecutionContext::new(json!(null));
        let mut result = StageResult::success(json!(1));
        result.metadata.duration = Duration::from_millis(50);
        assert!(mw.on_stage_complete(&ctx, "slow", &result).await.is_ok());
    }

    #[tokio::test]
    async fn pipeline_threshold_reads_start_time_without_error() {
        let mw = PerformanceMiddleware::new().with_pipeline_threshold(Duration::from_millis(0));
        let result = PipelineResult {
            success: true,
            output: None,
            error: None,
            context: Arc::new(ExecutionContext::new(json!(null))),
            stage_results: Default::default(),
            metrics: Default::default(),
        };
        assert!(mw.on_pipeline_complete(&result).await.is_ok());
    }
}
