//! `metrics`: aggregates per-execution metrics into a user callback.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use stagekit_core::context::ExecutionContext;
use stagekit_core::middleware::Middleware;
use stagekit_core::result::{PipelineResult, StageResult};
use stagekit_error::StagekitError;

/// One metrics observation handed to the user callback.
#[derive(Debug, Clone)]
pub enum MetricsEvent {
    /// A stage finished (successfully or not).
    StageCompleted {
        /// Stage name.
        stage: String,
        /// Whether it succeeded.
        success: bool,
        /// Attempts made, including the winning one.
        attempts: u32,
        /// Wall-clock duration of the winning attempt.
        duration: Duration,
    },
    /// The pipeline finished.
    PipelineCompleted {
        /// Whether the pipeline succeeded overall.
        success: bool,
        /// Total stages that ran.
        stage_count: usize,
    },
}

/// A user-supplied sink for [`MetricsEvent`]s.
pub type MetricsSink = Arc<dyn Fn(MetricsEvent) + Send + Sync>;

/// Forwards every stage/pipeline completion to a user callback. The
/// engine's own `PipelineMetrics` already aggregates counters
/// internally; this middleware is for embedders who want to push
/// observations into an external metrics system.
pub struct MetricsMiddleware {
    sink: MetricsSink,
}

impl MetricsMiddleware {
    /// Build a metrics middleware around a callback.
    #[must_use]
    pub fn new(sink: MetricsSink) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Middleware for MetricsMiddleware {
    fn name(&self) -> &str {
        "metrics"
    }

    async fn on_stage_complete(
        &self,
        _ctx: &ExecutionContext,
        stage: &str,
        result: &StageResult,
    ) -> Result<(), StagekitError> {
        (self.sink)(MetricsEvent::StageCompleted {
            stage: stage.to_string(),
            success: result.success,
            attempts: result.metadata.attempts,
            duration: result.metadata.duration,
        });
        Ok(())
    }

    async fn on_pipeline_complete(&self, result: &PipelineResult) -> Result<(), StagekitError> {
        (self.sink)(MetricsEvent::PipelineCompleted {
            success: result.success,
            stage_count: result.stage_results.len(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[tokio::test]
    async fn forwards_stage_and_pipeline_events() {
        let events: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let recorded = events.clone();
        let mw = MetricsMiddleware::new(Arc::new(move |event| {
            recorded.lock().push(match event {
                MetricsEvent::StageCompleted { stage, .. } => format!("stage:{stage}"),
                MetricsEvent::PipelineCompleted { success, .. } => format!("pipeline:{success}"),
            });
        }));

        let ctx = ExecutionContext::new(json!(null));
        mw.on_stage_complete(&ctx, "a", &StageResult::success(json!(1)))
            .await
            .unwrap();

        let result = PipelineResult {
            success: true,
            output: None,
            error: None,
            context: Arc::new(ExecutionContext::new(json!(null))),
            stage_results: Default::default(),
            metrics: Default::default(),
        };
        mw.on_pipeline_complete(&result).await.unwrap();

        assert_eq!(*events.lock(), vec!["stage:a".to_string(), "pipeline:true".to_string()]);
    }
}
