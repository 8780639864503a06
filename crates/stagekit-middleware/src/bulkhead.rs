//! `bulkhead`: caps the number of pipeline executions in flight at once,
//! rejecting new starts once the limit is reached. An additional
//! standard middleware alongside the others, built on the same
//! isolation pattern used for stage-level resource limits.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

use stagekit_core::context::ExecutionContext;
use stagekit_core::middleware::Middleware;
use stagekit_core::result::PipelineResult;
use stagekit_error::StagekitError;

/// Bounds concurrent pipeline executions with a semaphore. A permit is
/// acquired in `on_pipeline_start`, held keyed by `execution_id`, and
/// dropped (releasing it) in `on_pipeline_complete`.
pub struct BulkheadMiddleware {
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
    held: DashMap<Uuid, OwnedSemaphorePermit>,
}

impl BulkheadMiddleware {
    /// Build a bulkhead allowing up to `max_concurrency` concurrent
    /// pipeline executions.
    #[must_use]
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            held: DashMap::new(),
        }
    }

    /// Permits currently available.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[async_trait]
impl Middleware for BulkheadMiddleware {
    fn name(&self) -> &str {
        "bulkhead"
    }

    async fn on_pipeline_start(&self, ctx: &ExecutionContext) -> Result<(), StagekitError> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => {
                self.held.insert(ctx.execution_id, permit);
                Ok(())
            }
            Err(_) => Err(StagekitError::other(
                format!("bulkhead at capacity ({} max concurrent)", self.max_concurrency),
                true,
            )),
        }
    }

    async fn on_pipeline_complete(&self, result: &PipelineResult) -> Result<(), StagekitError> {
        self.held.remove(&result.context.execution_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc as StdArc;

    fn fake_result(ctx: StdArc<ExecutionContext>) -> PipelineResult {
        PipelineResult {
            success: true,
            output: None,
            error: None,
            context: ctx,
            stage_results: Default::default(),
            metrics: Default::default(),
        }
    }

    #[tokio::test]
    async fn rejects_once_at_capacity_and_recovers_on_release() {
        let mw = BulkheadMiddleware::new(1);
        let ctx_a = StdArc::new(ExecutionContext::new(json!(null)));
        let ctx_b = StdArc::new(ExecutionContext::new(json!(null)));

        assert!(mw.on_pipeline_start(&ctx_a).await.is_ok());
        assert!(mw.on_pipeline_start(&ctx_b).await.is_err());

        mw.on_pipeline_complete(&fake_result(ctx_a.clone())).await.unwrap();
        assert!(mw.on_pipeline_start(&ctx_b).await.is_ok());
    }
}
