//! `CheckpointMiddleware`: triggers `CheckpointManager::create` on
//! `stage-complete`, either unconditionally or on an interval.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use stagekit_core::context::ExecutionContext;
use stagekit_core::middleware::Middleware;
use stagekit_core::result::{PipelineResult, StageResult};
use stagekit_error::StagekitError;

use crate::checkpoint::CheckpointManager;

/// When `CheckpointMiddleware` takes a new checkpoint.
#[derive(Debug, Clone, Copy)]
pub enum CheckpointTrigger {
    /// After every stage completion.
    Unconditional,
    /// Only when at least `Duration` has elapsed since the last
    /// checkpoint for this execution.
    Interval(Duration),
}

/// Registers checkpoint creation as a pipeline middleware hook, so a
/// pipeline gains checkpointing by registering this alongside its other
/// middleware rather than the orchestrator hard-coding it.
pub struct CheckpointMiddleware {
    manager: Arc<CheckpointManager>,
    pipeline_name: String,
    trigger: CheckpointTrigger,
    last_checkpoint_at: Mutex<std::collections::HashMap<Uuid, Instant>>,
}

impl CheckpointMiddleware {
    /// Build middleware that checkpoints after every stage.
    #[must_use]
    pub fn unconditional(manager: Arc<CheckpointManager>, pipeline_name: impl Into<String>) -> Self {
        Self::new(manager, pipeline_name, CheckpointTrigger::Unconditional)
    }

    /// Build middleware that checkpoints at most once per `interval`.
    #[must_use]
    pub fn on_interval(
        manager: Arc<CheckpointManager>,
        pipeline_name: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self::new(manager, pipeline_name, CheckpointTrigger::Interval(interval))
    }

    fn new(manager: Arc<CheckpointManager>, pipeline_name: impl Into<String>, trigger: CheckpointTrigger) -> Self {
        Self {
            manager,
            pipeline_name: pipeline_name.into(),
            trigger,
            last_checkpoint_at: Mutex::new(std::collections::HashMap::new()),
        }
    }

    fn due(&self, execution_id: Uuid) -> bool {
        match self.trigger {
            CheckpointTrigger::Unconditional => true,
            CheckpointTrigger::Interval(interval) => {
                let mut last = self.last_checkpoint_at.lock();
                match last.get(&execution_id) {
                    Some(at) if at.elapsed() < interval => false,
                    _ => {
                        last.insert(execution_id, Instant::now());
                        true
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Middleware for CheckpointMiddleware {
    fn name(&self) -> &str {
        "checkpoint"
    }

    async fn on_stage_complete(
        &self,
        ctx: &ExecutionContext,
        _stage: &str,
        _result: &StageResult,
    ) -> Result<(), StagekitError> {
        if !self.due(ctx.execution_id) {
            return Ok(());
        }
        let (completed, current) = {
            let meta = ctx.metadata.read();
            (meta.completed_stages.clone(), meta.current_stage.clone())
        };
        if let Err(err) = self
            .manager
            .create(ctx.execution_id, self.pipeline_name.clone(), ctx, completed, current)
            .await
        {
            tracing::warn!(execution_id = %ctx.execution_id, error = %err, "checkpoint creation failed");
        }
        Ok(())
    }

    async fn on_pipeline_complete(&self, result: &PipelineResult) -> Result<(), StagekitError> {
        self.last_checkpoint_at.lock().remove(&result.context.execution_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorageBackend;
    use serde_json::json;

    #[tokio::test]
    async fn unconditional_checkpoints_every_stage_complete() {
        let manager = Arc::new(CheckpointManager::new(Arc::new(InMemoryStorageBackend::new()), 10));
        let mw = CheckpointMiddleware::unconditional(manager.clone(), "p");
        let ctx = ExecutionContext::new(json!(null));
        ctx.metadata.write().enter_stage("a");
        ctx.metadata.write().mark_completed("a");

        mw.on_stage_complete(&ctx, "a", &StageResult::success(json!(1)))
            .await
            .unwrap();
        ctx.metadata.write().enter_stage("b");
        ctx.metadata.write().mark_completed("b");
        mw.on_stage_complete(&ctx, "b", &StageResult::success(json!(2)))
            .await
            .unwrap();

        let checkpoints = manager.list(ctx.execution_id).await;
        assert_eq!(checkpoints.len(), 2);
        assert_eq!(checkpoints[1].completed_stage_names, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn interval_mode_skips_until_due() {
        let manager = Arc::new(CheckpointManager::new(Arc::new(InMemoryStorageBackend::new()), 10));
        let mw = CheckpointMiddleware::on_interval(manager.clone(), "p", Duration::from_secs(3600));
        let ctx = ExecutionContext::new(json!(null));
        ctx.metadata.write().mark_completed("a");
        mw.on_stage_complete(&ctx, "a", &StageResult::success(json!(1)))
            .await
            .unwrap();
        ctx.metadata.write().mark_completed("b");
        mw.on_stage_complete(&ctx, "b", &StageResult::success(json!(2)))
            .await
            .unwrap();

        assert_eq!(manager.list(ctx.execution_id).await.len(), 1);
    }
}
