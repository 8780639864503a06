//! `timeout`: arms a pipeline-wide timer that cancels the execution if
//! it runs past a fixed duration, independent of any per-stage timeout.

use std::time::Duration;

use async_trait::async_trait;

use stagekit_core::context::ExecutionContext;
use stagekit_core::middleware::Middleware;
use stagekit_error::StagekitError;

/// Spawns a background task on `on_pipeline_start` that cancels the
/// execution's token after `duration` unless the pipeline finishes
/// first. The task is self-cleaning: cancelling the token early (because
/// the pipeline finished) makes the sleep's surrounding execution moot,
/// but the task still has to run to completion or be cancelled, so we
/// race it against the same token to avoid leaking tasks past pipeline
/// completion.
pub struct TimeoutMiddleware {
    duration: Duration,
}

impl TimeoutMiddleware {
    /// Arm a pipeline-wide timeout of `duration`.
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

#[async_trait]
impl Middleware for TimeoutMiddleware {
    fn name(&self) -> &str {
        "timeout"
    }

    async fn on_pipeline_start(&self, ctx: &ExecutionContext) -> Result<(), StagekitError> {
        let cancel = ctx.cancel.clone();
        let duration = self.duration;
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(duration) => cancel.cancel(),
                () = cancel.cancelled() => {}
            }
        });
        Ok(())
    }
}
