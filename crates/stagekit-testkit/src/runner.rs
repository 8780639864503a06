//! [`TestPipelineRunner`]: a thin convenience wrapper around
//! `Pipeline::execute` for tests that want a timeout and a recorded
//! execution history without wiring up middleware themselves.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use stagekit_core::value::CtxValue;
use stagekit_engine::Pipeline;

/// The outcome of a [`TestPipelineRunner::run_with_timeout`] call.
#[derive(Debug)]
pub enum TimedOutcome {
    /// The pipeline finished within the deadline.
    Finished(stagekit_core::result::PipelineResult),
    /// The deadline elapsed before the pipeline finished. The pipeline's
    /// own execution keeps running in the background; pass a
    /// `CancellationToken` via [`TestPipelineRunner::run_cancellable`]
    /// if it must actually stop.
    TimedOut,
}

/// Runs pipelines for tests, keeping a log of every execution's result
/// for later inspection without the caller needing to thread its own
/// `Vec` through.
#[derive(Default)]
pub struct TestPipelineRunner {
    history: parking_lot::Mutex<Vec<stagekit_core::result::PipelineResult>>,
}

impl TestPipelineRunner {
    /// A runner with no recorded history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `pipeline` against `input` and record the result.
    pub async fn run(&self, pipeline: &Pipeline, input: CtxValue) -> stagekit_core::result::PipelineResult {
        let result = pipeline.execute(input, None).await;
        self.history.lock().push(result.clone());
        result
    }

    /// Run `pipeline` with a `CancellationToken` the caller retains, so
    /// it can cancel the execution mid-flight to exercise cancellation
    /// handling.
    pub async fn run_cancellable(
        &self,
        pipeline: &Pipeline,
        input: CtxValue,
        cancel: CancellationToken,
    ) -> stagekit_core::result::PipelineResult {
        let result = pipeline.execute(input, Some(cancel)).await;
        self.history.lock().push(result.clone());
        result
    }

    /// Run `pipeline`, giving up and returning [`TimedOutcome::TimedOut`]
    /// if it has not finished within `timeout`.
    pub async fn run_with_timeout(
        &self,
        pipeline: &Pipeline,
        input: CtxValue,
        timeout: Duration,
    ) -> TimedOutcome {
        match tokio::time::timeout(timeout, pipeline.execute(input, None)).await {
            Ok(result) => {
                self.history.lock().push(result.clone());
                TimedOutcome::Finished(result)
            }
            Err(_) => TimedOutcome::TimedOut,
        }
    }

    /// Every result recorded so far, in execution order.
    #[must_use]
    pub fn history(&self) -> Vec<stagekit_core::result::PipelineResult> {
        self.history.lock().clone()
    }

    /// Forget all recorded results.
    pub fn clear_history(&self) {
        self.history.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use stagekit_core::context::ExecutionContext;
    use stagekit_core::result::StageResult;
    use stagekit_core::stage::StageLike;
    use std::sync::Arc;

    struct Echo;

    #[async_trait]
    impl StageLike for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        async fn execute(&self, ctx: &ExecutionContext) -> StageResult {
            StageResult::success(ctx.input.clone())
        }
    }

    #[tokio::test]
    async fn run_records_history() {
        let pipeline = Pipeline::builder("echo-pipeline")
            .stage(Arc::new(Echo))
            .build()
            .unwrap();
        let runner = TestPipelineRunner::new();
        runner.run(&pipeline, json!("a")).await;
        runner.run(&pipeline, json!("b")).await;
        assert_eq!(runner.history().len(), 2);
    }

    struct Slow;

    #[async_trait]
    impl StageLike for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        async fn execute(&self, _ctx: &ExecutionContext) -> StageResult {
            tokio::time::sleep(Duration::from_millis(50)).await;
            StageResult::success_empty()
        }
    }

    #[tokio::test]
    async fn run_with_timeout_reports_timed_out() {
        let pipeline = Pipeline::builder("slow-pipeline")
            .stage(Arc::new(Slow))
            .build()
            .unwrap();
        let runner = TestPipelineRunner::new();
        let outcome = runner
            .run_with_timeout(&pipeline, json!(null), Duration::from_millis(5))
            .await;
        assert!(matches!(outcome, TimedOutcome::TimedOut));
    }
}
