//! `loop_`: repeat a body stage while a predicate holds.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use stagekit_core::context::ExecutionContext;
use stagekit_core::result::StageResult;
use stagekit_core::stage::StageLike;
use stagekit_runtime::StageRuntime;

/// Evaluated before each iteration; `i` is the zero-based iteration
/// index about to run.
pub type LoopPredicate = Arc<dyn Fn(&ExecutionContext, usize) -> bool + Send + Sync>;

/// A combinator stage that re-runs `body` while `predicate` holds,
/// `maxIterations` permits, and the body keeps succeeding.
pub struct LoopStage {
    name: String,
    body: Arc<dyn StageLike>,
    predicate: LoopPredicate,
    max_iterations: usize,
    runtime: StageRuntime,
}

/// Build a `loop` combinator stage.
#[must_use]
pub fn loop_(
    name: impl Into<String>,
    body: Arc<dyn StageLike>,
    predicate: impl Fn(&ExecutionContext, usize) -> bool + Send + Sync + 'static,
    max_iterations: usize,
) -> LoopStage {
    LoopStage {
        name: name.into(),
        body,
        predicate: Arc::new(predicate),
        max_iterations,
        runtime: StageRuntime::default(),
    }
}

#[async_trait]
impl StageLike for LoopStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &ExecutionContext) -> StageResult {
        let mut outputs = Vec::new();
        for i in 0..self.max_iterations {
            if ctx.check_cancelled().is_err() {
                return StageResult::failure(stagekit_error::StagekitError::cancelled());
            }
            if !(self.predicate)(ctx, i) {
                break;
            }
            let result = self.runtime.run(self.body.as_ref(), ctx).await;
            if !result.success {
                return StageResult::failure(
                    result
                        .error
                        .unwrap_or_else(|| stagekit_error::StagekitError::stage_failed(&self.name, "loop body failed")),
                );
            }
            outputs.push(result.output.clone().unwrap_or(json!(null)));
            if let Some(output) = &result.output {
                ctx.set_state(self.body.name(), output.clone());
            }
            if !result.continues() {
                break;
            }
        }
        StageResult::success(json!(outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc as StdArc;

    struct Incrementer(StdArc<AtomicU32>);

    #[async_trait]
    impl StageLike for Incrementer {
        fn name(&self) -> &str {
            "inc"
        }
        async fn execute(&self, _ctx: &ExecutionContext) -> StageResult {
            let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            StageResult::success(json!(n))
        }
    }

    #[tokio::test]
    async fn stops_at_max_iterations() {
        let counter = StdArc::new(AtomicU32::new(0));
        let stage = loop_("loop", StdArc::new(Incrementer(counter.clone())), |_ctx, _i| true, 3);
        let ctx = ExecutionContext::new(json!(null));
        let result = stage.execute(&ctx).await;
        assert!(result.success);
        assert_eq!(result.output, Some(json!([1, 2, 3])));
    }

    #[tokio::test]
    async fn stops_when_predicate_turns_false() {
        let counter = StdArc::new(AtomicU32::new(0));
        let stage = loop_("loop", StdArc::new(Incrementer(counter)), |_ctx, i| i < 2, 10);
        let ctx = ExecutionContext::new(json!(null));
        let result = stage.execute(&ctx).await;
        assert_eq!(result.output, Some(json!([1, 2])));
    }

    struct AlwaysFails;

    #[async_trait]
    impl StageLike for AlwaysFails {
        fn name(&self) -> &str {
            "fail"
        }
        async fn execute(&self, _ctx: &ExecutionContext) -> StageResult {
            StageResult::failure(stagekit_error::StagekitError::stage_failed("fail", "nope"))
        }
    }

    #[tokio::test]
    async fn stops_on_body_failure() {
        let stage = loop_("loop", StdArc::new(AlwaysFails), |_ctx, _i| true, 10);
        let ctx = ExecutionContext::new(json!(null));
        let result = stage.execute(&ctx).await;
        assert!(!result.success);
    }
}
