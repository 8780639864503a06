//! Shared "run this ordered stage list against a context" helper used by
//! `branch`'s matched arm and anywhere else a combinator needs
//! orchestrator-like sequencing without a full `Pipeline` (no
//! middleware, no events, no pipeline-level metrics — those stay the
//! orchestrator's job).

use std::sync::Arc;

use stagekit_core::context::ExecutionContext;
use stagekit_core::result::StageResult;
use stagekit_core::stage::StageLike;
use stagekit_runtime::StageRuntime;

/// Run `stages` in order against `ctx`, writing each successful output
/// to `ctx.state` the same way the orchestrator does, stopping early on
/// failure or on a result with `continue_ == false`.
///
/// Returns the last `StageResult` produced (or a synthetic empty
/// success if `stages` is empty).
pub async fn run_stages(
    stages: &[Arc<dyn StageLike>],
    ctx: &ExecutionContext,
    runtime: &StageRuntime,
) -> StageResult {
    let mut last = StageResult::success_empty();
    for stage in stages {
        if ctx.check_cancelled().is_err() {
            return StageResult::failure(stagekit_error::StagekitError::cancelled());
        }
        let result = runtime.run(stage.as_ref(), ctx).await;
        if let Some(output) = &result.output {
            ctx.set_state(stage.name(), output.clone());
        }
        let should_stop = !result.success || !result.continues();
        last = result;
        if should_stop {
            break;
        }
    }
    last
}
