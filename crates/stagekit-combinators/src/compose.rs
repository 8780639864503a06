//! `compose`: chain whole pipelines, threading each one's output into
//! the next one's input.

use std::sync::Arc;

use async_trait::async_trait;

use stagekit_core::context::ExecutionContext;
use stagekit_core::result::StageResult;
use stagekit_core::stage::StageLike;
use stagekit_engine::Pipeline;
use stagekit_error::StagekitError;

/// A combinator stage wrapping an ordered list of sub-pipelines. The
/// first receives the caller's input; each subsequent one receives the
/// previous pipeline's output.
pub struct ComposeStage {
    name: String,
    pipelines: Vec<Arc<Pipeline>>,
}

/// Build a `compose` combinator stage.
#[must_use]
pub fn compose(name: impl Into<String>, pipelines: Vec<Arc<Pipeline>>) -> ComposeStage {
    ComposeStage {
        name: name.into(),
        pipelines,
    }
}

#[async_trait]
impl StageLike for ComposeStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &ExecutionContext) -> StageResult {
        let mut current_input = ctx.input.clone();
        let mut last_output = None;

        for pipeline in &self.pipelines {
            if ctx.check_cancelled().is_err() {
                return StageResult::failure(StagekitError::cancelled());
            }
            let result = pipeline
                .execute(current_input.clone(), Some(ctx.cancel.clone()))
                .await;
            if !result.success {
                return StageResult::failure(result.error.unwrap_or_else(|| {
                    StagekitError::stage_failed(pipeline.name(), "composed pipeline failed")
                }));
            }
            current_input = result.output.clone().unwrap_or(current_input);
            last_output = result.output;
        }

        StageResult::success(last_output.unwrap_or(serde_json::Value::Null))
    }
}
