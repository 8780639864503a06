//! `dynamic`: build a fresh stage list per invocation from the input.

use std::sync::Arc;

use async_trait::async_trait;

use stagekit_core::context::ExecutionContext;
use stagekit_core::result::StageResult;
use stagekit_core::stage::StageLike;
use stagekit_core::value::CtxValue;
use stagekit_runtime::StageRuntime;

use crate::sequence::run_stages;

/// Produces a fresh, ordered stage list for one invocation.
pub type StageFactory = Arc<dyn Fn(&CtxValue, &ExecutionContext) -> Vec<Arc<dyn StageLike>> + Send + Sync>;

/// A combinator stage whose substages are decided at execution time.
pub struct DynamicStage {
    name: String,
    factory: StageFactory,
    runtime: StageRuntime,
}

/// Build a `dynamic` combinator stage.
#[must_use]
pub fn dynamic(name: impl Into<String>, factory: StageFactory) -> DynamicStage {
    DynamicStage {
        name: name.into(),
        factory,
        runtime: StageRuntime::default(),
    }
}

#[async_trait]
impl StageLike for DynamicStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &ExecutionContext) -> StageResult {
        let stages = (self.factory)(&ctx.input, ctx);
        run_stages(&stages, ctx, &self.runtime).await
    }
}
