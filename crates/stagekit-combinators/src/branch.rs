//! `branch`: conditional dispatch to one of several stage lists.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use stagekit_core::context::ExecutionContext;
use stagekit_core::result::StageResult;
use stagekit_core::stage::StageLike;
use stagekit_runtime::StageRuntime;

use crate::sequence::run_stages;

/// A predicate against the execution context; `Send + Sync` so a branch
/// stage itself remains `Send + Sync`.
pub type Predicate = Arc<dyn Fn(&ExecutionContext) -> bool + Send + Sync>;

/// One `(condition, stages)` arm of a `branch` combinator.
pub struct BranchCondition {
    /// The predicate evaluated against the context.
    pub predicate: Predicate,
    /// The stage list run sequentially if `predicate` is the first to
    /// match.
    pub stages: Vec<Arc<dyn StageLike>>,
}

impl BranchCondition {
    /// Construct a condition arm.
    #[must_use]
    pub fn new(
        predicate: impl Fn(&ExecutionContext) -> bool + Send + Sync + 'static,
        stages: Vec<Arc<dyn StageLike>>,
    ) -> Self {
        Self {
            predicate: Arc::new(predicate),
            stages,
        }
    }
}

/// A combinator stage that evaluates `conditions` in order and runs the
/// first match's stage list, falling back to `default_stages` if none
/// match, or to an empty success otherwise.
pub struct BranchStage {
    name: String,
    conditions: Vec<BranchCondition>,
    default_stages: Option<Vec<Arc<dyn StageLike>>>,
    runtime: StageRuntime,
}

/// Build a `branch` combinator stage.
#[must_use]
pub fn branch(
    name: impl Into<String>,
    conditions: Vec<BranchCondition>,
    default_stages: Option<Vec<Arc<dyn StageLike>>>,
) -> BranchStage {
    BranchStage {
        name: name.into(),
        conditions,
        default_stages,
        runtime: StageRuntime::default(),
    }
}

#[async_trait]
impl StageLike for BranchStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &ExecutionContext) -> StageResult {
        for condition in &self.conditions {
            if (condition.predicate)(ctx) {
                return run_stages(&condition.stages, ctx, &self.runtime).await;
            }
        }
        if let Some(default_stages) = &self.default_stages {
            return run_stages(default_stages, ctx, &self.runtime).await;
        }
        StageResult::success(json!(null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo(&'static str, serde_json::Value);

    #[async_trait]
    impl StageLike for Echo {
        fn name(&self) -> &str {
            self.0
        }
        async fn execute(&self, _ctx: &ExecutionContext) -> StageResult {
            StageResult::success(self.1.clone())
        }
    }

    fn input_is(value: &'static str) -> impl Fn(&ExecutionContext) -> bool + Send + Sync {
        move |ctx| ctx.input.as_str() == Some(value)
    }

    #[tokio::test]
    async fn s5_dispatches_to_first_match() {
        let stage = branch(
            "branch",
            vec![
                BranchCondition::new(input_is("a"), vec![Arc::new(Echo("A", json!("ran-a")))]),
                BranchCondition::new(input_is("b"), vec![Arc::new(Echo("B", json!("ran-b")))]),
            ],
            None,
        );

        let ctx = ExecutionContext::new(json!("b"));
        let result = stage.execute(&ctx).await;
        assert_eq!(result.output, Some(json!("ran-b")));
    }

    #[tokio::test]
    async fn s5_no_match_no_default_returns_null() {
        let stage = branch(
            "branch",
            vec![BranchCondition::new(input_is("a"), vec![Arc::new(Echo("A", json!(1)))])],
            None,
        );
        let ctx = ExecutionContext::new(json!("c"));
        let result = stage.execute(&ctx).await;
        assert!(result.success);
        assert_eq!(result.output, Some(json!(null)));
    }

    #[tokio::test]
    async fn falls_back_to_default_stages() {
        let stage = branch(
            "branch",
            vec![BranchCondition::new(input_is("a"), vec![Arc::new(Echo("A", json!(1)))])],
            Some(vec![Arc::new(Echo("D", json!("default")))]),
        );
        let ctx = ExecutionContext::new(json!("c"));
        let result = stage.execute(&ctx).await;
        assert_eq!(result.output, Some(json!("default")));
    }
}
