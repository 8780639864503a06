//! `parallel`: run substages over the same context in bounded batches.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use stagekit_core::context::ExecutionContext;
use stagekit_core::result::StageResult;
use stagekit_core::stage::StageLike;
use stagekit_error::StagekitError;
use stagekit_runtime::StageRuntime;

/// Knobs for a `parallel` combinator instance.
#[derive(Debug, Clone)]
pub struct ParallelOptions {
    /// Maximum substages run concurrently in one batch. `None` runs
    /// every substage in a single batch.
    pub max_concurrency: Option<usize>,
    /// If `false` (the default), a substage failure fails the whole
    /// combinator after the current batch finishes; if `true`, partial
    /// results are collected and the combinator still succeeds.
    pub continue_on_error: bool,
}

impl Default for ParallelOptions {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            continue_on_error: true,
        }
    }
}

/// A combinator stage that runs its substages over the shared context,
/// collecting results in declared order (not completion order).
///
/// Per the engine's documented contract, substages writing to
/// `ctx.state`/`ctx.shared` MUST use disjoint keys; this combinator
/// performs no write-conflict detection.
pub struct ParallelStage {
    name: String,
    substages: Vec<Arc<dyn StageLike>>,
    options: ParallelOptions,
    runtime: StageRuntime,
}

/// Build a `parallel` combinator stage.
#[must_use]
pub fn parallel(
    name: impl Into<String>,
    substages: Vec<Arc<dyn StageLike>>,
    options: ParallelOptions,
) -> ParallelStage {
    ParallelStage {
        name: name.into(),
        substages,
        options,
        runtime: StageRuntime::default(),
    }
}

#[async_trait]
impl StageLike for ParallelStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &ExecutionContext) -> StageResult {
        let batch_size = self.options.max_concurrency.unwrap_or(self.substages.len()).max(1);
        let mut outputs: Vec<serde_json::Value> = Vec::with_capacity(self.substages.len());
        let mut any_failed = false;

        for batch in self.substages.chunks(batch_size) {
            if ctx.check_cancelled().is_err() {
                return StageResult::failure(StagekitError::cancelled());
            }

            let futures = batch.iter().map(|stage| self.runtime.run(stage.as_ref(), ctx));
            let results = futures::future::join_all(futures).await;

            for (stage, result) in batch.iter().zip(results.into_iter()) {
                if result.success {
                    outputs.push(result.output.clone().unwrap_or(json!(null)));
                } else {
                    any_failed = true;
                    outputs.push(json!({
                        "failed": true,
                        "stage": stage.name(),
                        "error": result.error.as_ref().map(std::string::ToString::to_string),
                    }));
                }
            }

            if any_failed && !self.options.continue_on_error {
                break;
            }
        }

        if any_failed && !self.options.continue_on_error {
            return StageResult::failure(StagekitError::stage_failed(
                &self.name,
                "one or more substages failed",
            ));
        }

        StageResult::success(json!(outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixed(&'static str, serde_json::Value);

    #[async_trait]
    impl StageLike for Fixed {
        fn name(&self) -> &str {
            self.0
        }
        async fn execute(&self, _ctx: &ExecutionContext) -> StageResult {
            StageResult::success(self.1.clone())
        }
    }

    struct AlwaysFails(&'static str);

    #[async_trait]
    impl StageLike for AlwaysFails {
        fn name(&self) -> &str {
            self.0
        }
        async fn execute(&self, _ctx: &ExecutionContext) -> StageResult {
            StageResult::failure(StagekitError::stage_failed(self.0, "boom"))
        }
    }

    #[tokio::test]
    async fn s4_partial_results_preserve_order() {
        let stage = parallel(
            "batch",
            vec![
                Arc::new(Fixed("a", json!(1))),
                Arc::new(AlwaysFails("b")),
                Arc::new(Fixed("c", json!(2))),
            ],
            ParallelOptions {
                max_concurrency: None,
                continue_on_error: true,
            },
        );
        let ctx = ExecutionContext::new(json!(null));
        let result = stage.execute(&ctx).await;
        assert!(result.success);
        let output = result.output.unwrap();
        let list = output.as_array().unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list[0], json!(1));
        assert_eq!(list[2], json!(2));
        assert_eq!(list[1]["failed"], json!(true));
    }

    #[tokio::test]
    async fn fails_fast_when_continue_on_error_false() {
        let stage = parallel(
            "batch",
            vec![Arc::new(AlwaysFails("a")), Arc::new(Fixed("b", json!(1)))],
            ParallelOptions {
                max_concurrency: Some(1),
                continue_on_error: false,
            },
        );
        let ctx = ExecutionContext::new(json!(null));
        let result = stage.execute(&ctx).await;
        assert!(!result.success);
    }
}
