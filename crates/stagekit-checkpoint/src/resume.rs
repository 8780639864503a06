//! `resume`: rebuild a derived pipeline from a checkpoint and continue.

use std::sync::Arc;

use stagekit_core::context::ExecutionContext;
use stagekit_core::result::PipelineResult;
use stagekit_engine::{Pipeline, PipelineBuilder};
use stagekit_error::StagekitError;

use crate::checkpoint::CheckpointManager;

/// Load the checkpoint `checkpoint_id`, build a pipeline containing
/// only the stages of `pipeline` not already recorded as completed
/// (preserving relative order), and execute it with a restored context.
///
/// The derived pipeline's `completedStages` prefix is
/// exactly `checkpoint.completed_stage_names`, and the restored
/// `ExecutionContext`'s `state`/`shared`/`messages` match what the
/// checkpoint captured.
pub async fn resume(
    manager: &CheckpointManager,
    checkpoint_id: &str,
    pipeline: &Pipeline,
) -> Result<PipelineResult, StagekitError> {
    let checkpoint = manager.load(checkpoint_id).await?;

    let mut builder = PipelineBuilder::with_options(pipeline.options().clone());
    for stage in pipeline.stages() {
        if !checkpoint
            .completed_stage_names
            .iter()
            .any(|name| name == stage.name())
        {
            builder = builder.stage(Arc::clone(stage));
        }
    }
    for mw in pipeline.middleware() {
        builder = builder.middleware(Arc::clone(mw));
    }
    let derived = builder.build()?;

    let ctx = Arc::new(ExecutionContext::restore(
        checkpoint.execution_id,
        checkpoint.context_snapshot.input.clone(),
        checkpoint.context_snapshot.state.clone(),
        checkpoint.context_snapshot.shared.clone(),
        checkpoint.context_snapshot.messages.clone(),
        checkpoint.completed_stage_names.clone(),
    ));

    Ok(derived.resume_from_context(ctx).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorageBackend;
    use async_trait::async_trait;
    use serde_json::json;
    use stagekit_core::result::StageResult;
    use stagekit_core::stage::StageLike;

    struct Upper;

    #[async_trait]
    impl StageLike for Upper {
        fn name(&self) -> &str {
            "upper"
        }
        async fn execute(&self, ctx: &ExecutionContext) -> StageResult {
            let input = ctx.input.as_str().unwrap_or_default();
            StageResult::success(json!(format!("HELLO {input}")))
        }
    }

    struct Exclaim;

    #[async_trait]
    impl StageLike for Exclaim {
        fn name(&self) -> &str {
            "exclaim"
        }
        async fn execute(&self, ctx: &ExecutionContext) -> StageResult {
            let upper = ctx.get_state("upper").unwrap();
            StageResult::success(json!(format!("{}!", upper.as_str().unwrap())))
        }
    }

    struct Shout;

    #[async_trait]
    impl StageLike for Shout {
        fn name(&self) -> &str {
            "shout"
        }
        async fn execute(&self, ctx: &ExecutionContext) -> StageResult {
            let exclaim = ctx.get_state("exclaim").unwrap();
            StageResult::success(json!(format!(
                "{}!!",
                exclaim.as_str().unwrap().trim_end_matches('!')
            )))
        }
    }

    #[tokio::test]
    async fn s8_checkpoint_resume_round_trip() {
        let manager = CheckpointManager::new(Arc::new(InMemoryStorageBackend::new()), 10);
        let pipeline = Pipeline::builder("s8")
            .stage(Arc::new(Upper))
            .stage(Arc::new(Exclaim))
            .stage(Arc::new(Shout))
            .build()
            .unwrap();

        // Simulate: "upper" and "exclaim" completed, then cancellation.
        let partial_ctx = ExecutionContext::new(json!("world"));
        partial_ctx.set_state("upper", json!("HELLO world"));
        partial_ctx.set_state("exclaim", json!("HELLO world!"));
        let checkpoint = manager
            .create(
                partial_ctx.execution_id,
                "s8",
                &partial_ctx,
                vec!["upper".to_string(), "exclaim".to_string()],
                None,
            )
            .await
            .unwrap();

        let result = resume(&manager, &checkpoint.id, &pipeline).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, Some(json!("HELLO world!!")));
        assert!(!result.stage_results.contains_key("upper"));
        assert!(!result.stage_results.contains_key("exclaim"));
        assert!(result.stage_results.contains_key("shout"));
        assert_eq!(
            result.context.metadata.read().completed_stages,
            vec!["upper".to_string(), "exclaim".to_string(), "shout".to_string()]
        );
    }

    #[tokio::test]
    async fn resume_unknown_checkpoint_fails() {
        let manager = CheckpointManager::new(Arc::new(InMemoryStorageBackend::new()), 10);
        let pipeline = Pipeline::builder("p").stage(Arc::new(Upper)).build().unwrap();
        let err = resume(&manager, "checkpoint-missing-1", &pipeline)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CHECKPOINT_UNAVAILABLE");
    }
}
