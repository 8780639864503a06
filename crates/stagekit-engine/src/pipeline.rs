//! `Pipeline`: an immutable, ordered stage+middleware graph and its
//! `execute` entry point — the pipeline orchestrator.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};
use uuid::Uuid;

use stagekit_cache::MultiLevelCache;
use stagekit_core::context::ExecutionContext;
use stagekit_core::events::{Event, EventKind};
use stagekit_core::middleware::Middleware;
use stagekit_core::result::{PipelineMetrics, PipelineResult, StageMetrics, StageResult};
use stagekit_core::stage::StageLike;
use stagekit_error::StagekitError;
use stagekit_runtime::StageRuntime;

use crate::cache_key::{cache_key, CachedResult};
use crate::events::EventBus;
use crate::options::PipelineOptions;

/// An immutable, built pipeline. Safe to execute concurrently any
/// number of times; each execution gets its own `ExecutionContext` but
/// shares this pipeline's cache and rolling metrics.
pub struct Pipeline {
    options: PipelineOptions,
    stages: Vec<Arc<dyn StageLike>>,
    middleware: Vec<Arc<dyn Middleware>>,
    runtime: StageRuntime,
    cache: Option<MultiLevelCache>,
    events: EventBus,
    metrics: parking_lot::RwLock<PipelineMetrics>,
}

impl Pipeline {
    /// Start a fluent builder.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> crate::builder::PipelineBuilder {
        crate::builder::PipelineBuilder::new(name)
    }

    pub(crate) fn new(
        options: PipelineOptions,
        stages: Vec<Arc<dyn StageLike>>,
        middleware: Vec<Arc<dyn Middleware>>,
        runtime: StageRuntime,
        cache: Option<MultiLevelCache>,
    ) -> Self {
        let events = EventBus::new(options.enable_streaming);
        Self {
            options,
            stages,
            middleware,
            runtime,
            cache,
            events,
            metrics: parking_lot::RwLock::new(PipelineMetrics::default()),
        }
    }

    /// The pipeline's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.options.name
    }

    /// The options this pipeline was built with.
    #[must_use]
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// A read-only snapshot of this pipeline's rolling metrics.
    #[must_use]
    pub fn metrics(&self) -> PipelineMetrics {
        self.metrics.read().clone()
    }

    /// Subscribe to this pipeline's lifecycle events. Only useful when
    /// `options.enable_streaming` is set; otherwise no events are ever
    /// published.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// This pipeline's declared stages, in order. Exposed so the
    /// checkpoint subsystem can build a derived pipeline containing only
    /// the stages a resumed execution still needs to run.
    #[must_use]
    pub fn stages(&self) -> &[Arc<dyn StageLike>] {
        &self.stages
    }

    /// This pipeline's registered middleware, in registration order.
    #[must_use]
    pub fn middleware(&self) -> &[Arc<dyn Middleware>] {
        &self.middleware
    }

    /// Run the pipeline once against `input`.
    #[instrument(skip(self, input, cancel), fields(pipeline = %self.options.name))]
    pub async fn execute(
        &self,
        input: stagekit_core::value::CtxValue,
        cancel: Option<CancellationToken>,
    ) -> PipelineResult {
        let execution_id = Uuid::new_v4();
        let cancel = cancel.unwrap_or_default();
        let ctx = Arc::new(ExecutionContext::new(input.clone()).with_cancel(cancel));

        let key = if self.options.enable_caching {
            cache_key(&self.options.name, &input)
        } else {
            None
        };

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(cached) = cache.get(key).await {
                if let Ok(cached) = serde_json::from_value::<CachedResult>(cached) {
                    self.metrics.write().cache_hits += 1;
                    return PipelineResult {
                        success: cached.success,
                        output: cached.output,
                        error: cached.error,
                        context: ctx,
                        stage_results: cached.stage_results,
                        metrics: self.metrics(),
                    };
                }
            }
        }

        let result = self.run_stages(ctx, execution_id).await;

        if self.options.enable_caching && result.success {
            if let (Some(cache), Some(key)) = (&self.cache, &key) {
                let cached = CachedResult {
                    success: result.success,
                    output: result.output.clone(),
                    error: result.error.clone(),
                    stage_results: result.stage_results.clone(),
                };
                if let Ok(value) = serde_json::to_value(&cached) {
                    cache.set(key, value, Some(self.options.cache_ttl())).await;
                }
            }
        }

        result
    }

    /// Run this pipeline's stage loop against an already-constructed
    /// context, bypassing the result cache entirely.
    ///
    /// This is the entry point the checkpoint subsystem's `resume` uses:
    /// it builds a derived pipeline containing only the stages that
    /// have not yet completed, restores an `ExecutionContext` from a
    /// checkpoint snapshot, and drives it through here so the restored
    /// `state`/`shared`/`messages` and `completed_stages` bookkeeping
    /// carry forward exactly as a non-resumed run would have produced
    /// them.
    pub async fn resume_from_context(&self, ctx: Arc<ExecutionContext>) -> PipelineResult {
        let execution_id = ctx.execution_id;
        self.run_stages(ctx, execution_id).await
    }

    async fn run_stages(&self, ctx: Arc<ExecutionContext>, execution_id: Uuid) -> PipelineResult {
        self.events
            .publish(Event::new(EventKind::PipelineStart, execution_id));

        for mw in &self.middleware {
            if let Err(err) = mw.on_pipeline_start(&ctx).await {
                let result = self.finish(ctx, false, None, Some(err)).await;
                return result;
            }
        }

        let mut stage_results: BTreeMap<String, StageResult> = BTreeMap::new();
        let mut last_output = None;
        let mut final_error: Option<StagekitError> = None;
        let mut success = true;

        for stage in &self.stages {
            if ctx.check_cancelled().is_err() {
                final_error = Some(StagekitError::cancelled());
                success = false;
                break;
            }

            ctx.metadata.write().enter_stage(stage.name());
            self.events
                .publish(Event::new(EventKind::StageStart, execution_id).with_stage(stage.name()));
            for mw in &self.middleware {
                if let Err(err) = mw.on_stage_start(&ctx, stage.name()).await {
                    warn!(stage = stage.name(), error = %err, "on_stage_start hook failed");
                }
            }

            let result = self.runtime.run(stage.as_ref(), &ctx).await;
            self.record_metrics(stage.name(), &result);
            stage_results.insert(stage.name().to_string(), result.clone());

            if result.success {
                ctx.metadata.write().mark_completed(stage.name());
                if let Some(output) = &result.output {
                    ctx.set_state(stage.name(), output.clone());
                    last_output = Some(output.clone());
                }
            } else {
                ctx.metadata.write().mark_failed(stage.name());
                let error = result.error.clone().unwrap_or_else(|| {
                    StagekitError::stage_failed(stage.name(), "stage reported failure")
                });
                for mw in &self.middleware {
                    if let Err(hook_err) = mw.on_error(&ctx, stage.name(), &error).await {
                        warn!(stage = stage.name(), error = %hook_err, "on_error hook failed");
                    }
                }
                if !self.options.continue_on_error {
                    final_error = Some(error);
                    success = false;
                    self.events.publish(
                        Event::new(EventKind::StageError, execution_id)
                            .with_stage(stage.name())
                            .with_error(final_error.clone().unwrap()),
                    );
                    for mw in &self.middleware {
                        if let Err(err) = mw.on_stage_complete(&ctx, stage.name(), &result).await {
                            warn!(stage = stage.name(), error = %err, "on_stage_complete hook failed");
                        }
                    }
                    break;
                }
            }

            self.events.publish(
                Event::new(EventKind::StageComplete, execution_id)
                    .with_stage(stage.name()),
            );
            for mw in &self.middleware {
                if let Err(err) = mw.on_stage_complete(&ctx, stage.name(), &result).await {
                    warn!(stage = stage.name(), error = %err, "on_stage_complete hook failed");
                }
            }

            if !result.continues() {
                break;
            }
        }

        self.finish_with_results(
            ctx,
            success,
            last_output,
            final_error,
            stage_results,
            execution_id,
        )
        .await
    }

    async fn finish(
        &self,
        ctx: Arc<ExecutionContext>,
        success: bool,
        output: Option<stagekit_core::value::CtxValue>,
        error: Option<StagekitError>,
    ) -> PipelineResult {
        let execution_id = ctx.execution_id;
        self.finish_with_results(ctx, success, output, error, BTreeMap::new(), execution_id)
            .await
    }

    async fn finish_with_results(
        &self,
        ctx: Arc<ExecutionContext>,
        success: bool,
        output: Option<stagekit_core::value::CtxValue>,
        error: Option<StagekitError>,
        stage_results: BTreeMap<String, StageResult>,
        execution_id: Uuid,
    ) -> PipelineResult {
        {
            let mut metrics = self.metrics.write();
            metrics.executions += 1;
            if success {
                metrics.successes += 1;
            } else {
                metrics.failures += 1;
            }
        }

        let result = PipelineResult {
            success,
            output,
            error,
            context: ctx,
            stage_results,
            metrics: self.metrics(),
        };

        for mw in &self.middleware {
            if let Err(err) = mw.on_pipeline_complete(&result).await {
                warn!(error = %err, "on_pipeline_complete hook failed");
            }
        }

        let mut event = Event::new(EventKind::PipelineComplete, execution_id);
        if let Some(err) = &result.error {
            event = event.with_error(err.clone());
        }
        self.events.publish(event);

        result
    }

    fn record_metrics(&self, stage_name: &str, result: &StageResult) {
        let mut metrics = self.metrics.write();
        let entry = metrics.per_stage.entry(stage_name.to_string()).or_insert_with(StageMetrics::default);
        entry.invocations += 1;
        entry.total_attempts += u64::from(result.metadata.attempts);
        entry.total_duration += result.metadata.duration;
        if result.success {
            entry.successes += 1;
        } else {
            entry.failures += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc as StdArc;

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
            let upper = upper.as_str().unwrap();
            StageResult::success(json!(format!("{upper}!")))
        }
    }

    #[tokio::test]
    async fn s1_sequential_success() {
        let pipeline = Pipeline::builder("s1")
            .stage(StdArc::new(Upper))
            .stage(StdArc::new(Exclaim))
            .build()
            .unwrap();
        let result = pipeline.execute(json!("world"), None).await;
        assert!(result.success);
        assert_eq!(result.output, Some(json!("HELLO world!")));
        assert_eq!(
            result.context.metadata.read().completed_stages,
            vec!["upper".to_string(), "exclaim".to_string()]
        );
        assert!(result.context.metadata.read().failed_stages.is_empty());
    }

    struct AlwaysFails;

    #[async_trait]
    impl StageLike for AlwaysFails {
        fn name(&self) -> &str {
            "boom"
        }
        async fn execute(&self, _ctx: &ExecutionContext) -> StageResult {
            StageResult::failure(StagekitError::stage_failed("boom", "nope"))
        }
    }

    #[tokio::test]
    async fn failure_aborts_sequence_by_default() {
        let pipeline = Pipeline::builder("abort")
            .stage(StdArc::new(AlwaysFails))
            .stage(StdArc::new(Upper))
            .build()
            .unwrap();
        let result = pipeline.execute(json!("x"), None).await;
        assert!(!result.success);
        assert!(!result.stage_results.contains_key("upper"));
    }

    #[tokio::test]
    async fn continue_on_error_runs_remaining_stages() {
        let mut options = PipelineOptions::new("continue");
        options.continue_on_error = true;
        let pipeline = crate::builder::PipelineBuilder::with_options(options)
            .stage(StdArc::new(AlwaysFails))
            .stage(StdArc::new(Upper))
            .build()
            .unwrap();
        let result = pipeline.execute(json!("world"), None).await;
        assert!(result.stage_results.contains_key("upper"));
        assert_eq!(result.output, Some(json!("HELLO world")));
    }

    struct Counter(StdArc<AtomicU32>);

    #[async_trait]
    impl StageLike for Counter {
        fn name(&self) -> &str {
            "counter"
        }
        async fn execute(&self, _ctx: &ExecutionContext) -> StageResult {
            let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            StageResult::success(json!(n))
        }
    }

    #[tokio::test]
    async fn s6_cache_hit_does_not_invoke_stages() {
        let mut options = PipelineOptions::new("s6");
        options.enable_caching = true;
        let counter = StdArc::new(AtomicU32::new(0));
        let pipeline = crate::builder::PipelineBuilder::with_options(options)
            .stage(StdArc::new(Counter(counter.clone())))
            .build()
            .unwrap();

        let first = pipeline.execute(json!("same"), None).await;
        assert_eq!(first.output, Some(json!(1)));

        let second = pipeline.execute(json!("same"), None).await;
        assert_eq!(second.output, Some(json!(1)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(second.is_cache_hit());
    }

    #[tokio::test]
    async fn cancellation_before_any_stage_aborts() {
        let pipeline = Pipeline::builder("cancel")
            .stage(StdArc::new(Upper))
            .build()
            .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = pipeline.execute(json!("x"), Some(cancel)).await;
        assert!(!result.success);
        assert_eq!(result.error.unwrap().code(), "CANCELLED");
    }

    #[tokio::test]
    async fn resume_from_context_continues_declared_order() {
        let pipeline = Pipeline::builder("resumable")
            .stage(StdArc::new(Exclaim))
            .build()
            .unwrap();

        let ctx = StdArc::new(ExecutionContext::new(json!("world")));
        ctx.set_state("upper", json!("HELLO world"));
        ctx.metadata.write().mark_completed("upper");

        let result = pipeline.resume_from_context(ctx).await;
        assert!(result.success);
        assert_eq!(result.output, Some(json!("HELLO world!")));
        assert_eq!(
            result.context.metadata.read().completed_stages,
            vec!["upper".to_string(), "exclaim".to_string()]
        );
    }
}
