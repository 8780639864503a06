//! `PipelineBuilder`: the fluent constructor for an immutable `Pipeline`.

use std::collections::BTreeSet;
use std::sync::Arc;

use stagekit_cache::{InProcessLru, MultiLevelCache};
use stagekit_core::middleware::Middleware;
use stagekit_core::stage::StageLike;
use stagekit_error::StagekitError;
use stagekit_runtime::StageRuntime;

use crate::options::PipelineOptions;
use crate::pipeline::Pipeline;

/// Default L1 capacity for the built-in pipeline result cache when
/// `enable_caching` is set and no explicit cache was supplied.
const DEFAULT_RESULT_CACHE_CAPACITY: usize = 1024;

/// Accumulates stages, middleware, and options, then validates and
/// freezes a [`Pipeline`].
pub struct PipelineBuilder {
    options: PipelineOptions,
    stages: Vec<Arc<dyn StageLike>>,
    middleware: Vec<Arc<dyn Middleware>>,
    runtime: Option<StageRuntime>,
    cache: Option<MultiLevelCache>,
}

impl PipelineBuilder {
    /// Start a builder for a pipeline named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            options: PipelineOptions::new(name),
            stages: Vec::new(),
            middleware: Vec::new(),
            runtime: None,
            cache: None,
        }
    }

    /// Start a builder from a fully-specified [`PipelineOptions`].
    #[must_use]
    pub fn with_options(options: PipelineOptions) -> Self {
        Self {
            options,
            stages: Vec::new(),
            middleware: Vec::new(),
            runtime: None,
            cache: None,
        }
    }

    /// Append a stage to the declared order.
    #[must_use]
    pub fn stage(mut self, stage: Arc<dyn StageLike>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Append a middleware to the registration order.
    #[must_use]
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Override the default exponential-backoff stage runtime.
    #[must_use]
    pub fn runtime(mut self, runtime: StageRuntime) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Supply a caller-configured result cache (e.g. with a remote L2).
    /// If omitted and `options.enable_caching` is set, a default
    /// in-process L1-only cache is used.
    #[must_use]
    pub fn cache(mut self, cache: MultiLevelCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Validate and freeze the pipeline.
    ///
    /// Fails if the stage list is empty or two stages share a name.
    /// Registering no middleware is allowed but logged as a warning,
    /// non-fatal: it does not prevent the pipeline from building.
    pub fn build(self) -> Result<Pipeline, StagekitError> {
        if self.stages.is_empty() {
            return Err(StagekitError::other(
                format!("pipeline '{}' has no stages", self.options.name),
                false,
            ));
        }

        let mut seen = BTreeSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.name().to_string()) {
                return Err(StagekitError::other(
                    format!(
                        "pipeline '{}' has duplicate stage name '{}'",
                        self.options.name,
                        stage.name()
                    ),
                    false,
                ));
            }
        }

        if self.middleware.is_empty() {
            tracing::warn!(pipeline = %self.options.name, "pipeline built with no middleware registered");
        }

        let cache = if self.options.enable_caching {
            Some(self.cache.unwrap_or_else(|| {
                MultiLevelCache::new()
                    .with_l1(Arc::new(InProcessLru::new(DEFAULT_RESULT_CACHE_CAPACITY)))
            }))
        } else {
            None
        };

        Ok(Pipeline::new(
            self.options,
            self.stages,
            self.middleware,
            self.runtime.unwrap_or_default(),
            cache,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use stagekit_core::context::ExecutionContext;
    use stagekit_core::result::StageResult;

    struct Noop(&'static str);

    #[async_trait]
    impl StageLike for Noop {
        fn name(&self) -> &str {
            self.0
        }
        async fn execute(&self, _ctx: &ExecutionContext) -> StageResult {
            StageResult::success(json!(null))
        }
    }

    #[test]
    fn rejects_empty_stage_list() {
        let err = PipelineBuilder::new("empty").build().unwrap_err();
        assert!(err.code() == "OTHER");
    }

    #[test]
    fn rejects_duplicate_stage_names() {
        let err = PipelineBuilder::new("dup")
            .stage(Arc::new(Noop("a")))
            .stage(Arc::new(Noop("a")))
            .build()
            .unwrap_err();
        assert!(format!("{err}").contains("duplicate"));
    }

    #[test]
    fn builds_with_unique_names() {
        let pipeline = PipelineBuilder::new("ok")
            .stage(Arc::new(Noop("a")))
            .stage(Arc::new(Noop("b")))
            .build()
            .unwrap();
        assert_eq!(pipeline.name(), "ok");
    }
}
