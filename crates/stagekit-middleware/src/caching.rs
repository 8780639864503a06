//! `caching`: an alternate result cache keyed by a user-supplied key
//! generator, independent of the engine's built-in canonical-digest
//! pipeline cache.
//!
//! Middleware hooks cannot skip stage execution (only `on_pipeline_start`
//! can abort, by returning an error) so this middleware cannot short-
//! circuit a run the way the engine's own cache does. It writes the
//! final output on `on_pipeline_complete` and exposes [`get`] for callers
//! who want to consult the cache themselves before invoking the pipeline.

use std::sync::Arc;

use async_trait::async_trait;

use stagekit_cache::MultiLevelCache;
use stagekit_core::context::ExecutionContext;
use stagekit_core::middleware::Middleware;
use stagekit_core::result::PipelineResult;
use stagekit_core::value::CtxValue;
use stagekit_error::StagekitError;

/// Derives a cache key from the execution context (e.g. a subset of
/// `input`, a tenant id pulled from `shared`).
pub type KeyFn = Arc<dyn Fn(&ExecutionContext) -> String + Send + Sync>;

/// A side-cache middleware writing each successful pipeline output under
/// a caller-chosen key.
pub struct CachingMiddleware {
    cache: MultiLevelCache,
    key_fn: KeyFn,
    ttl: Option<std::time::Duration>,
}

impl CachingMiddleware {
    /// Build a caching middleware over an existing [`MultiLevelCache`].
    #[must_use]
    pub fn new(cache: MultiLevelCache, key_fn: KeyFn) -> Self {
        Self {
            cache,
            key_fn,
            ttl: None,
        }
    }

    /// Set a TTL applied to every write.
    #[must_use]
    pub fn with_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Look up a previously cached output by the same key generator this
    /// middleware uses internally.
    pub async fn get(&self, ctx: &ExecutionContext) -> Option<CtxValue> {
        self.cache.get(&(self.key_fn)(ctx)).await
    }
}

#[async_trait]
impl Middleware for CachingMiddleware {
    fn name(&self) -> &str {
        "caching"
    }

    async fn on_pipeline_complete(&self, result: &PipelineResult) -> Result<(), StagekitError> {
        if result.success {
            if let Some(output) = &result.output {
                let key = (self.key_fn)(&result.context);
                self.cache.set(&key, output.clone(), self.ttl).await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stagekit_cache::InProcessLru;

    #[tokio::test]
    async fn writes_output_under_the_derived_key() {
        let cache = MultiLevelCache::new().with_l1(Arc::new(InProcessLru::new(8)));
        let mw = CachingMiddleware::new(cache, Arc::new(|ctx| ctx.execution_id.to_string()));

        let ctx = Arc::new(ExecutionContext::new(json!("in")));
        let result = PipelineResult {
            success: true,
            output: Some(json!("out")),
            error: None,
            context: ctx.clone(),
            stage_results: Default::default(),
            metrics: Default::default(),
        };
        mw.on_pipeline_complete(&result).await.unwrap();
        assert_eq!(mw.get(&ctx).await, Some(json!("out")));
    }
}
