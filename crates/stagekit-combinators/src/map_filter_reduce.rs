//! `map`/`filter`/`reduce`: per-item combinators over a context-derived
//! sequence.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use stagekit_core::context::ExecutionContext;
use stagekit_core::result::StageResult;
use stagekit_core::stage::StageLike;
use stagekit_core::value::CtxValue;
use stagekit_error::StagekitError;

/// Extracts a finite item sequence from the context, e.g. reading a
/// prior stage's output out of `state`.
pub type ItemsFn = Arc<dyn Fn(&ExecutionContext) -> Vec<CtxValue> + Send + Sync>;

/// The per-item operation `map`/`filter`/`reduce` apply. Implemented as
/// a trait (rather than a boxed async closure) so item functions can
/// carry their own state cleanly.
#[async_trait]
pub trait ItemFn: Send + Sync {
    /// Apply the operation to one item.
    async fn call(&self, item: &CtxValue, ctx: &ExecutionContext) -> StageResult;
}

#[async_trait]
impl<F, Fut> ItemFn for F
where
    F: Fn(CtxValue, &ExecutionContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = StageResult> + Send,
{
    async fn call(&self, item: &CtxValue, ctx: &ExecutionContext) -> StageResult {
        (self)(item.clone(), ctx).await
    }
}

/// A combinator stage that applies `item_fn` to every item `items_fn`
/// extracts from the context, batching up to `max_concurrency`, and
/// returns the list of outputs in item order.
pub struct MapStage {
    name: String,
    items_fn: ItemsFn,
    item_fn: Arc<dyn ItemFn>,
    max_concurrency: usize,
}

/// Build a `map` combinator stage.
#[must_use]
pub fn map(
    name: impl Into<String>,
    items_fn: ItemsFn,
    item_fn: Arc<dyn ItemFn>,
    max_concurrency: Option<usize>,
) -> MapStage {
    MapStage {
        name: name.into(),
        items_fn,
        item_fn,
        max_concurrency: max_concurrency.unwrap_or(usize::MAX),
    }
}

#[async_trait]
impl StageLike for MapStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &ExecutionContext) -> StageResult {
        let items = (self.items_fn)(ctx);
        let batch_size = self.max_concurrency.max(1).min(items.len().max(1));
        let mut outputs = Vec::with_capacity(items.len());

        for batch in items.chunks(batch_size) {
            if ctx.check_cancelled().is_err() {
                return StageResult::failure(StagekitError::cancelled());
            }
            let futures = batch.iter().map(|item| self.item_fn.call(item, ctx));
            let results = futures::future::join_all(futures).await;
            for result in results {
                outputs.push(result.output.unwrap_or(json!(null)));
            }
        }

        StageResult::success(json!(outputs))
    }
}

/// A combinator stage that keeps only the items for which `item_fn`
/// returns a successful result with a truthy output.
pub struct FilterStage {
    name: String,
    items_fn: ItemsFn,
    item_fn: Arc<dyn ItemFn>,
    max_concurrency: usize,
}

/// Build a `filter` combinator stage.
#[must_use]
pub fn filter(
    name: impl Into<String>,
    items_fn: ItemsFn,
    item_fn: Arc<dyn ItemFn>,
    max_concurrency: Option<usize>,
) -> FilterStage {
    FilterStage {
        name: name.into(),
        items_fn,
        item_fn,
        max_concurrency: max_concurrency.unwrap_or(usize::MAX),
    }
}

#[async_trait]
impl StageLike for FilterStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &ExecutionContext) -> StageResult {
        let items = (self.items_fn)(ctx);
        let batch_size = self.max_concurrency.max(1).min(items.len().max(1));
        let mut kept = Vec::new();

        for batch in items.chunks(batch_size) {
            if ctx.check_cancelled().is_err() {
                return StageResult::failure(StagekitError::cancelled());
            }
            let futures = batch
                .iter()
                .map(|item| async move { (item, self.item_fn.call(item, ctx).await) });
            let results = futures::future::join_all(futures).await;
            for (item, result) in results {
                if result.success && result.output.as_ref().is_some_and(is_truthy) {
                    kept.push(item.clone());
                }
            }
        }

        StageResult::success(json!(kept))
    }
}

fn is_truthy(value: &CtxValue) -> bool {
    match value {
        CtxValue::Bool(b) => *b,
        CtxValue::Null => false,
        _ => true,
    }
}

/// A combinator stage that threads an accumulator left to right through
/// every item, strictly sequentially.
pub struct ReduceStage {
    name: String,
    items_fn: ItemsFn,
    item_fn: Arc<dyn ItemFn>,
    init: CtxValue,
}

/// Build a `reduce` combinator stage. `item_fn` receives the running
/// accumulator as the item passed to `ItemFn::call`'s context (callers
/// close over both the accumulator and the current item via
/// `items_fn`'s captured state); the engine model keeps this simple by
/// having the accumulator flow through `ctx.shared["<name>:acc"]`
/// between calls, which `item_fn` is expected to read and update by
/// returning the new accumulator as its output.
#[must_use]
pub fn reduce(
    name: impl Into<String>,
    items_fn: ItemsFn,
    item_fn: Arc<dyn ItemFn>,
    init: CtxValue,
) -> ReduceStage {
    ReduceStage {
        name: name.into(),
        items_fn,
        item_fn,
        init,
    }
}

#[async_trait]
impl StageLike for ReduceStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &ExecutionContext) -> StageResult {
        let items = (self.items_fn)(ctx);
        let acc_key = format!("{}:acc", self.name);
        ctx.set_shared(&acc_key, self.init.clone());

        for item in &items {
            if ctx.check_cancelled().is_err() {
                return StageResult::failure(StagekitError::cancelled());
            }
            let result = self.item_fn.call(item, ctx).await;
            if !result.success {
                return StageResult::failure(
                    result
                        .error
                        .unwrap_or_else(|| StagekitError::stage_failed(&self.name, "reduce step failed")),
                );
            }
            if let Some(output) = result.output {
                ctx.set_shared(&acc_key, output);
            }
        }

        StageResult::success(ctx.get_shared(&acc_key).unwrap_or(json!(null)))
    }
}
