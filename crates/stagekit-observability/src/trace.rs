//! Per-execution trace recording: a [`TraceMiddleware`] that observes
//! the stage hooks every pipeline already dispatches and assembles them
//! into an ordered [`StageSpan`] timeline a visualization layer can
//! render as a Gantt chart or, since this engine's pipelines are
//! sequential, a trivial linear DAG.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use stagekit_core::context::ExecutionContext;
use stagekit_core::middleware::Middleware;
use stagekit_core::result::{PipelineResult, StageResult};
use stagekit_error::StagekitError;

/// One stage's recorded timing within an execution's trace.
#[derive(Debug, Clone)]
pub struct StageSpan {
    /// The stage name.
    pub name: String,
    /// When the stage started, relative to the trace recorder's clock.
    pub started_at: Instant,
    /// How long the stage ran, once it has completed.
    pub duration: Option<Duration>,
    /// Whether the stage succeeded, once known.
    pub success: Option<bool>,
}

/// The full ordered timeline for one execution.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    /// Spans in the order their stages started.
    pub spans: Vec<StageSpan>,
}

impl Trace {
    /// Render the timeline as a linear DAG: consecutive-stage edges in
    /// start order. Combinators that fan work out internally (parallel,
    /// branch, ...) still appear as a single span here — the
    /// orchestrator only ever sees one `StageLike` per declared stage.
    #[must_use]
    pub fn dag_edges(&self) -> Vec<(String, String)> {
        self.spans
            .windows(2)
            .map(|pair| (pair[0].name.clone(), pair[1].name.clone()))
            .collect()
    }

    /// Total wall-clock span from the first stage's start to the last
    /// stage's completion, if every stage has finished.
    #[must_use]
    pub fn total_duration(&self) -> Option<Duration> {
        if self.spans.is_empty() {
            return Some(Duration::ZERO);
        }
        let first = self.spans.first()?.started_at;
        let last = self.spans.last()?;
        let last_end = last.started_at + last.duration?;
        Some(last_end.saturating_duration_since(first))
    }
}

/// Records per-execution traces keyed by `execution_id`. Cheap to clone
/// and share; middleware and readers see the same underlying map.
#[derive(Clone, Default)]
pub struct TraceRecorder {
    traces: Arc<DashMap<Uuid, Mutex<Trace>>>,
}

impl TraceRecorder {
    /// A recorder with no traces yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The trace recorded so far for `execution_id`, if any stage has
    /// started under it.
    #[must_use]
    pub fn trace(&self, execution_id: Uuid) -> Option<Trace> {
        self.traces.get(&execution_id).map(|t| t.lock().clone())
    }

    /// Drop a recorded trace, e.g. once a caller has consumed it.
    pub fn forget(&self, execution_id: Uuid) {
        self.traces.remove(&execution_id);
    }

    fn record_start(&self, execution_id: Uuid, stage: &str) {
        let entry = self.traces.entry(execution_id).or_default();
        entry.lock().spans.push(StageSpan {
            name: stage.to_string(),
            started_at: Instant::now(),
            duration: None,
            success: None,
        });
    }

    fn record_complete(&self, execution_id: Uuid, stage: &str, success: bool) {
        if let Some(trace) = self.traces.get(&execution_id) {
            let mut trace = trace.lock();
            if let Some(span) = trace.spans.iter_mut().rev().find(|s| s.name == stage && s.duration.is_none()) {
                span.duration = Some(span.started_at.elapsed());
                span.success = Some(success);
            }
        }
    }
}

/// Wires a [`TraceRecorder`] into a pipeline's middleware chain.
///
/// Every execution's `execution_id` is taken from the context passed to
/// `on_stage_start`/`on_stage_complete`, so one recorder can be shared
/// across every concurrent execution of a pipeline (and across
/// pipelines, if desired).
pub struct TraceMiddleware {
    recorder: TraceRecorder,
}

impl TraceMiddleware {
    /// Build middleware writing into `recorder`.
    #[must_use]
    pub fn new(recorder: TraceRecorder) -> Self {
        Self { recorder }
    }

    /// The underlying recorder, for reading traces back out.
    #[must_use]
    pub fn recorder(&self) -> &TraceRecorder {
        &self.recorder
    }
}

#[async_trait]
impl Middleware for TraceMiddleware {
    fn name(&self) -> &str {
        "trace"
    }

    async fn on_stage_start(&self, ctx: &ExecutionContext, stage: &str) -> Result<(), StagekitError> {
        self.recorder.record_start(ctx.execution_id, stage);
        Ok(())
    }

    async fn on_stage_complete(
        &self,
        ctx: &ExecutionContext,
        stage: &str,
        result: &StageResult,
    ) -> Result<(), StagekitError> {
        self.recorder.record_complete(ctx.execution_id, stage, result.success);
        Ok(())
    }

    async fn on_pipeline_complete(&self, _result: &PipelineResult) -> Result<(), StagekitError> {
        Ok(())
    }
}
