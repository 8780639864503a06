//! `StageResult`: the outcome of one stage attempt.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use stagekit_error::StagekitError;

use crate::context::ExecutionContext;
use crate::value::CtxValue;

/// Timing and attempt-count metadata attached to every `StageResult` by
/// the stage runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageMetadata {
    /// Wall-clock time spent executing the *winning* (or final) attempt.
    pub duration: Duration,
    /// Total attempts made, including the initial one (so a stage that
    /// succeeds on the first try reports `attempts: 1`).
    pub attempts: u32,
}

/// The result of running one stage once (after any internal retries the
/// stage runtime performed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// Whether the stage succeeded.
    pub success: bool,
    /// The stage's output, if it produced one. Assigned to
    /// `ExecutionContext::state[stage_name]` by the orchestrator when
    /// present.
    pub output: Option<CtxValue>,
    /// The failure, if `success` is `false`. The orchestrator
    /// synthesizes a generic [`StagekitError::stage_failed`] if a
    /// failing stage omitted one.
    pub error: Option<StagekitError>,
    /// When `false`, terminates the surrounding sequence after this
    /// stage (treated as a successful early exit, not a failure).
    pub continue_: bool,
    /// Advisory-only branch hint; the orchestrator never reads this to
    /// alter control flow (see the Open Question resolution in
    /// DESIGN.md). Only the `branch` combinator interprets branching.
    pub branch: Option<String>,
    /// Duration/attempt bookkeeping, filled in by the stage runtime.
    pub metadata: StageMetadata,
}

impl StageResult {
    /// A successful result with the given output, continuing the
    /// sequence, no branch hint.
    #[must_use]
    pub fn success(output: CtxValue) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
            continue_: true,
            branch: None,
            metadata: StageMetadata::default(),
        }
    }

    /// A successful result that produced no output.
    #[must_use]
    pub fn success_empty() -> Self {
        Self {
            success: true,
            output: None,
            error: None,
            continue_: true,
            branch: None,
            metadata: StageMetadata::default(),
        }
    }

    /// A failed result.
    #[must_use]
    pub fn failure(error: StagekitError) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error),
            continue_: false,
            branch: None,
            metadata: StageMetadata::default(),
        }
    }

    /// Mark this result as terminating the surrounding sequence early
    /// without being a failure (e.g. a `branch` combinator with no
    /// matching condition and no default).
    #[must_use]
    pub fn stop(mut self) -> Self {
        self.continue_ = false;
        self
    }

    /// Attach an advisory branch hint.
    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Attach duration/attempt metadata. Called by the stage runtime
    /// after running a stage to completion.
    #[must_use]
    pub fn with_metadata(mut self, metadata: StageMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Whether the surrounding sequence should proceed to the next
    /// stage after this result.
    #[must_use]
    pub fn continues(&self) -> bool {
        self.continue_
    }
}

/// Rolling per-stage counters maintained by the orchestrator across
/// every execution of one pipeline. Mutated only by the orchestrator;
/// user code and middleware get a read-only snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageMetrics {
    /// Total times this stage was executed (across all pipeline runs).
    pub invocations: u64,
    /// Total times this stage succeeded.
    pub successes: u64,
    /// Total times this stage failed (after exhausting retries).
    pub failures: u64,
    /// Total attempts across all invocations (initial + retries).
    pub total_attempts: u64,
    /// Cumulative duration spent in this stage.
    pub total_duration: Duration,
}

/// Pipeline-wide metrics: per-stage counters plus execution counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineMetrics {
    /// Total pipeline executions.
    pub executions: u64,
    /// Total executions that ended successfully.
    pub successes: u64,
    /// Total executions that ended in failure.
    pub failures: u64,
    /// Total cache hits (executions that returned a cached result
    /// without invoking any stage or middleware).
    pub cache_hits: u64,
    /// Per-stage rolling counters, keyed by stage name.
    pub per_stage: BTreeMap<String, StageMetrics>,
}

/// The final outcome of one `Pipeline::execute` call.
#[derive(Clone)]
pub struct PipelineResult {
    /// Whether the pipeline completed successfully.
    pub success: bool,
    /// The last successful stage's output, or `None` if no stage
    /// produced one (or the pipeline failed before any stage ran).
    pub output: Option<CtxValue>,
    /// The error that aborted the pipeline, if it failed.
    pub error: Option<StagekitError>,
    /// The context as it stood when execution finished. Exposed so
    /// callers can inspect `state`/`shared`/`messages` for diagnosis.
    pub context: Arc<ExecutionContext>,
    /// Per-stage outcomes recorded during this execution, keyed by
    /// stage name, in no particular order (use `context.metadata` for
    /// ordering).
    pub stage_results: BTreeMap<String, StageResult>,
    /// A snapshot of the pipeline's rolling metrics as of this
    /// execution's completion.
    pub metrics: PipelineMetrics,
}

impl PipelineResult {
    /// Whether this result came from the pipeline-level result cache
    /// rather than a live stage execution. Cache hits always report
    /// `stage_results` empty since no stage actually ran.
    #[must_use]
    pub fn is_cache_hit(&self) -> bool {
        self.stage_results.is_empty() && self.success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_continues_by_default() {
        let result = StageResult::success(json!(1));
        assert!(result.success);
        assert!(result.continues());
    }

    #[test]
    fn stop_does_not_flip_success() {
        let result = StageResult::success(json!(1)).stop();
        assert!(result.success);
        assert!(!result.continues());
    }

    #[test]
    fn failure_defaults_to_stopping() {
        let result = StageResult::failure(StagekitError::stage_failed("x", "boom"));
        assert!(!result.success);
        assert!(!result.continues());
    }
}
