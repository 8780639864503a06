//! The `Stage` contract: the atomic unit of pipeline work.

use std::time::Duration;

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::result::StageResult;

/// A named, composable unit of pipeline work.
///
/// Two stages in the same pipeline must not share a name; the
/// orchestrator's builder enforces this at build time
/// (`PipelineBuilder::build`).
///
/// Combinators (`parallel`, `branch`, `loop_`, ...) are themselves
/// `StageLike` implementations, so they compose with each other and with
/// plain user stages uniformly.
#[async_trait]
pub trait StageLike: Send + Sync {
    /// Unique name within the owning pipeline.
    fn name(&self) -> &str;

    /// Optional human-readable description.
    fn description(&self) -> Option<&str> {
        None
    }

    /// Whether the stage runtime should retry this stage on failure.
    fn retryable(&self) -> bool {
        false
    }

    /// Maximum number of retries (not counting the initial attempt).
    fn max_retries(&self) -> u32 {
        0
    }

    /// Per-stage timeout, overriding `PipelineOptions::default_timeout`
    /// when present.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Pre-execution validation. Returning `false` fails the stage with
    /// `ValidationFailed` without consuming a retry attempt.
    async fn validate(&self, _ctx: &ExecutionContext) -> bool {
        true
    }

    /// The stage's actual work.
    async fn execute(&self, ctx: &ExecutionContext) -> StageResult;

    /// Invoked after every attempt (success or terminal failure),
    /// regardless of outcome. Cleanup failures are recorded but never
    /// overwrite the primary `StageResult`.
    async fn cleanup(&self, _ctx: &ExecutionContext) -> Result<(), String> {
        Ok(())
    }

    /// Whether this stage's output should be excluded from caching and
    /// checkpointing — set by stages whose output is not meaningfully
    /// serializable (e.g. it embeds a live handle). See the design
    /// note on canonical serialization.
    fn no_checkpoint(&self) -> bool {
        false
    }
}
