//! [`PipelineResultAssert`]: fluent assertions over a `PipelineResult`,
//! so test bodies read as a sequence of expectations rather than a
//! block of raw field comparisons.
//!
//! Failure messages go through `pretty_assertions::assert_eq` for a
//! readable diff rather than `std::assert_eq!`'s single-line dump.

use pretty_assertions::assert_eq;

use stagekit_core::result::PipelineResult;
use stagekit_core::value::CtxValue;

/// Wraps a `PipelineResult` reference with chainable assertion methods.
/// Every method panics (via `assert!`/`assert_eq!`) on mismatch and
/// returns `self` so calls can be chained.
pub struct PipelineResultAssert<'a> {
    result: &'a PipelineResult,
}

/// Start a fluent assertion chain over `result`.
#[must_use]
pub fn assert_that(result: &PipelineResult) -> PipelineResultAssert<'_> {
    PipelineResultAssert { result }
}

impl<'a> PipelineResultAssert<'a> {
    /// Assert the pipeline succeeded.
    pub fn succeeded(self) -> Self {
        assert!(
            self.result.success,
            "expected pipeline to succeed, but it failed with {:?}",
            self.result.error
        );
        self
    }

    /// Assert the pipeline failed.
    pub fn failed(self) -> Self {
        assert!(!self.result.success, "expected pipeline to fail, but it succeeded");
        self
    }

    /// Assert the pipeline's final output equals `expected`.
    pub fn output_eq(self, expected: CtxValue) -> Self {
        assert_eq!(self.result.output, Some(expected));
        self
    }

    /// Assert the failing error's code equals `code` (e.g. `"TIMEOUT"`).
    pub fn error_code(self, code: &str) -> Self {
        let error = self.result.error.as_ref().expect("pipeline did not fail");
        assert_eq!(error.code(), code);
        self
    }

    /// Assert `stage` completed successfully.
    pub fn stage_succeeded(self, stage: &str) -> Self {
        let meta = self.result.context.metadata.read();
        assert!(
            meta.completed_stages.iter().any(|s| s == stage),
            "expected stage '{stage}' to have completed; completed = {:?}",
            meta.completed_stages
        );
        self
    }

    /// Assert `stage` failed.
    pub fn stage_failed(self, stage: &str) -> Self {
        let meta = self.result.context.metadata.read();
        assert!(
            meta.failed_stages.iter().any(|s| s == stage),
            "expected stage '{stage}' to have failed; failed = {:?}",
            meta.failed_stages
        );
        self
    }

    /// Assert exactly these stages completed, in this order.
    pub fn completed_stages_eq(self, expected: &[&str]) -> Self {
        let meta = self.result.context.metadata.read();
        let expected: Vec<String> = expected.iter().map(|s| (*s).to_string()).collect();
        assert_eq!(meta.completed_stages, expected);
        self
    }

    /// Assert the result came from the pipeline-level result cache.
    pub fn was_cache_hit(self) -> Self {
        assert!(self.result.is_cache_hit(), "expected a cache hit");
        self
    }

    /// Assert `stage` ran exactly `attempts` times (initial + retries).
    pub fn stage_attempts_eq(self, stage: &str, attempts: u32) -> Self {
        let recorded = self
            .result
            .stage_results
            .get(stage)
            .unwrap_or_else(|| panic!("no recorded result for stage '{stage}'"));
        assert_eq!(recorded.metadata.attempts, attempts);
        self
    }
}
