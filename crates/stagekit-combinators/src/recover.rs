//! `recover`: wrap a stage with an error-recovery strategy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use stagekit_core::context::ExecutionContext;
use stagekit_core::result::StageResult;
use stagekit_core::stage::StageLike;
use stagekit_error::StagekitError;
use stagekit_runtime::BackoffPolicy;

/// A pluggable recovery policy consulted after `inner` fails.
#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    /// Whether this failure is worth attempting to recover from.
    fn is_recoverable(&self, error: &StagekitError, ctx: &ExecutionContext) -> bool;

    /// The number of recovery attempts this strategy permits.
    fn max_attempts(&self) -> u32;

    /// Attempt recovery. `attempt` is 1-indexed.
    async fn recover(
        &self,
        attempt: u32,
        error: &StagekitError,
        ctx: &ExecutionContext,
        inner: &dyn StageLike,
    ) -> StageResult;
}

/// Re-runs `inner` after a backoff delay, only for errors matching
/// `predicate` (default: the error's display text contains "timeout" or
/// "network").
pub struct RetryRecovery {
    backoff: BackoffPolicy,
    max_attempts: u32,
    predicate: Arc<dyn Fn(&StagekitError) -> bool + Send + Sync>,
}

impl RetryRecovery {
    /// A retry strategy with the default timeout/network predicate.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            backoff: BackoffPolicy::exponential_capped(base_delay, max_delay),
            max_attempts,
            predicate: Arc::new(default_is_transient),
        }
    }

    /// Override the recoverability predicate.
    #[must_use]
    pub fn with_predicate(
        mut self,
        predicate: impl Fn(&StagekitError) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.predicate = Arc::new(predicate);
        self
    }
}

fn default_is_transient(error: &StagekitError) -> bool {
    let text = error.to_string().to_lowercase();
    text.contains("timeout") || text.contains("network")
}

#[async_trait]
impl RecoveryStrategy for RetryRecovery {
    fn is_recoverable(&self, error: &StagekitError, _ctx: &ExecutionContext) -> bool {
        (self.predicate)(error)
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    async fn recover(
        &self,
        attempt: u32,
        _error: &StagekitError,
        ctx: &ExecutionContext,
        inner: &dyn StageLike,
    ) -> StageResult {
        let delay = self.backoff.delay_for(attempt);
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = ctx.cancel.cancelled() => return StageResult::failure(StagekitError::cancelled()),
        }
        inner.execute(ctx).await
    }
}

/// Runs a replacement stage once in place of `inner`.
pub struct FallbackRecovery {
    replacement: Arc<dyn StageLike>,
}

impl FallbackRecovery {
    /// Build a fallback recovery strategy.
    #[must_use]
    pub fn new(replacement: Arc<dyn StageLike>) -> Self {
        Self { replacement }
    }
}

#[async_trait]
impl RecoveryStrategy for FallbackRecovery {
    fn is_recoverable(&self, _error: &StagekitError, _ctx: &ExecutionContext) -> bool {
        true
    }

    fn max_attempts(&self) -> u32 {
        1
    }

    async fn recover(
        &self,
        _attempt: u32,
        _error: &StagekitError,
        ctx: &ExecutionContext,
        _inner: &dyn StageLike,
    ) -> StageResult {
        self.replacement.execute(ctx).await
    }
}

/// A combinator stage pairing an inner stage with a [`RecoveryStrategy`].
pub struct RecoverStage {
    name: String,
    inner: Arc<dyn StageLike>,
    strategy: Arc<dyn RecoveryStrategy>,
}

/// Build a `recover` combinator stage.
#[must_use]
pub fn recover(
    name: impl Into<String>,
    inner: Arc<dyn StageLike>,
    strategy: Arc<dyn RecoveryStrategy>,
) -> RecoverStage {
    RecoverStage {
        name: name.into(),
        inner,
        strategy,
    }
}

#[async_trait]
impl StageLike for RecoverStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &ExecutionContext) -> StageResult {
        let mut result = self.inner.execute(ctx).await;
        let mut attempt = 0;

        while !result.success {
            let error = result
                .error
                .clone()
                .unwrap_or_else(|| StagekitError::stage_failed(&self.name, "inner stage failed"));
            if attempt >= self.strategy.max_attempts() || !self.strategy.is_recoverable(&error, ctx) {
                break;
            }
            attempt += 1;
            result = self.strategy.recover(attempt, &error, ctx, self.inner.as_ref()).await;
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyTimeout(Arc<AtomicU32>);

    #[async_trait]
    impl StageLike for FlakyTimeout {
        fn name(&self) -> &str {
            "flaky"
        }
        async fn execute(&self, _ctx: &ExecutionContext) -> StageResult {
            let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                StageResult::failure(StagekitError::timeout(
                    "flaky",
                    Duration::from_millis(1),
                    Duration::from_millis(1),
                ))
            } else {
                StageResult::success(json!("recovered"))
            }
        }
    }

    #[tokio::test]
    async fn retry_recovery_eventually_succeeds() {
        let counter = Arc::new(AtomicU32::new(0));
        let inner = Arc::new(FlakyTimeout(counter));
        let strategy = Arc::new(RetryRecovery::new(5, Duration::from_millis(1), Duration::from_millis(5)));
        let stage = recover("recovered", inner, strategy);
        let ctx = ExecutionContext::new(json!(null));
        let result = stage.execute(&ctx).await;
        assert!(result.success);
        assert_eq!(result.output, Some(json!("recovered")));
    }

    struct AlwaysFails;

    #[async_trait]
    impl StageLike for AlwaysFails {
        fn name(&self) -> &str {
            "fail"
        }
        async fn execute(&self, _ctx: &ExecutionContext) -> StageResult {
            StageResult::failure(StagekitError::stage_failed("fail", "permanent"))
        }
    }

    #[tokio::test]
    async fn fallback_recovery_runs_replacement_once() {
        struct Replacement;
        #[async_trait]
        impl StageLike for Replacement {
            fn name(&self) -> &str {
                "replacement"
            }
            async fn execute(&self, _ctx: &ExecutionContext) -> StageResult {
                StageResult::success(json!("fallback-output"))
            }
        }

        let strategy = Arc::new(FallbackRecovery::new(Arc::new(Replacement)));
        let stage = recover("recovered", Arc::new(AlwaysFails), strategy);
        let ctx = ExecutionContext::new(json!(null));
        let result = stage.execute(&ctx).await;
        assert!(result.success);
        assert_eq!(result.output, Some(json!("fallback-output")));
    }

    #[tokio::test]
    async fn non_matching_error_is_not_recovered() {
        let strategy = Arc::new(RetryRecovery::new(3, Duration::from_millis(1), Duration::from_millis(5)));
        let stage = recover("recovered", Arc::new(AlwaysFails), strategy);
        let ctx = ExecutionContext::new(json!(null));
        let result = stage.execute(&ctx).await;
        assert!(!result.success);
    }
}
