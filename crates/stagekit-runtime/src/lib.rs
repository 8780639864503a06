//! # Stagekit Runtime
//!
//! Runs a single [`StageLike`] to completion: cancellation checks,
//! pre-execution validation, a timeout around the stage's own work, and
//! a retry-with-backoff loop, followed by unconditional cleanup.
//!
//! This is deliberately the *only* place retry/backoff/timeout logic
//! lives for a single stage; the pipeline orchestrator (`stagekit-engine`)
//! calls `StageRuntime::run` once per stage and never re-implements any
//! of this.

pub mod backoff;

use std::time::{Duration, Instant};

use tracing::{instrument, warn};

use stagekit_core::context::ExecutionContext;
use stagekit_core::result::{StageMetadata, StageResult};
use stagekit_core::stage::StageLike;
use stagekit_error::StagekitError;

pub use backoff::BackoffPolicy;

/// Runs stages with timeout/retry/validate/cleanup semantics.
///
/// Stateless: a single instance can run any number of stages
/// concurrently. The backoff policy is shared across every stage this
/// runtime executes: retry/backoff logic lives here and nowhere else.
#[derive(Debug, Clone)]
pub struct StageRuntime {
    backoff: BackoffPolicy,
}

impl Default for StageRuntime {
    fn default() -> Self {
        Self::new(BackoffPolicy::exponential(Duration::from_millis(100)))
    }
}

impl StageRuntime {
    /// Build a runtime with an explicit backoff policy.
    #[must_use]
    pub fn new(backoff: BackoffPolicy) -> Self {
        Self { backoff }
    }

    /// Run `stage` against `ctx`, retrying and timing out as configured
    /// on the stage itself.
    #[instrument(skip(self, stage, ctx), fields(stage = stage.name()))]
    pub async fn run(&self, stage: &dyn StageLike, ctx: &ExecutionContext) -> StageResult {
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            if let Err(err) = ctx.check_cancelled() {
                return StageResult::failure(err)
                    .with_metadata(StageMetadata {
                        duration: started.elapsed(),
                        attempts,
                    });
            }

            attempts += 1;

            if attempts == 1 && !stage.validate(ctx).await {
                let result = StageResult::failure(StagekitError::validation_failed(
                    stage.name(),
                    "validate() returned false",
                ))
                .with_metadata(StageMetadata {
                    duration: started.elapsed(),
                    attempts,
                });
                self.run_cleanup(stage, ctx).await;
                return result;
            }

            let attempt_started = Instant::now();
            let outcome = self.run_once(stage, ctx).await;
            let attempt_duration = attempt_started.elapsed();

            match outcome {
                Ok(result) if result.success => {
                    let result = result.with_metadata(StageMetadata {
                        duration: attempt_duration,
                        attempts,
                    });
                    self.run_cleanup(stage, ctx).await;
                    return result;
                }
                Ok(result) => {
                    let error = result
                        .error
                        .clone()
                        .unwrap_or_else(|| {
                            StagekitError::stage_failed(stage.name(), "stage reported failure")
                        });
                    if self.should_retry(stage, attempts) {
                        if self.backoff_or_cancelled(ctx, attempts).await.is_err() {
                            let result = StageResult::failure(StagekitError::cancelled())
                                .with_metadata(StageMetadata {
                                    duration: started.elapsed(),
                                    attempts,
                                });
                            self.run_cleanup(stage, ctx).await;
                            return result;
                        }
                        continue;
                    }
                    let result = StageResult::failure(error).with_metadata(StageMetadata {
                        duration: attempt_duration,
                        attempts,
                    });
                    self.run_cleanup(stage, ctx).await;
                    return result;
                }
                Err(timeout_err) => {
                    if self.should_retry(stage, attempts) {
                        if self.backoff_or_cancelled(ctx, attempts).await.is_err() {
                            let result = StageResult::failure(StagekitError::cancelled())
                                .with_metadata(StageMetadata {
                                    duration: started.elapsed(),
                                    attempts,
                                });
                            self.run_cleanup(stage, ctx).await;
                            return result;
                        }
                        continue;
                    }
                    let result =
                        StageResult::failure(timeout_err).with_metadata(StageMetadata {
                            duration: attempt_duration,
                            attempts,
                        });
                    self.run_cleanup(stage, ctx).await;
                    return result;
                }
            }
        }
    }

    /// Whether attempt number `attempts` (1-indexed, the attempt that
    /// just failed) should be followed by a retry. `maxRetries` counts
    /// only retries, so the initial attempt is `attempts == 1` and is
    /// always eligible to retry up to `max_retries` additional times.
    fn should_retry(&self, stage: &dyn StageLike, attempts: u32) -> bool {
        stage.retryable() && attempts <= stage.max_retries()
    }

    /// Sleep for the backoff delay, aborting immediately if cancellation
    /// is observed first.
    async fn backoff_or_cancelled(
        &self,
        ctx: &ExecutionContext,
        attempts: u32,
    ) -> Result<(), ()> {
        let delay = self.backoff.delay_for(attempts);
        if delay.is_zero() {
            return if ctx.check_cancelled().is_ok() {
                Ok(())
            } else {
                Err(())
            };
        }
        tokio::select! {
            () = tokio::time::sleep(delay) => Ok(()),
            () = ctx.cancel.cancelled() => Err(()),
        }
    }

    /// Execute one attempt, racing the stage's own timeout (if any)
    /// against the stage's future.
    async fn run_once(
        &self,
        stage: &dyn StageLike,
        ctx: &ExecutionContext,
    ) -> Result<StageResult, StagekitError> {
        match stage.timeout() {
            None => Ok(stage.execute(ctx).await),
            Some(limit) => {
                let start = Instant::now();
                match tokio::time::timeout(limit, stage.execute(ctx)).await {
                    Ok(result) => Ok(result),
                    Err(_elapsed) => Err(StagekitError::timeout(
                        stage.name(),
                        start.elapsed(),
                        limit,
                    )),
                }
            }
        }
    }

    /// Invoke `stage.cleanup`, logging but never surfacing its error.
    async fn run_cleanup(&self, stage: &dyn StageLike, ctx: &ExecutionContext) {
        if let Err(err) = stage.cleanup(ctx).await {
            warn!(stage = stage.name(), error = %err, "stage cleanup failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct FlakyStage {
        fails_before_success: u32,
        attempts: Arc<AtomicU32>,
        retryable: bool,
        max_retries: u32,
        timeout: Option<Duration>,
        sleep_for: Option<Duration>,
    }

    #[async_trait]
    impl StageLike for FlakyStage {
        fn name(&self) -> &str {
            "flaky"
        }

        fn retryable(&self) -> bool {
            self.retryable
        }

        fn max_retries(&self) -> u32 {
            self.max_retries
        }

        fn timeout(&self) -> Option<Duration> {
            self.timeout
        }

        async fn execute(&self, _ctx: &ExecutionContext) -> StageResult {
            if let Some(d) = self.sleep_for {
                tokio::time::sleep(d).await;
            }
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.fails_before_success {
                StageResult::failure(StagekitError::stage_failed(self.name(), "not yet"))
            } else {
                StageResult::success(json!(42))
            }
        }
    }

    fn runtime() -> StageRuntime {
        StageRuntime::new(BackoffPolicy::Fixed {
            delay: Duration::from_millis(1),
        })
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let stage = FlakyStage {
            fails_before_success: 2,
            attempts: Arc::new(AtomicU32::new(0)),
            retryable: true,
            max_retries: 3,
            timeout: None,
            sleep_for: None,
        };
        let ctx = ExecutionContext::new(json!(null));
        let result = runtime().run(&stage, &ctx).await;
        assert!(result.success);
        assert_eq!(result.output, Some(json!(42)));
        assert_eq!(result.metadata.attempts, 3);
    }

    #[tokio::test]
    async fn non_retryable_fails_on_first_attempt() {
        let stage = FlakyStage {
            fails_before_success: 1,
            attempts: Arc::new(AtomicU32::new(0)),
            retryable: false,
            max_retries: 3,
            timeout: None,
            sleep_for: None,
        };
        let ctx = ExecutionContext::new(json!(null));
        let result = runtime().run(&stage, &ctx).await;
        assert!(!result.success);
        assert_eq!(result.metadata.attempts, 1);
    }

    #[tokio::test]
    async fn exhausting_retries_surfaces_last_error() {
        let stage = FlakyStage {
            fails_before_success: 100,
            attempts: Arc::new(AtomicU32::new(0)),
            retryable: true,
            max_retries: 2,
            timeout: None,
            sleep_for: None,
        };
        let ctx = ExecutionContext::new(json!(null));
        let result = runtime().run(&stage, &ctx).await;
        assert!(!result.success);
        assert_eq!(result.metadata.attempts, 3);
        assert_eq!(result.error.unwrap().code(), "STAGE_FAILED");
    }

    #[tokio::test]
    async fn timeout_is_fatal_for_the_attempt() {
        let stage = FlakyStage {
            fails_before_success: 0,
            attempts: Arc::new(AtomicU32::new(0)),
            retryable: false,
            max_retries: 0,
            timeout: Some(Duration::from_millis(10)),
            sleep_for: Some(Duration::from_millis(200)),
        };
        let ctx = ExecutionContext::new(json!(null));
        let result = runtime().run(&stage, &ctx).await;
        assert!(!result.success);
        assert_eq!(result.error.unwrap().code(), "TIMEOUT");
    }

    #[tokio::test]
    async fn cancellation_is_observed_before_execution() {
        let stage = FlakyStage {
            fails_before_success: 0,
            attempts: Arc::new(AtomicU32::new(0)),
            retryable: false,
            max_retries: 0,
            timeout: None,
            sleep_for: None,
        };
        let ctx = ExecutionContext::new(json!(null));
        ctx.cancel.cancel();
        let result = runtime().run(&stage, &ctx).await;
        assert!(!result.success);
        assert_eq!(result.error.unwrap().code(), "CANCELLED");
    }

    #[tokio::test]
    async fn validation_failure_consumes_no_retry() {
        struct Invalid;

        #[async_trait]
        impl StageLike for Invalid {
            fn name(&self) -> &str {
                "invalid"
            }
            fn retryable(&self) -> bool {
                true
            }
            fn max_retries(&self) -> u32 {
                5
            }
            async fn validate(&self, _ctx: &ExecutionContext) -> bool {
                false
            }
            async fn execute(&self, _ctx: &ExecutionContext) -> StageResult {
                StageResult::success(json!("should not run"))
            }
        }

        let ctx = ExecutionContext::new(json!(null));
        let result = runtime().run(&Invalid, &ctx).await;
        assert!(!result.success);
        assert_eq!(result.metadata.attempts, 1);
        assert_eq!(result.error.unwrap().code(), "VALIDATION_FAILED");
    }
}
