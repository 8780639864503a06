//! Test double stages: [`MockStage`] for a fully scripted stage, and
//! [`SpyStage`] for wrapping a real stage to observe its calls without
//! changing its behavior.
//!
//! A configurable-behavior double plus a call-history log callers can
//! assert against, rather than a mocking-framework macro.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use stagekit_core::context::ExecutionContext;
use stagekit_core::result::StageResult;
use stagekit_core::stage::StageLike;
use stagekit_core::value::CtxValue;
use stagekit_error::StagekitError;

/// Scripted behavior for a [`MockStage`].
#[derive(Clone)]
pub enum MockBehavior {
    /// Always succeed with the given output.
    Succeed(CtxValue),
    /// Always fail with the given error.
    Fail(StagekitError),
    /// Fail on the first `failures` calls, then succeed with `output`.
    /// Useful for exercising retry paths.
    FailThenSucceed {
        /// Number of calls that should fail before succeeding.
        failures: u32,
        /// The error returned while failing.
        error: StagekitError,
        /// The output returned once it starts succeeding.
        output: CtxValue,
    },
}

/// A stage whose outcome, latency, and call count are entirely under
/// the test's control.
pub struct MockStage {
    name: String,
    behavior: MockBehavior,
    latency: Duration,
    retryable: bool,
    max_retries: u32,
    calls: AtomicU32,
}

impl MockStage {
    /// A mock named `name` that always succeeds with `output`.
    pub fn succeeding(name: impl Into<String>, output: CtxValue) -> Self {
        Self::new(name, MockBehavior::Succeed(output))
    }

    /// A mock named `name` that always fails with `error`.
    pub fn failing(name: impl Into<String>, error: StagekitError) -> Self {
        Self::new(name, MockBehavior::Fail(error))
    }

    /// A mock with fully custom scripted behavior.
    pub fn new(name: impl Into<String>, behavior: MockBehavior) -> Self {
        Self {
            name: name.into(),
            behavior,
            latency: Duration::ZERO,
            retryable: false,
            max_retries: 0,
            calls: AtomicU32::new(0),
        }
    }

    /// Simulate per-call latency, e.g. to exercise timeout middleware.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Advertise this stage as retryable, up to `max_retries` attempts.
    #[must_use]
    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.retryable = true;
        self.max_retries = max_retries;
        self
    }

    /// Number of times `execute` has been called so far.
    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageLike for MockStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn retryable(&self) -> bool {
        self.retryable
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }

    async fn execute(&self, _ctx: &ExecutionContext) -> StageResult {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match &self.behavior {
            MockBehavior::Succeed(output) => StageResult::success(output.clone()),
            MockBehavior::Fail(error) => StageResult::failure(error.clone()),
            MockBehavior::FailThenSucceed { failures, error, output } => {
                if call < *failures {
                    StageResult::failure(error.clone())
                } else {
                    StageResult::success(output.clone())
                }
            }
        }
    }
}

/// One recorded invocation of a [`SpyStage`].
#[derive(Debug, Clone)]
pub struct SpyCall {
    /// The execution this call belongs to.
    pub execution_id: uuid::Uuid,
    /// Whether the wrapped stage succeeded.
    pub success: bool,
}

/// Wraps a real `StageLike`, delegating every call unchanged while
/// recording each invocation for later assertion.
pub struct SpyStage {
    inner: Arc<dyn StageLike>,
    calls: Mutex<Vec<SpyCall>>,
}

impl SpyStage {
    /// Spy on `inner`, passing every call through to it untouched.
    #[must_use]
    pub fn wrap(inner: Arc<dyn StageLike>) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// The recorded calls, in invocation order.
    #[must_use]
    pub fn calls(&self) -> Vec<SpyCall> {
        self.calls.lock().clone()
    }

    /// Number of times the wrapped stage was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl StageLike for SpyStage {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn retryable(&self) -> bool {
        self.inner.retryable()
    }

    fn max_retries(&self) -> u32 {
        self.inner.max_retries()
    }

    async fn validate(&self, ctx: &ExecutionContext) -> bool {
        self.inner.validate(ctx).await
    }

    async fn execute(&self, ctx: &ExecutionContext) -> StageResult {
        let result = self.inner.execute(ctx).await;
        self.calls.lock().push(SpyCall {
            execution_id: ctx.execution_id,
            success: result.success,
        });
        result
    }

    async fn cleanup(&self, ctx: &ExecutionContext) -> Result<(), String> {
        self.inner.cleanup(ctx).await
    }

    fn no_checkpoint(&self) -> bool {
        self.inner.no_checkpoint()
    }
}
