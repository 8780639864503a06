//! `circuitBreaker`: opens after N consecutive failures and short-circuits
//! pipeline starts with `CircuitOpen` until `resetTimeout` elapses.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use stagekit_core::context::ExecutionContext;
use stagekit_core::middleware::Middleware;
use stagekit_core::result::PipelineResult;
use stagekit_error::StagekitError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Circuit breaker middleware for a named resource (typically the
/// pipeline itself, or an external dependency the pipeline calls out
/// to). Process-local: state does not survive a restart.
pub struct CircuitBreakerMiddleware {
    resource: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreakerMiddleware {
    /// Build a circuit breaker that opens after `failure_threshold`
    /// consecutive failures and attempts a half-open probe after
    /// `reset_timeout`.
    #[must_use]
    pub fn new(resource: impl Into<String>, failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            resource: resource.into(),
            failure_threshold,
            reset_timeout,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
            }),
        }
    }

    fn can_execute(&self) -> Result<(), StagekitError> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let elapsed = inner.last_failure.map_or(Duration::MAX, |t| t.elapsed());
                if elapsed >= self.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                    tracing::info!(resource = %self.resource, "circuit breaker half-open");
                    Ok(())
                } else {
                    Err(StagekitError::circuit_open(
                        self.resource.clone(),
                        self.reset_timeout - elapsed,
                    ))
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            tracing::info!(resource = %self.resource, "circuit breaker closed after recovery");
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());
        if inner.state == CircuitState::HalfOpen || inner.failure_count >= self.failure_threshold {
            inner.state = CircuitState::Open;
            tracing::warn!(
                resource = %self.resource,
                failure_count = inner.failure_count,
                "circuit breaker opened"
            );
        }
    }
}

#[async_trait]
impl Middleware for CircuitBreakerMiddleware {
    fn name(&self) -> &str {
        "circuitBreaker"
    }

    async fn on_pipeline_start(&self, _ctx: &ExecutionContext) -> Result<(), StagekitError> {
        self.can_execute()
    }

    async fn on_pipeline_complete(&self, result: &PipelineResult) -> Result<(), StagekitError> {
        if result.success {
            self.record_success();
        } else {
            self.record_failure();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn fake_result(success: bool) -> PipelineResult {
        PipelineResult {
            success,
            output: None,
            error: None,
            context: Arc::new(ExecutionContext::new(json!(null))),
            stage_results: Default::default(),
            metrics: Default::default(),
        }
    }

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let mw = CircuitBreakerMiddleware::new("db", 2, Duration::from_secs(60));
        let ctx = ExecutionContext::new(json!(null));
        assert!(mw.on_pipeline_start(&ctx).await.is_ok());
        mw.on_pipeline_complete(&fake_result(false)).await.unwrap();
        assert!(mw.on_pipeline_start(&ctx).await.is_ok());
        mw.on_pipeline_complete(&fake_result(false)).await.unwrap();
        let err = mw.on_pipeline_start(&ctx).await.unwrap_err();
        assert_eq!(err.code(), "CIRCUIT_OPEN");
    }

    #[tokio::test]
    async fn half_open_probe_after_reset_timeout_closes_on_success() {
        let mw = CircuitBreakerMiddleware::new("db", 1, Duration::from_millis(10));
        let ctx = ExecutionContext::new(json!(null));
        mw.on_pipeline_complete(&fake_result(false)).await.unwrap();
        assert!(mw.on_pipeline_start(&ctx).await.is_err());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(mw.on_pipeline_start(&ctx).await.is_ok());
        mw.on_pipeline_complete(&fake_result(true)).await.unwrap();
        assert!(mw.on_pipeline_start(&ctx).await.is_ok());
    }
}
