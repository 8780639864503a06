//! `rateLimit`: a sliding-window request counter that rejects pipeline
//! starts once the window is full.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use stagekit_core::context::ExecutionContext;
use stagekit_core::middleware::Middleware;
use stagekit_error::StagekitError;

/// Sliding-window rate limiter middleware, ported from the same pattern
/// used for resilience rate limiting elsewhere in the workspace.
pub struct RateLimitMiddleware {
    window: Duration,
    max_requests: u64,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimitMiddleware {
    /// Build a rate limiter allowing at most `max_requests` pipeline
    /// starts per `window`.
    #[must_use]
    pub fn new(max_requests: u64, window: Duration) -> Self {
        Self {
            window,
            max_requests,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    fn try_acquire(&self) -> bool {
        let mut timestamps = self.timestamps.lock();
        let cutoff = Instant::now().checked_sub(self.window).unwrap_or_else(Instant::now);
        while matches!(timestamps.front(), Some(&front) if front < cutoff) {
            timestamps.pop_front();
        }
        if (timestamps.len() as u64) < self.max_requests {
            timestamps.push_back(Instant::now());
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &str {
        "rateLimit"
    }

    async fn on_pipeline_start(&self, _ctx: &ExecutionContext) -> Result<(), StagekitError> {
        if self.try_acquire() {
            Ok(())
        } else {
            Err(StagekitError::rate_limit_exceeded(self.max_requests, self.window))
        }
    }
}
