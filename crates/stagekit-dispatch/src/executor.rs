//! `DistributedExecutor`: the caller-facing half of dispatch. Enqueues a
//! stage as a `WorkItem`, awaits whichever worker picks it up, and
//! retries on failure up to the item's `max_attempts` before giving up
//! with `ErrorKind::QueueExhausted`.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::time::Duration;

use stagekit_core::result::StageResult;
use stagekit_error::StagekitError;

use crate::pool::WorkerPool;
use crate::queue::{WorkContext, WorkItem};

/// Drives work items through a `WorkerPool`'s shared queue and result
/// bus, presenting a simple request/response call to the caller.
pub struct DistributedExecutor {
    pool: Arc<WorkerPool>,
    result_timeout: Duration,
}

impl DistributedExecutor {
    /// Build an executor over `pool`. `result_timeout` bounds how long
    /// `execute_stage` waits for a single attempt's result before
    /// treating it as lost and retrying.
    #[must_use]
    pub fn new(pool: Arc<WorkerPool>, result_timeout: Duration) -> Self {
        Self { pool, result_timeout }
    }

    /// Enqueue `stage_name` with `context`, driving the pool forward
    /// (via `run_once`) until a result arrives, retrying up to
    /// `max_attempts` times on a lost/failed attempt.
    ///
    /// This does not spawn background workers: it alternates between
    /// enqueueing/awaiting and polling the pool itself, so it is usable
    /// without a separately-driven worker loop (tests, single-process
    /// deployments). A deployment running workers on their own tasks can
    /// ignore the interleaved `pool.run_once()` calls' effect beyond
    /// keeping this caller's own queue moving.
    pub async fn execute_stage(
        &self,
        stage_name: &str,
        context: WorkContext,
        priority: i64,
        max_attempts: u32,
    ) -> Result<StageResult, StagekitError> {
        let mut item = WorkItem::new(stage_name, context, priority, max_attempts);

        loop {
            item.attempts += 1;
            let (tx, rx) = oneshot::channel();
            self.pool.result_bus().insert(item.id, tx);
            self.pool.queue().enqueue(item.clone());

            let outcome = self.await_result(rx).await;
            match outcome {
                Some(result) if result.success => return Ok(result),
                Some(result) if item.attempts >= item.max_attempts => return Ok(result),
                _ if item.attempts >= item.max_attempts => {
                    return Err(StagekitError::queue_exhausted(item.id.to_string(), item.attempts));
                }
                _ => {
                    self.pool.result_bus().remove(&item.id);
                }
            }
        }
    }

    async fn await_result(&self, mut rx: oneshot::Receiver<crate::worker::WorkResult>) -> Option<StageResult> {
        let deadline = tokio::time::Instant::now() + self.result_timeout;
        loop {
            tokio::select! {
                res = &mut rx => {
                    return res.ok().map(|work_result| work_result.result);
                }
                () = tokio::time::sleep_until(deadline) => {
                    return None;
                }
                () = tokio::time::sleep(Duration::from_millis(5)) => {
                    self.pool.run_once().await;
                }
            }
        }
    }
}
