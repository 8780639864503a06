//! `DelayedExecutor`: schedule a one-shot callback after a delay,
//! cancellable by id.
//!
//! A `sleep_until` raced against a cancellation signal in
//! `tokio::select!`, generalized to run one arbitrary future rather
//! than a single fixed job.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Schedules one-shot delayed executions, each cancellable by the id
/// returned from `schedule`.
#[derive(Clone, Default)]
pub struct DelayedExecutor {
    handles: Arc<DashMap<Uuid, CancellationToken>>,
}

impl DelayedExecutor {
    /// A fresh executor with nothing scheduled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `task` to run once, `delay` from now. Returns an id that
    /// can be passed to `cancel` to abort before it fires.
    pub fn schedule<F>(&self, delay: std::time::Duration, task: F) -> Uuid
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        self.handles.insert(id, cancel.clone());

        let handles = Arc::clone(&self.handles);
        let fire_at = Instant::now() + delay;
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep_until(fire_at) => {
                    task.await;
                }
                () = cancel.cancelled() => {}
            }
            handles.remove(&id);
        });

        id
    }

    /// Cancel a pending execution. A no-op if it already fired or was
    /// already cancelled.
    pub fn cancel(&self, id: Uuid) {
        if let Some((_, token)) = self.handles.remove(&id) {
            token.cancel();
        }
    }

    /// How many executions are still pending.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.handles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let executor = DelayedExecutor::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = Arc::clone(&fired);
        executor.schedule(Duration::from_millis(50), async move {
            fired_clone.store(true, Ordering::SeqCst);
        });

        tokio::time::advance(Duration::from_millis(10)).await;
        assert!(!fired.load(Ordering::SeqCst));
        tokio::time::advance(Duration::from_millis(60)).await;
        tokio::task::yield_now().await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_fire_prevents_execution() {
        let executor = DelayedExecutor::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = Arc::clone(&fired);
        let id = executor.schedule(Duration::from_millis(50), async move {
            fired_clone.store(true, Ordering::SeqCst);
        });
        executor.cancel(id);

        tokio::time::advance(Duration::from_millis(100)).await;
        tokio::task::yield_now().await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
