//! `RecurringExecutor`: run a callback at a fixed interval, up to
//! `max_executions`, emitting a per-execution event.
//!
//! Same `tokio::select!` race of a sleep against a shutdown token used
//! elsewhere in this workspace, same "never let one failing iteration
//! kill the loop" posture.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// One emitted event for a recurring execution.
#[derive(Debug, Clone, Copy)]
pub enum RecurringEvent {
    /// An iteration started.
    Started {
        /// 1-indexed iteration number.
        iteration: u64,
    },
    /// An iteration completed.
    Completed {
        /// 1-indexed iteration number.
        iteration: u64,
    },
    /// The executor stopped because `max_executions` was reached.
    Exhausted,
    /// The executor stopped because it was cancelled.
    Cancelled,
}

/// Runs a callback on a fixed interval until `max_executions` is
/// reached or the returned `CancellationToken` is signalled.
pub struct RecurringExecutor {
    cancel: CancellationToken,
    events: broadcast::Sender<RecurringEvent>,
}

impl RecurringExecutor {
    /// Start running `task` every `interval`, up to `max_executions`
    /// times (use `u64::MAX` for unbounded). Returns immediately; the
    /// loop runs in a spawned task.
    #[must_use]
    pub fn start<F, Fut>(interval: Duration, max_executions: u64, mut task: F) -> Self
    where
        F: FnMut(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let cancel = CancellationToken::new();
        let (sender, _rx) = broadcast::channel(256);

        let loop_cancel = cancel.clone();
        let loop_sender = sender.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; consume it
            let mut iteration = 0u64;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        iteration += 1;
                        let _ = loop_sender.send(RecurringEvent::Started { iteration });
                        task(iteration).await;
                        let _ = loop_sender.send(RecurringEvent::Completed { iteration });
                        if iteration >= max_executions {
                            let _ = loop_sender.send(RecurringEvent::Exhausted);
                            return;
                        }
                    }
                    () = loop_cancel.cancelled() => {
                        let _ = loop_sender.send(RecurringEvent::Cancelled);
                        return;
                    }
                }
            }
        });

        Self { cancel, events: sender }
    }

    /// Stop the loop before its next iteration begins.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Subscribe to per-iteration events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RecurringEvent> {
        self.events.subscribe()
    }
}
