//! Event-stream fan-out: hooks that react to the orchestrator's
//! [`Event`] stream, and a background task that drains a pipeline's
//! subscription and dispatches to them.
//!
//! A flat list of trait-object hooks rather than a bespoke logging
//! framework, adapted to this crate's channel-based event bus
//! (`tokio::sync::broadcast` rather than a callback list). Backpressure
//! is the bus's own policy: a lagging subscriber drops the oldest
//! unread events and resumes from the next one, it is never blocked and
//! never blocks the pipeline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use stagekit_core::events::{Event, EventKind};

/// Reacts to orchestrator events. Implementations must not block; slow
/// work (remote export, disk I/O) should be handed off internally.
pub trait ObservabilityHook: Send + Sync {
    /// Called for every event the hook's subscription receives.
    fn on_event(&self, event: &Event);

    /// Called once when the hook's subscriber task ends (bus dropped or
    /// cancelled).
    fn shutdown(&self) {}
}

/// A flat collection of hooks, all invoked for every event.
#[derive(Clone, Default)]
pub struct ObservabilityHooks {
    hooks: Arc<Vec<Arc<dyn ObservabilityHook>>>,
}

impl ObservabilityHooks {
    /// An empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook.
    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn ObservabilityHook>) -> Self {
        Arc::make_mut(&mut self.hooks).push(hook);
        self
    }

    fn emit(&self, event: &Event) {
        for hook in self.hooks.iter() {
            hook.on_event(event);
        }
    }

    fn shutdown(&self) {
        for hook in self.hooks.iter() {
            hook.shutdown();
        }
    }
}

/// Drains a `broadcast::Receiver<Event>` and dispatches each event (and
/// each lag gap) to a registered [`ObservabilityHooks`] collection.
///
/// Spawns its own task; dropping the returned [`Subscription`] does not
/// stop it — call [`Subscription::stop`] or cancel the shared token the
/// subscription was built with.
pub struct Subscription {
    cancel: CancellationToken,
    lagged: Arc<AtomicU64>,
    delivered: Arc<AtomicU64>,
}

impl Subscription {
    /// Start draining `receiver` into `hooks` until cancelled.
    #[must_use]
    pub fn spawn(mut receiver: broadcast::Receiver<Event>, hooks: ObservabilityHooks) -> Self {
        let cancel = CancellationToken::new();
        let lagged = Arc::new(AtomicU64::new(0));
        let delivered = Arc::new(AtomicU64::new(0));

        let task_cancel = cancel.clone();
        let task_lagged = Arc::clone(&lagged);
        let task_delivered = Arc::clone(&delivered);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = receiver.recv() => {
                        match received {
                            Ok(event) => {
                                hooks.emit(&event);
                                task_delivered.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                task_lagged.fetch_add(skipped, Ordering::Relaxed);
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                    () = task_cancel.cancelled() => break,
                }
            }
            hooks.shutdown();
        });

        Self { cancel, lagged, delivered }
    }

    /// Stop the subscriber task. Events already queued in the channel
    /// before this call may still be delivered.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Total events dropped because the subscriber fell behind the
    /// bus's ring buffer.
    #[must_use]
    pub fn lagged_count(&self) -> u64 {
        self.lagged.load(Ordering::Relaxed)
    }

    /// Total events successfully dispatched to the hooks.
    #[must_use]
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

/// Logs each event at `tracing::info!`, matching this workspace's
/// `LoggingHook` but built on `tracing` (the crate already threaded
/// through every stagekit crate) rather than a bespoke logging facade.
#[derive(Debug, Default)]
pub struct LoggingHook;

impl ObservabilityHook for LoggingHook {
    fn on_event(&self, event: &Event) {
        tracing::info!(
            kind = ?event.kind,
            execution_id = %event.execution_id,
            stage = event.stage_name.as_deref().unwrap_or(""),
            "pipeline event"
        );
    }
}

/// Counts events per `(kind, stage)` pair in memory. A starting point
/// for wiring an external metrics exporter; this hook itself only
/// accumulates counters.
#[derive(Debug, Default)]
pub struct MetricsHook {
    counters: DashMap<(EventKind, Option<String>), u64>,
}

impl MetricsHook {
    /// An empty counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of all counters, keyed by a human-readable label.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.counters
            .iter()
            .map(|entry| {
                let (kind, stage) = entry.key();
                let label = match stage {
                    Some(stage) => format!("{kind:?}.{stage}"),
                    None => format!("{kind:?}"),
                };
                (label, *entry.value())
            })
            .collect()
    }
}

impl ObservabilityHook for MetricsHook {
    fn on_event(&self, event: &Event) {
        *self
            .counters
            .entry((event.kind, event.stage_name.clone()))
            .or_insert(0) += 1;
    }
}
