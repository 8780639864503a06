//! Channel-based event fan-out, owned by the orchestrator.
//!
//! Per the design note on event subscribers: rather than an ad-hoc
//! callback list, the orchestrator owns a `tokio::sync::broadcast`
//! channel and subscribers receive their own copy of every event. A lagged
//! subscriber simply misses the oldest events still in the ring buffer
//! (broadcast's built-in backpressure policy: drop, never block the
//! emitting pipeline).

use tokio::sync::broadcast;

use stagekit_core::events::Event;

/// Default channel capacity: generous enough that a slow subscriber does
/// not lose events within a single pipeline execution under normal
/// stage counts.
pub const DEFAULT_CAPACITY: usize = 256;

/// Owns the broadcast sender; cloned cheaply, shared by the pipeline.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    enabled: bool,
}

impl EventBus {
    /// Construct a bus. When `enabled` is false, `publish` is a no-op:
    /// this is how `PipelineOptions::enable_streaming` gates emission
    /// without forcing every caller to check the flag themselves.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        let (sender, _receiver) = broadcast::channel(DEFAULT_CAPACITY);
        Self { sender, enabled }
    }

    /// Subscribe to future events. Subscribing before streaming is
    /// enabled is a no-op: no events will ever arrive on that receiver.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Publish an event to every current subscriber. Errors (no
    /// subscribers) are ignored; that is an entirely normal state.
    pub fn publish(&self, event: Event) {
        if self.enabled {
            let _ = self.sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagekit_core::events::EventKind;
    use uuid::Uuid;

    #[tokio::test]
    async fn disabled_bus_drops_events() {
        let bus = EventBus::new(false);
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::PipelineStart, Uuid::new_v4()));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn enabled_bus_delivers_events_in_order() {
        let bus = EventBus::new(true);
        let mut rx = bus.subscribe();
        let id = Uuid::new_v4();
        bus.publish(Event::new(EventKind::PipelineStart, id));
        bus.publish(Event::new(EventKind::PipelineComplete, id));
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.kind, EventKind::PipelineStart);
        assert_eq!(second.kind, EventKind::PipelineComplete);
    }
}
