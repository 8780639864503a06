//! `WorkItem` and the priority-within-FIFO `MessageQueue`.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stagekit_core::value::CtxValue;

/// A serializable slice of an `ExecutionContext` sent alongside a work
/// item: enough for a worker to reconstruct a context and run the named
/// stage against it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkContext {
    /// The value the owning pipeline passed to `execute`.
    pub input: CtxValue,
    /// Per-stage outputs recorded so far.
    pub state: HashMap<String, CtxValue>,
    /// Side-band coordination values.
    pub shared: HashMap<String, CtxValue>,
}

/// A queued request to execute a specific stage on a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// Unique identifier, used to correlate a terminal result back to
    /// the caller awaiting it.
    pub id: Uuid,
    /// The stage to run; a worker must have this in its capability set.
    pub stage_name: String,
    /// Context state the worker needs to run the stage.
    pub context_snapshot: WorkContext,
    /// Dispatch priority; higher values are dequeued first.
    pub priority: i64,
    /// Monotonic enqueue sequence number. Re-enqueued items receive a
    /// fresh one while retaining their original `priority`.
    pub enqueued_at: u64,
    /// Attempts made so far, including the current one.
    pub attempts: u32,
    /// Maximum attempts before the item is abandoned.
    pub max_attempts: u32,
}

impl WorkItem {
    /// Build a first-attempt work item. `enqueued_at` is assigned by the
    /// queue at `enqueue` time.
    #[must_use]
    pub fn new(stage_name: impl Into<String>, context_snapshot: WorkContext, priority: i64, max_attempts: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            stage_name: stage_name.into(),
            context_snapshot,
            priority,
            enqueued_at: 0,
            attempts: 0,
            max_attempts: max_attempts.max(1),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    item: WorkItem,
    seq: u64,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.item.priority == other.item.priority && self.seq == other.seq
    }
}
impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: higher priority sorts "greater", and
        // among equal priorities the lower sequence number (enqueued
        // earlier) must sort "greater" so it's dequeued first.
        self.item
            .priority
            .cmp(&other.item.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// FIFO-within-priority queue: `dequeue` always returns the
/// highest-priority item, breaking ties by enqueue order.
#[derive(Default)]
pub struct MessageQueue {
    heap: Mutex<BinaryHeap<Entry>>,
    next_seq: std::sync::atomic::AtomicU64,
}

impl MessageQueue {
    /// An empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an item, assigning it a fresh `enqueued_at` sequence
    /// number regardless of what it carried in (re-enqueue semantics:
    /// priority is preserved, order position is not).
    pub fn enqueue(&self, mut item: WorkItem) {
        let seq = self.next_seq.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        item.enqueued_at = seq;
        self.heap.lock().push(Entry { item, seq });
    }

    /// Destructively remove and return the next item, or `None` if
    /// empty.
    pub fn dequeue(&self) -> Option<WorkItem> {
        self.heap.lock().pop().map(|entry| entry.item)
    }

    /// Look at the next item without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<WorkItem> {
        self.heap.lock().peek().map(|entry| entry.item.clone())
    }

    /// Number of items currently queued.
    #[must_use]
    pub fn size(&self) -> usize {
        self.heap.lock().len()
    }

    /// Whether the queue has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Remove every queued item.
    pub fn clear(&self) {
        self.heap.lock().clear();
    }
}
