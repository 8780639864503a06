//! `Worker`: polls the shared queue, runs stages it is capable of, and
//! reports terminal results back to whoever is awaiting them.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use stagekit_core::context::ExecutionContext;
use stagekit_core::result::StageResult;
use stagekit_core::stage::StageLike;
use stagekit_runtime::StageRuntime;

use crate::queue::{MessageQueue, WorkItem};

/// A worker's current posture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerState {
    /// Not currently processing a work item.
    Idle,
    /// Actively running a stage.
    Busy,
    /// The worker reported an unrecoverable internal error.
    Error,
    /// Heartbeats have gone stale; the pool stops dispatching to it.
    Offline,
}

/// A periodic health/load report a worker publishes.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    /// The reporting worker.
    pub worker_id: Uuid,
    /// The worker's state at the moment of the report.
    pub state: WorkerState,
    /// Items currently in flight on this worker (0 or 1 for
    /// `poll_once`-driven workers; higher if a worker runs a batch).
    pub load: usize,
    /// When the heartbeat was produced, for staleness detection.
    pub at: Instant,
}

/// Outcome of one `Worker::poll_once` call.
#[derive(Debug)]
pub enum PollOutcome {
    /// The queue was empty.
    Empty,
    /// An item was dequeued but this worker lacks the capability; it was
    /// re-enqueued.
    Skipped,
    /// An item was run to completion (success or failure).
    Processed(WorkItem, StageResult),
}

/// A result a worker publishes for a specific work item id, picked up by
/// whichever `DistributedExecutor` call is awaiting it.
#[derive(Debug)]
pub struct WorkResult {
    /// The work item this result corresponds to.
    pub work_item_id: Uuid,
    /// The stage's outcome.
    pub result: StageResult,
}

/// Shared registry correlating in-flight work item ids to the caller
/// awaiting their result. Populated by `DistributedExecutor::execute_stage`
/// before enqueueing, drained by whichever worker completes the item.
pub type ResultBus = Arc<DashMap<Uuid, oneshot::Sender<WorkResult>>>;

/// Executes stages it is capable of, drawn from a shared priority queue.
pub struct Worker {
    id: Uuid,
    capabilities: HashSet<String>,
    registry: HashMap<String, Arc<dyn StageLike>>,
    queue: Arc<MessageQueue>,
    result_bus: ResultBus,
    runtime: StageRuntime,
    state: parking_lot::RwLock<WorkerState>,
    in_flight: AtomicUsize,
}

impl Worker {
    /// Build a worker capable of running every stage in `registry`,
    /// sharing `queue` and `result_bus` with its pool.
    #[must_use]
    pub fn new(
        registry: HashMap<String, Arc<dyn StageLike>>,
        queue: Arc<MessageQueue>,
        result_bus: ResultBus,
    ) -> Self {
        let capabilities = registry.keys().cloned().collect();
        Self {
            id: Uuid::new_v4(),
            capabilities,
            registry,
            queue,
            result_bus,
            runtime: StageRuntime::default(),
            state: parking_lot::RwLock::new(WorkerState::Idle),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// This worker's identity.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The stage names this worker can execute.
    #[must_use]
    pub fn capabilities(&self) -> &HashSet<String> {
        &self.capabilities
    }

    /// Current reported state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        *self.state.read()
    }

    /// Produce a heartbeat snapshot for the pool to aggregate.
    #[must_use]
    pub fn heartbeat(&self) -> Heartbeat {
        Heartbeat {
            worker_id: self.id,
            state: self.state(),
            load: self.in_flight.load(Ordering::Relaxed),
            at: Instant::now(),
        }
    }

    /// Dequeue at most one item and process it.
    ///
    /// A work item this worker lacks the capability for is re-enqueued
    /// (it keeps its priority, gets a fresh `enqueued_at`) so another
    /// worker can pick it up; this worker does not busy-loop on it.
    pub async fn poll_once(&self) -> PollOutcome {
        let Some(item) = self.queue.dequeue() else {
            return PollOutcome::Empty;
        };

        if !self.capabilities.contains(&item.stage_name) {
            self.queue.enqueue(item);
            return PollOutcome::Skipped;
        }

        let Some(stage) = self.registry.get(&item.stage_name) else {
            self.queue.enqueue(item);
            return PollOutcome::Skipped;
        };

        *self.state.write() = WorkerState::Busy;
        self.in_flight.fetch_add(1, Ordering::SeqCst);

        let ctx = context_from_snapshot(&item.context_snapshot);
        let result = self.runtime.run(stage.as_ref(), &ctx).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        *self.state.write() = WorkerState::Idle;

        if let Some((_, sender)) = self.result_bus.remove(&item.id) {
            let _ = sender.send(WorkResult {
                work_item_id: item.id,
                result: result.clone(),
            });
        }

        PollOutcome::Processed(item, result)
    }
}

fn context_from_snapshot(snapshot: &crate::queue::WorkContext) -> ExecutionContext {
    let ctx = ExecutionContext::new(snapshot.input.clone());
    for (k, v) in &snapshot.state {
        ctx.set_state(k.clone(), v.clone());
    }
    for (k, v) in &snapshot.shared {
        ctx.set_shared(k.clone(), v.clone());
    }
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct Double;

    #[async_trait]
    impl StageLike for Double {
        fn name(&self) -> &str {
            "double"
        }
        async fn execute(&self, ctx: &ExecutionContext) -> StageResult {
            let n = ctx.input.as_i64().unwrap_or(0);
            StageResult::success(json!(n * 2))
        }
    }

    fn registry() -> HashMap<String, Arc<dyn StageLike>> {
        let mut map: HashMap<String, Arc<dyn StageLike>> = HashMap::new();
        map.insert("double".to_string(), Arc::new(Double));
        map
    }

    #[tokio::test]
    async fn processes_capable_item_and_publishes_result() {
        let queue = Arc::new(MessageQueue::new());
        let bus: ResultBus = Arc::new(DashMap::new());
        let worker = Worker::new(registry(), queue.clone(), bus.clone());

        let item = WorkItem::new(
            "double",
            crate::queue::WorkContext {
                input: json!(21),
                ..Default::default()
            },
            0,
            1,
        );
        let item_id = item.id;
        let (tx, rx) = oneshot::channel();
        bus.insert(item_id, tx);
        queue.enqueue(item);

        let outcome = worker.poll_once().await;
        assert!(matches!(outcome, PollOutcome::Processed(_, _)));
        let received = rx.await.unwrap();
        assert_eq!(received.work_item_id, item_id);
        assert_eq!(received.result.output, Some(json!(42)));
        assert_eq!(worker.state(), WorkerState::Idle);
    }

    #[tokio::test]
    async fn skips_and_re_enqueues_incapable_item() {
        let queue = Arc::new(MessageQueue::new());
        let bus: ResultBus = Arc::new(DashMap::new());
        let worker = Worker::new(registry(), queue.clone(), bus);

        queue.enqueue(WorkItem::new("unknown", crate::queue::WorkContext::default(), 0, 1));
        let outcome = worker.poll_once().await;
        assert!(matches!(outcome, PollOutcome::Skipped));
        assert_eq!(queue.size(), 1);
    }

    #[tokio::test]
    async fn empty_queue_reports_empty() {
        let queue = Arc::new(MessageQueue::new());
        let bus: ResultBus = Arc::new(DashMap::new());
        let worker = Worker::new(registry(), queue, bus);
        assert!(matches!(worker.poll_once().await, PollOutcome::Empty));
    }
}
