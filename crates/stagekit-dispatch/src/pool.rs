//! `WorkerPool`: owns a bounded set of `Worker`s sharing one queue and
//! result bus, and aggregates their heartbeats for staleness detection.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use stagekit_core::stage::StageLike;
use uuid::Uuid;

use crate::queue::MessageQueue;
use crate::worker::{Heartbeat, PollOutcome, ResultBus, Worker, WorkerState};

/// Aggregate view of a pool's workers, as reported at `stats()` time.
#[derive(Debug, Clone)]
pub struct WorkerStats {
    /// The worker's identity.
    pub worker_id: Uuid,
    /// Its last observed state.
    pub state: WorkerState,
    /// Its last observed load.
    pub load: usize,
}

/// A bounded set of workers sharing a queue, advancing together via
/// `run_once` (one poll per worker) so the pool can be driven from a
/// single cooperative loop rather than one task per worker.
pub struct WorkerPool {
    workers: Vec<Arc<Worker>>,
    queue: Arc<MessageQueue>,
    result_bus: ResultBus,
    last_heartbeat: DashMap<Uuid, Heartbeat>,
    stale_after: Duration,
}

impl WorkerPool {
    /// Build a pool of `worker_count` workers, each capable of every
    /// stage in `registry`, sharing one queue and result bus.
    ///
    /// `stale_after` is how long a worker may go without a fresh
    /// heartbeat before `offline_workers` reports it offline.
    #[must_use]
    pub fn new(
        registry: HashMap<String, Arc<dyn StageLike>>,
        worker_count: usize,
        stale_after: Duration,
    ) -> Self {
        let queue = Arc::new(MessageQueue::new());
        let result_bus: ResultBus = Arc::new(DashMap::new());
        let workers = (0..worker_count.max(1))
            .map(|_| Arc::new(Worker::new(registry.clone(), queue.clone(), result_bus.clone())))
            .collect();
        Self {
            workers,
            queue,
            result_bus,
            last_heartbeat: DashMap::new(),
            stale_after,
        }
    }

    /// The queue shared by every worker in the pool, for enqueueing work.
    #[must_use]
    pub fn queue(&self) -> Arc<MessageQueue> {
        self.queue.clone()
    }

    /// The result bus shared by every worker, for registering a sender
    /// keyed by work item id before enqueueing it.
    #[must_use]
    pub fn result_bus(&self) -> ResultBus {
        self.result_bus.clone()
    }

    /// The workers in this pool.
    #[must_use]
    pub fn workers(&self) -> &[Arc<Worker>] {
        &self.workers
    }

    /// Drive every worker through one `poll_once`, refreshing heartbeats,
    /// and return how many items were actually processed this round.
    pub async fn run_once(&self) -> usize {
        let mut processed = 0;
        for worker in &self.workers {
            let outcome = worker.poll_once().await;
            self.last_heartbeat.insert(worker.id(), worker.heartbeat());
            if matches!(outcome, PollOutcome::Processed(_, _)) {
                processed += 1;
            }
        }
        processed
    }

    /// Snapshot of every worker's last-known state and load.
    #[must_use]
    pub fn stats(&self) -> Vec<WorkerStats> {
        self.workers
            .iter()
            .map(|w| WorkerStats {
                worker_id: w.id(),
                state: w.state(),
                load: self.last_heartbeat.get(&w.id()).map_or(0, |hb| hb.load),
            })
            .collect()
    }

    /// Worker ids whose last heartbeat is older than `stale_after`, or
    /// who have never reported one (treated as stale immediately).
    #[must_use]
    pub fn offline_workers(&self) -> Vec<Uuid> {
        self.workers
            .iter()
            .filter(|w| match self.last_heartbeat.get(&w.id()) {
                Some(hb) => hb.at.elapsed() >= self.stale_after,
                None => true,
            })
            .map(|w| w.id())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use stagekit_core::context::ExecutionContext;
    use stagekit_core::result::StageResult;

    struct Echo;

    #[async_trait]
    impl StageLike for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        async fn execute(&self, ctx: &ExecutionContext) -> StageResult {
            StageResult::success(ctx.input.clone())
        }
    }

    fn registry() -> HashMap<String, Arc<dyn StageLike>> {
        let mut map: HashMap<String, Arc<dyn StageLike>> = HashMap::new();
        map.insert("echo".to_string(), Arc::new(Echo));
        map
    }

    #[tokio::test]
    async fn run_once_drains_queued_work_across_workers() {
        let pool = WorkerPool::new(registry(), 2, Duration::from_secs(30));
        for i in 0..4 {
            pool.queue().enqueue(crate::queue::WorkItem::new(
                "echo",
                crate::queue::WorkContext {
                    input: json!(i),
                    ..Default::default()
                },
                0,
                1,
            ));
        }
        let mut total = 0;
        for _ in 0..4 {
            total += pool.run_once().await;
        }
        assert_eq!(total, 4);
        assert!(pool.queue().is_empty());
    }

    #[tokio::test]
    async fn worker_without_heartbeat_is_reported_offline() {
        let pool = WorkerPool::new(registry(), 1, Duration::from_secs(30));
        assert_eq!(pool.offline_workers().len(), 1);
        pool.run_once().await;
        assert!(pool.offline_workers().is_empty());
    }

    #[tokio::test]
    async fn stats_reflect_worker_count() {
        let pool = WorkerPool::new(registry(), 3, Duration::from_secs(30));
        assert_eq!(pool.stats().len(), 3);
    }
}
