//! # Stagekit Dispatch
//!
//! Distributed execution of individual stages across a pool of
//! workers: a priority-within-FIFO [`queue::MessageQueue`] of
//! [`queue::WorkItem`]s, [`worker::Worker`]s that drain it and run
//! whichever stages they're capable of, a [`pool::WorkerPool`]
//! aggregating their heartbeats for offline detection, a
//! [`balancer::LoadBalancer`] for advisory worker selection, and the
//! [`executor::DistributedExecutor`] that presents the whole thing as a
//! single `execute_stage` call with retry-on-failure semantics.

pub mod balancer;
pub mod executor;
pub mod pool;
pub mod queue;
pub mod worker;

pub use balancer::LoadBalancer;
pub use executor::DistributedExecutor;
pub use pool::{WorkerPool, WorkerStats};
pub use queue::{MessageQueue, WorkContext, WorkItem};
pub use worker::{Heartbeat, PollOutcome, ResultBus, Worker, WorkerState, WorkResult};
