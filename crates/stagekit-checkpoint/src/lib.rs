//! # Stagekit Checkpoint
//!
//! Snapshot and restart in-flight executions: a durable
//! [`CheckpointManager`] backed by a pluggable [`StorageBackend`], an
//! in-memory [`SnapshotManager`] for rollback, a [`CheckpointMiddleware`]
//! that wires checkpoint creation into a pipeline's hook chain, and the
//! [`resume`] entry point that rebuilds a derived pipeline from the
//! latest checkpoint and continues it.

pub mod checkpoint;
pub mod middleware;
pub mod resume;
pub mod snapshot;
pub mod storage;

pub use checkpoint::{Checkpoint, CheckpointManager, ContextSnapshot};
pub use middleware::{CheckpointMiddleware, CheckpointTrigger};
pub use resume::resume;
pub use snapshot::SnapshotManager;
pub use storage::{InMemoryStorageBackend, StorageBackend};
