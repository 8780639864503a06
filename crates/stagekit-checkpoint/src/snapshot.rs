//! `SnapshotManager`: an in-memory cousin of the checkpoint manager used
//! for rollback rather than durability.
//!
//! Unlike [`crate::checkpoint::CheckpointManager`], snapshots never touch
//! a [`crate::storage::StorageBackend`] — they exist only so a pipeline
//! (or a combinator like `recover`) can revert `state`/`shared`/`messages`
//! to an earlier point within the same process, without paying for a
//! durable write on every stage.

use std::collections::HashMap;

use parking_lot::Mutex;
use uuid::Uuid;

use stagekit_core::context::ExecutionContext;
use stagekit_error::StagekitError;

use crate::checkpoint::ContextSnapshot;

/// Retains up to `max_per_execution` pre-stage snapshots per execution,
/// oldest evicted first.
pub struct SnapshotManager {
    max_per_execution: usize,
    snapshots: Mutex<HashMap<Uuid, Vec<ContextSnapshot>>>,
}

impl SnapshotManager {
    /// Build a manager retaining at most `max_per_execution` snapshots
    /// per execution id.
    #[must_use]
    pub fn new(max_per_execution: usize) -> Self {
        Self {
            max_per_execution: max_per_execution.max(1),
            snapshots: Mutex::new(HashMap::new()),
        }
    }

    /// Capture `ctx`'s current state and push it onto `execution_id`'s
    /// history, evicting the oldest entry if the history is full.
    pub fn take(&self, execution_id: Uuid, ctx: &ExecutionContext) {
        let mut guard = self.snapshots.lock();
        let history = guard.entry(execution_id).or_default();
        history.push(ContextSnapshot::capture(ctx));
        if history.len() > self.max_per_execution {
            history.remove(0);
        }
    }

    /// Number of snapshots currently retained for `execution_id`.
    #[must_use]
    pub fn len(&self, execution_id: Uuid) -> usize {
        self.snapshots
            .lock()
            .get(&execution_id)
            .map_or(0, Vec::len)
    }

    /// Whether any snapshots are retained for `execution_id`.
    #[must_use]
    pub fn is_empty(&self, execution_id: Uuid) -> bool {
        self.len(execution_id) == 0
    }

    /// Revert `ctx`'s `state`/`shared`/`messages` to an earlier point.
    ///
    /// `steps_back = 0` restores the most recently taken snapshot,
    /// `1` the one before it, and so on. Fails if fewer than
    /// `steps_back + 1` snapshots have been taken.
    pub fn rollback(
        &self,
        execution_id: Uuid,
        ctx: &ExecutionContext,
        steps_back: usize,
    ) -> Result<(), StagekitError> {
        let guard = self.snapshots.lock();
        let history = guard
            .get(&execution_id)
            .ok_or_else(|| StagekitError::other("no snapshots recorded for execution", false))?;

        let index = history
            .len()
            .checked_sub(steps_back + 1)
            .ok_or_else(|| StagekitError::other("not enough snapshot history to roll back", false))?;

        let snapshot = &history[index];
        ctx.replace_state(snapshot.state.clone());
        ctx.replace_shared(snapshot.shared.clone());
        ctx.replace_messages(snapshot.messages.clone());
        Ok(())
    }

    /// Discard all snapshots recorded for `execution_id`, e.g. once an
    /// execution finishes.
    pub fn clear(&self, execution_id: Uuid) {
        self.snapshots.lock().remove(&execution_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rollback_restores_prior_state() {
        let mgr = SnapshotManager::new(4);
        let ctx = ExecutionContext::new(json!(null));
        let exec_id = ctx.execution_id;

        ctx.set_state("a", json!(1));
        mgr.take(exec_id, &ctx);

        ctx.set_state("b", json!(2));
        mgr.take(exec_id, &ctx);

        assert_eq!(ctx.get_state("a"), Some(json!(1)));
        assert_eq!(ctx.get_state("b"), Some(json!(2)));

        mgr.rollback(exec_id, &ctx, 1).unwrap();
        assert_eq!(ctx.get_state("a"), Some(json!(1)));
        assert_eq!(ctx.get_state("b"), None);
    }

    #[test]
    fn eviction_keeps_only_the_newest_n() {
        let mgr = SnapshotManager::new(2);
        let ctx = ExecutionContext::new(json!(null));
        let exec_id = ctx.execution_id;

        for i in 0..5 {
            ctx.set_state("x", json!(i));
            mgr.take(exec_id, &ctx);
        }
        assert_eq!(mgr.len(exec_id), 2);

        // The oldest retained snapshot is "3" (4 is most recent).
        mgr.rollback(exec_id, &ctx, 1).unwrap();
        assert_eq!(ctx.get_state("x"), Some(json!(3)));
    }

    #[test]
    fn rollback_past_history_fails() {
        let mgr = SnapshotManager::new(4);
        let ctx = ExecutionContext::new(json!(null));
        mgr.take(ctx.execution_id, &ctx);
        assert!(mgr.rollback(ctx.execution_id, &ctx, 5).is_err());
    }

    #[test]
    fn clear_removes_all_history() {
        let mgr = SnapshotManager::new(4);
        let ctx = ExecutionContext::new(json!(null));
        mgr.take(ctx.execution_id, &ctx);
        mgr.clear(ctx.execution_id);
        assert!(mgr.is_empty(ctx.execution_id));
    }
}
