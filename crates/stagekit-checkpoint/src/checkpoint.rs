//! `Checkpoint` records and the manager that creates and retains them.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stagekit_core::context::ExecutionContext;
use stagekit_core::value::CtxValue;
use stagekit_error::StagekitError;

use crate::storage::StorageBackend;

/// A serializable copy of the parts of an `ExecutionContext` a resumed
/// execution needs to continue from: the original `input`, and the
/// `state`/`shared`/`messages` accumulated so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnapshot {
    /// The value the caller originally passed to `execute`.
    pub input: CtxValue,
    /// Per-stage outputs recorded so far.
    pub state: HashMap<String, CtxValue>,
    /// Side-band coordination values.
    pub shared: HashMap<String, CtxValue>,
    /// The ordered message log.
    pub messages: Vec<CtxValue>,
}

impl ContextSnapshot {
    /// Capture a snapshot of `ctx` as it stands right now.
    #[must_use]
    pub fn capture(ctx: &ExecutionContext) -> Self {
        Self {
            input: ctx.input.clone(),
            state: ctx.state_snapshot(),
            shared: ctx.shared_snapshot(),
            messages: ctx.messages_snapshot(),
        }
    }
}

/// A durable snapshot marking which stages of an execution have
/// completed, persisted under `checkpoint-<execution_id>-<seq>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The storage key this checkpoint was persisted under; also its
    /// externally visible identifier (the persistence layout's
    /// `checkpoint-<executionId>-<monotonic-seq>` key).
    pub id: String,
    /// The execution this checkpoint belongs to.
    pub execution_id: Uuid,
    /// The pipeline that produced it, for diagnostics and `resume`.
    pub pipeline_name: String,
    /// When the checkpoint was taken.
    pub taken_at: DateTime<Utc>,
    /// The captured context.
    pub context_snapshot: ContextSnapshot,
    /// Stage names completed as of this checkpoint, in declared order.
    pub completed_stage_names: Vec<String>,
    /// The stage mid-execution at the moment of capture, if any.
    pub current_stage_name: Option<String>,
    /// Monotonic sequence number within the owning execution.
    pub seq: u64,
}

fn key_prefix(execution_id: Uuid) -> String {
    format!("checkpoint-{execution_id}-")
}

fn key_for(execution_id: Uuid, seq: u64) -> String {
    format!("{}{seq:010}", key_prefix(execution_id))
}

/// Creates and retains checkpoints for one or more executions against a
/// shared [`StorageBackend`].
pub struct CheckpointManager {
    storage: Arc<dyn StorageBackend>,
    max_checkpoints: usize,
}

impl CheckpointManager {
    /// Build a manager retaining at most `max_checkpoints` per
    /// execution, oldest evicted first.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>, max_checkpoints: usize) -> Self {
        Self {
            storage,
            max_checkpoints: max_checkpoints.max(1),
        }
    }

    /// Serialize the context and persist a new checkpoint, then enforce
    /// `max_checkpoints` by deleting the oldest entries beyond the
    /// limit (FIFO).
    pub async fn create(
        &self,
        execution_id: Uuid,
        pipeline_name: impl Into<String>,
        ctx: &ExecutionContext,
        completed_stage_names: Vec<String>,
        current_stage_name: Option<String>,
    ) -> Result<Checkpoint, StagekitError> {
        let existing = self.storage.list(&key_prefix(execution_id)).await;
        let seq = existing.len() as u64 + 1;
        let id = key_for(execution_id, seq);

        let checkpoint = Checkpoint {
            id: id.clone(),
            execution_id,
            pipeline_name: pipeline_name.into(),
            taken_at: Utc::now(),
            context_snapshot: ContextSnapshot::capture(ctx),
            completed_stage_names,
            current_stage_name,
            seq,
        };

        let bytes = serde_json::to_vec(&checkpoint)?;
        self.storage.put(&id, bytes).await;
        self.enforce_retention(execution_id).await;

        Ok(checkpoint)
    }

    async fn enforce_retention(&self, execution_id: Uuid) {
        let mut keys = self.storage.list(&key_prefix(execution_id)).await;
        keys.sort();
        if keys.len() > self.max_checkpoints {
            let excess = keys.len() - self.max_checkpoints;
            for key in &keys[..excess] {
                self.storage.delete(key).await;
            }
        }
    }

    /// Load a checkpoint by id, failing with
    /// [`StagekitError::checkpoint_unavailable`] if it does not exist
    /// or cannot be decoded.
    pub async fn load(&self, checkpoint_id: &str) -> Result<Checkpoint, StagekitError> {
        let bytes = self
            .storage
            .get(checkpoint_id)
            .await
            .ok_or_else(|| StagekitError::checkpoint_unavailable(checkpoint_id))?;
        serde_json::from_slice(&bytes)
            .map_err(|_| StagekitError::checkpoint_unavailable(checkpoint_id))
    }

    /// All checkpoints recorded for `execution_id`, oldest first.
    pub async fn list(&self, execution_id: Uuid) -> Vec<Checkpoint> {
        let mut keys = self.storage.list(&key_prefix(execution_id)).await;
        keys.sort();
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Ok(checkpoint) = self.load(&key).await {
                out.push(checkpoint);
            }
        }
        out
    }

    /// The most recently taken checkpoint for `execution_id`, if any.
    pub async fn latest(&self, execution_id: Uuid) -> Option<Checkpoint> {
        self.list(execution_id).await.into_iter().next_back()
    }
}
