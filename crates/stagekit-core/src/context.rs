//! Runtime execution context shared by every stage in one pipeline run.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use stagekit_error::StagekitError;

use crate::value::CtxValue;

/// Bookkeeping about the pipeline's progress through its stage list.
///
/// `completed_stages` and `failed_stages` are disjoint and preserve
/// execution order; `current_stage` is set exactly while a stage is
/// mid-execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    /// When the pipeline execution began.
    pub start_time: Option<DateTime<Utc>>,
    /// The stage currently executing, if any.
    pub current_stage: Option<String>,
    /// Stage names that completed successfully, in declared order.
    pub completed_stages: Vec<String>,
    /// Stage names that failed, in declared order.
    pub failed_stages: Vec<String>,
    /// Free-form extension data, e.g. set by middleware.
    pub extensions: std::collections::BTreeMap<String, CtxValue>,
}

impl ExecutionMetadata {
    fn new() -> Self {
        Self {
            start_time: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Mark a stage as currently executing.
    pub fn enter_stage(&mut self, name: impl Into<String>) {
        self.current_stage = Some(name.into());
    }

    /// Record a stage's successful completion, asserting (in debug
    /// builds) that the name has not already been recorded as completed
    /// or failed — the disjointness invariant from the data model.
    pub fn mark_completed(&mut self, name: impl Into<String>) {
        let name = name.into();
        debug_assert!(
            !self.completed_stages.contains(&name) && !self.failed_stages.contains(&name),
            "stage '{name}' recorded twice"
        );
        self.completed_stages.push(name);
        self.current_stage = None;
    }

    /// Record a stage's failure, with the same disjointness assertion.
    pub fn mark_failed(&mut self, name: impl Into<String>) {
        let name = name.into();
        debug_assert!(
            !self.completed_stages.contains(&name) && !self.failed_stages.contains(&name),
            "stage '{name}' recorded twice"
        );
        self.failed_stages.push(name);
        self.current_stage = None;
    }
}

/// Per-invocation mutable scratch space shared by every stage in one
/// pipeline execution.
///
/// This type is intentionally not `Clone`: every stage sees the same
/// context through a shared reference, matching the single-context-per-
/// execution contract. Interior mutability (`DashMap`, `Mutex`,
/// `RwLock`) is used throughout so stages can be invoked through a
/// shared `&ExecutionContext` rather than `&mut`.
#[derive(Debug)]
pub struct ExecutionContext {
    /// Opaque unique identifier assigned at start, immutable thereafter.
    pub execution_id: Uuid,
    /// The value the caller passed to `execute`.
    pub input: CtxValue,
    /// Mapping from stage name to the value it produced, written only by
    /// the orchestrator after a stage succeeds.
    state: DashMap<String, CtxValue>,
    /// Opaque side-band coordination storage for domain stages.
    shared: DashMap<String, CtxValue>,
    /// Ordered, append-only records contributed by stages.
    messages: Mutex<Vec<CtxValue>>,
    /// Progress bookkeeping (`completed_stages`, `failed_stages`, ...).
    pub metadata: parking_lot::RwLock<ExecutionMetadata>,
    /// Cooperative cancellation handle, observed at suspension points.
    pub cancel: CancellationToken,
}

impl ExecutionContext {
    /// Construct a new context for a fresh execution.
    #[must_use]
    pub fn new(input: CtxValue) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            input,
            state: DashMap::new(),
            shared: DashMap::new(),
            messages: Mutex::new(Vec::new()),
            metadata: parking_lot::RwLock::new(ExecutionMetadata::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Construct a context with a caller-supplied cancel handle, e.g. a
    /// child token derived from a pipeline-wide timeout middleware.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Construct a context restoring a prior execution id and state map,
    /// used by the checkpoint subsystem's `resume`.
    #[must_use]
    pub fn restore(
        execution_id: Uuid,
        input: CtxValue,
        state: std::collections::HashMap<String, CtxValue>,
        shared: std::collections::HashMap<String, CtxValue>,
        messages: Vec<CtxValue>,
        completed_stages: Vec<String>,
    ) -> Self {
        let ctx = Self {
            execution_id,
            input,
            state: state.into_iter().collect(),
            shared: shared.into_iter().collect(),
            messages: Mutex::new(messages),
            metadata: parking_lot::RwLock::new(ExecutionMetadata::new()),
            cancel: CancellationToken::new(),
        };
        ctx.metadata.write().completed_stages = completed_stages;
        ctx
    }

    /// Set a stage's output in `state`. Single-writer-per-key by
    /// convention: only the orchestrator (or a combinator's merge step)
    /// should call this for a given stage's own name.
    pub fn set_state(&self, stage_name: impl Into<String>, value: CtxValue) {
        self.state.insert(stage_name.into(), value);
    }

    /// Read a stage's recorded output, if any.
    #[must_use]
    pub fn get_state(&self, stage_name: &str) -> Option<CtxValue> {
        self.state.get(stage_name).map(|v| v.value().clone())
    }

    /// Snapshot the entire `state` map, e.g. for checkpointing.
    #[must_use]
    pub fn state_snapshot(&self) -> std::collections::HashMap<String, CtxValue> {
        self.state
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Replace the entire `state` map, e.g. rolling back to a prior
    /// snapshot. Used by `SnapshotManager::rollback`.
    pub fn replace_state(&self, state: std::collections::HashMap<String, CtxValue>) {
        self.state.clear();
        for (k, v) in state {
            self.state.insert(k, v);
        }
    }

    /// Replace the entire `shared` map.
    pub fn replace_shared(&self, shared: std::collections::HashMap<String, CtxValue>) {
        self.shared.clear();
        for (k, v) in shared {
            self.shared.insert(k, v);
        }
    }

    /// Replace the entire ordered message log.
    pub fn replace_messages(&self, messages: Vec<CtxValue>) {
        *self.messages.lock() = messages;
    }

    /// Set a side-band coordination value.
    pub fn set_shared(&self, key: impl Into<String>, value: CtxValue) {
        self.shared.insert(key.into(), value);
    }

    /// Read a side-band coordination value.
    #[must_use]
    pub fn get_shared(&self, key: &str) -> Option<CtxValue> {
        self.shared.get(key).map(|v| v.value().clone())
    }

    /// Snapshot the entire `shared` map.
    #[must_use]
    pub fn shared_snapshot(&self) -> std::collections::HashMap<String, CtxValue> {
        self.shared
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Append a message record.
    pub fn push_message(&self, message: CtxValue) {
        self.messages.lock().push(message);
    }

    /// Snapshot the ordered message log.
    #[must_use]
    pub fn messages_snapshot(&self) -> Vec<CtxValue> {
        self.messages.lock().clone()
    }

    /// Check cooperative cancellation, returning the uniform
    /// [`StagekitError::cancelled`] failure if it has been signalled.
    pub fn check_cancelled(&self) -> Result<(), StagekitError> {
        if self.cancel.is_cancelled() {
            Err(StagekitError::cancelled())
        } else {
            Ok(())
        }
    }

    /// Most recently completed stage's output, or `None` before any
    /// stage has completed. Used by the orchestrator to compute the
    /// pipeline's final `output`.
    #[must_use]
    pub fn last_output(&self) -> Option<CtxValue> {
        let meta = self.metadata.read();
        meta.completed_stages
            .last()
            .and_then(|name| self.get_state(name))
    }
}

/// A shared handle to a context, the form every stage and middleware
/// method actually receives.
pub type SharedContext = Arc<ExecutionContext>;
