//! Event shapes emitted by the orchestrator as it drives a pipeline.
//!
//! The source system used an ad-hoc event emitter with callback lists;
//! per the design note on event subscribers, this crate only defines the
//! event *shape* here. The channel-based fan-out itself lives in
//! `stagekit-engine` (paired with `tokio::sync::broadcast`), since only
//! the orchestrator knows when to emit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stagekit_error::StagekitError;

use crate::value::CtxValue;

/// The kind of lifecycle event the orchestrator emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// A pipeline execution began.
    PipelineStart,
    /// A pipeline execution finished (success or failure).
    PipelineComplete,
    /// A stage began executing.
    StageStart,
    /// A stage finished executing (success or failure).
    StageComplete,
    /// A stage failed.
    StageError,
    /// A middleware-originated event, e.g. a circuit breaker transition.
    MiddlewareEvent,
}

/// One event emitted during a pipeline execution.
///
/// Ordered with respect to the emitting execution: a single subscriber
/// sees events for one `execution_id` in the order they occurred.
/// Ordering across different executions, or across components, is not
/// guaranteed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// The kind of event.
    pub kind: EventKind,
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
    /// The execution this event belongs to.
    pub execution_id: uuid::Uuid,
    /// The stage this event concerns, for stage-scoped event kinds.
    pub stage_name: Option<String>,
    /// Free-form payload, e.g. the stage's output on `StageComplete`.
    pub data: Option<CtxValue>,
    /// The error, for `StageError` and failed `PipelineComplete` events.
    pub error: Option<StagekitError>,
}

impl Event {
    /// Construct a bare event of the given kind for an execution.
    #[must_use]
    pub fn new(kind: EventKind, execution_id: uuid::Uuid) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            execution_id,
            stage_name: None,
            data: None,
            error: None,
        }
    }

    /// Attach a stage name.
    #[must_use]
    pub fn with_stage(mut self, stage_name: impl Into<String>) -> Self {
        self.stage_name = Some(stage_name.into());
        self
    }

    /// Attach a data payload.
    #[must_use]
    pub fn with_data(mut self, data: CtxValue) -> Self {
        self.data = Some(data);
        self
    }

    /// Attach an error.
    #[must_use]
    pub fn with_error(mut self, error: StagekitError) -> Self {
        self.error = Some(error);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let id = uuid::Uuid::new_v4();
        let event = Event::new(EventKind::StageStart, id).with_stage("upper");
        assert_eq!(event.kind, EventKind::StageStart);
        assert_eq!(event.stage_name.as_deref(), Some("upper"));
        assert_eq!(event.execution_id, id);
    }
}
