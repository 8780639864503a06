//! Scheduler lifecycle events: `{scheduled, started, retry, completed,
//! failed}`, fanned out the same way the orchestrator fans out pipeline
//! events, over `tokio::sync::broadcast`.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use stagekit_error::StagekitError;

const CAPACITY: usize = 256;

/// One lifecycle event for a scheduled execution.
#[derive(Debug, Clone)]
pub struct ScheduleEvent {
    /// The schedule this event concerns.
    pub schedule_id: String,
    /// The execution attempt, once one has been assigned.
    pub execution_id: Option<Uuid>,
    /// The kind of lifecycle transition.
    pub kind: ScheduleEventKind,
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
}

/// The kind of scheduler lifecycle transition.
#[derive(Debug, Clone)]
pub enum ScheduleEventKind {
    /// An execution was enqueued because the trigger fired.
    Scheduled,
    /// The execution began running against the pipeline.
    Started,
    /// An attempt failed and a retry was scheduled.
    Retry {
        /// 1-indexed attempt number that is about to run.
        attempt: u32,
    },
    /// The execution finished successfully.
    Completed,
    /// The execution exhausted its retries or was rejected outright
    /// (e.g. a missing dependency).
    Failed {
        /// The terminal error.
        error: StagekitError,
    },
}

impl ScheduleEvent {
    fn new(schedule_id: impl Into<String>, kind: ScheduleEventKind) -> Self {
        Self {
            schedule_id: schedule_id.into(),
            execution_id: None,
            kind,
            timestamp: Utc::now(),
        }
    }

    fn with_execution(mut self, execution_id: Uuid) -> Self {
        self.execution_id = Some(execution_id);
        self
    }
}

/// Broadcast bus scheduler subscribers observe.
#[derive(Clone)]
pub struct ScheduleEventBus {
    sender: broadcast::Sender<ScheduleEvent>,
}

impl Default for ScheduleEventBus {
    fn default() -> Self {
        let (sender, _rx) = broadcast::channel(CAPACITY);
        Self { sender }
    }
}

impl ScheduleEventBus {
    /// A fresh bus with no subscribers yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ScheduleEvent> {
        self.sender.subscribe()
    }

    pub(crate) fn scheduled(&self, schedule_id: &str) {
        self.publish(ScheduleEvent::new(schedule_id, ScheduleEventKind::Scheduled));
    }

    pub(crate) fn started(&self, schedule_id: &str, execution_id: Uuid) {
        self.publish(
            ScheduleEvent::new(schedule_id, ScheduleEventKind::Started).with_execution(execution_id),
        );
    }

    pub(crate) fn retry(&self, schedule_id: &str, execution_id: Uuid, attempt: u32) {
        self.publish(
            ScheduleEvent::new(schedule_id, ScheduleEventKind::Retry { attempt })
                .with_execution(execution_id),
        );
    }

    pub(crate) fn completed(&self, schedule_id: &str, execution_id: Uuid) {
        self.publish(
            ScheduleEvent::new(schedule_id, ScheduleEventKind::Completed).with_execution(execution_id),
        );
    }

    pub(crate) fn failed(&self, schedule_id: &str, execution_id: Uuid, error: StagekitError) {
        self.publish(
            ScheduleEvent::new(schedule_id, ScheduleEventKind::Failed { error })
                .with_execution(execution_id),
        );
    }

    fn publish(&self, event: ScheduleEvent) {
        let _ = self.sender.send(event);
    }
}
