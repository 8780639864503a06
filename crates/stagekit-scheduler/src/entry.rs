//! `ScheduleEntry`: a pipeline registered against a trigger, plus its
//! execution history.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stagekit_core::value::CtxValue;
use stagekit_error::StagekitError;
use stagekit_runtime::BackoffPolicy;

use crate::cron::CronSchedule;

/// When a schedule fires.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Fires whenever the cron expression matches the current minute.
    Cron(CronSchedule),
    /// Fires every `period`, starting `period` after registration.
    Interval(Duration),
    /// Fires exactly once, `delay` after registration.
    Delay(Duration),
}

/// Per-schedule retry policy: `max_retries` attempts with exponential
/// backoff capped at 30s, honoring `timeout` per attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Number of retries after the initial attempt.
    pub max_retries: u32,
    /// Per-attempt timeout.
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            timeout: None,
        }
    }
}

impl RetryPolicy {
    /// The backoff policy this crate uses for retries: exponential, capped at
    /// 30 seconds, base delay 1 second.
    #[must_use]
    pub fn backoff() -> BackoffPolicy {
        BackoffPolicy::exponential_capped(Duration::from_secs(1), Duration::from_secs(30))
    }
}

/// The outcome of one scheduled execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionOutcome {
    /// The pipeline ran and succeeded.
    Succeeded,
    /// The pipeline ran and failed, or a dependency precondition failed.
    Failed,
}

/// One recorded run of a scheduled entry.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    /// Unique id for this execution attempt.
    pub id: Uuid,
    /// When it was enqueued.
    pub scheduled_at: DateTime<Utc>,
    /// When it finished (success, failure, or dependency rejection).
    pub finished_at: DateTime<Utc>,
    /// The outcome.
    pub outcome: ExecutionOutcome,
    /// Number of attempts made (1 + retries actually consumed).
    pub attempts: u32,
    /// The error, if the final attempt failed.
    pub error: Option<StagekitError>,
}

/// A pipeline registered to run on a trigger, optionally gated by other
/// schedules' successful completion.
pub struct ScheduleEntry {
    /// Unique id, also the dependency graph node key.
    pub id: String,
    /// Name of the pipeline to run (looked up in the scheduler's
    /// pipeline registry at execution time).
    pub pipeline: String,
    /// When this entry fires.
    pub trigger: Trigger,
    /// Input passed to `Pipeline::execute`.
    pub input: CtxValue,
    /// Whether ticks act on this entry at all.
    pub enabled: bool,
    /// Schedule ids that must have at least one successful completion
    /// before this entry is allowed to execute.
    pub depends_on: Vec<String>,
    /// Retry policy for this entry's executions.
    pub retry_policy: RetryPolicy,
    /// Execution history, newest first, retained per the scheduler's
    /// configured retention policy.
    pub history: Vec<ExecutionRecord>,
    /// When this entry was last evaluated by a tick, to avoid firing
    /// twice within the same matching minute.
    pub last_fired_minute: Option<DateTime<Utc>>,
    /// When this one-shot/interval entry was registered, the reference
    /// point `Interval`/`Delay` triggers count from.
    pub registered_at: DateTime<Utc>,
    /// For `Interval`/`Delay` triggers, the next instant this entry is
    /// due. Advanced by `interval` after each `Interval` fire; cleared
    /// (entry disabled) after a `Delay` fires once.
    pub next_due: Option<DateTime<Utc>>,
}

impl ScheduleEntry {
    /// Whether this entry has at least one successful completion
    /// recorded, used to satisfy another entry's `depends_on`.
    #[must_use]
    pub fn has_succeeded_once(&self) -> bool {
        self.history
            .iter()
            .any(|r| r.outcome == ExecutionOutcome::Succeeded)
    }
}
