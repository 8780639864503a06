//! # Stagekit Scheduler
//!
//! Cron/interval/delayed triggers for pipelines, with inter-pipeline
//! dependencies: a pure [`cron::CronSchedule`] parser, an
//! acyclic [`graph::DependencyGraph`], the tick-driven
//! [`scheduler::PipelineScheduler`] that ties them to
//! [`stagekit_engine::Pipeline`] executions, and the two standalone
//! one-shot/recurring callback runners, [`delayed::DelayedExecutor`] and
//! [`recurring::RecurringExecutor`].

pub mod cron;
pub mod delayed;
pub mod entry;
pub mod events;
pub mod graph;
pub mod recurring;
pub mod scheduler;

pub use cron::CronSchedule;
pub use delayed::DelayedExecutor;
pub use entry::{ExecutionOutcome, ExecutionRecord, RetryPolicy, ScheduleEntry, Trigger};
pub use events::{ScheduleEvent, ScheduleEventBus, ScheduleEventKind};
pub use graph::DependencyGraph;
pub use recurring::{RecurringEvent, RecurringExecutor};
pub use scheduler::{PipelineScheduler, DEFAULT_RETENTION, DEFAULT_TICK_INTERVAL};
