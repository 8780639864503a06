//! # Stagekit Observability
//!
//! Monitoring surface for stagekit pipelines: per-execution
//! trace/timeline recording ([`trace`]), a hook-based event-stream
//! subscriber built on the orchestrator's broadcast bus ([`subscriber`]),
//! and background health checking for components a deployment wants
//! watched ([`health`]).
//!
//! This crate deliberately does not ship a bespoke metrics or logging
//! framework: it wires into `tracing` the way every other stagekit crate
//! does, and leaves exporting counters to whatever the embedding
//! application already uses.

pub mod health;
pub mod subscriber;
pub mod trace;

pub use health::{HealthCheckConfig, HealthCheckable, HealthChecker, HealthRecord, HealthState, HealthStatus};
pub use subscriber::{LoggingHook, MetricsHook, ObservabilityHook, ObservabilityHooks, Subscription};
pub use trace::{StageSpan, Trace, TraceMiddleware, TraceRecorder};
