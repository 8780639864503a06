//! The error taxonomy from the engine's error handling design.
//!
//! Every variant here corresponds to one row of the propagation table:
//! a cause, a retry posture, and (where relevant) the structured data a
//! caller needs to act on it.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The specific kind of failure raised anywhere in the engine.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The cancel handle was observed at a suspension point.
    #[error("execution cancelled")]
    Cancelled,

    /// A per-stage or pipeline-wide timer elapsed before completion.
    #[error("stage '{stage}' timed out after {elapsed:?} (limit {limit:?})")]
    Timeout {
        /// Name of the stage that was running.
        stage: String,
        /// How long the attempt actually ran before being cut off.
        elapsed: Duration,
        /// The configured timeout.
        limit: Duration,
    },

    /// `Stage::validate` returned `false`.
    #[error("validation failed for stage '{stage}': {reason}")]
    ValidationFailed {
        /// Name of the stage whose validation rejected the context.
        stage: String,
        /// Human-readable reason, if the validator supplied one.
        reason: String,
    },

    /// A stage returned `success: false` or its future resolved to an error.
    #[error("stage '{stage}' failed: {reason}")]
    StageFailed {
        /// Name of the failing stage.
        stage: String,
        /// Failure reason surfaced by the stage.
        reason: String,
    },

    /// The `rateLimit` middleware rejected the pipeline before any stage ran.
    #[error("rate limit exceeded: {limit} requests per {window:?}")]
    RateLimitExceeded {
        /// Configured limit.
        limit: u64,
        /// Sliding window over which the limit applies.
        window: Duration,
    },

    /// The `circuitBreaker` middleware is open.
    #[error("circuit breaker open for '{resource}', resets in {reset_in:?}")]
    CircuitOpen {
        /// Name of the protected resource/stage.
        resource: String,
        /// Remaining time before the breaker transitions to half-open.
        reset_in: Duration,
    },

    /// A scheduled execution's dependency never completed successfully.
    #[error("dependency '{dependency}' for schedule '{schedule_id}' never completed")]
    DependencyMissing {
        /// The schedule that was waiting.
        schedule_id: String,
        /// The dependency schedule id that is missing a success record.
        dependency: String,
    },

    /// `resume` was asked to load a checkpoint id that does not exist.
    #[error("checkpoint '{checkpoint_id}' is unavailable")]
    CheckpointUnavailable {
        /// The checkpoint id that could not be loaded.
        checkpoint_id: String,
    },

    /// A distributed work item exhausted its retry budget.
    #[error("work item '{work_item_id}' exhausted {attempts} attempts")]
    QueueExhausted {
        /// The work item id.
        work_item_id: String,
        /// How many attempts were made.
        attempts: u32,
    },

    /// Catch-all for errors surfaced across a crate boundary (I/O,
    /// serialization, a third-party client) that do not map onto one of
    /// the named kinds above.
    #[error("{message}")]
    Other {
        /// Description of the underlying failure.
        message: String,
        /// Whether the caller should consider retrying.
        retryable: bool,
    },
}

impl ErrorKind {
    /// Whether an error of this kind is, by default, worth retrying.
    ///
    /// This mirrors the propagation column of the error handling design:
    /// `Cancelled`, `ValidationFailed`, `RateLimitExceeded`,
    /// `DependencyMissing` and `CheckpointUnavailable` are always
    /// terminal; `Timeout` and `StageFailed` are retryable *if the stage
    /// itself is marked retryable* (the stage runtime, not this method,
    /// makes that call); `CircuitOpen` resets on its own schedule rather
    /// than being retried by the caller.
    #[must_use]
    pub fn is_retryable_by_default(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::StageFailed { .. })
    }

    /// A short, stable machine-readable code for this kind, suitable for
    /// metrics labels or API responses.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Cancelled => "CANCELLED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::ValidationFailed { .. } => "VALIDATION_FAILED",
            Self::StageFailed { .. } => "STAGE_FAILED",
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::CircuitOpen { .. } => "CIRCUIT_OPEN",
            Self::DependencyMissing { .. } => "DEPENDENCY_MISSING",
            Self::CheckpointUnavailable { .. } => "CHECKPOINT_UNAVAILABLE",
            Self::QueueExhausted { .. } => "QUEUE_EXHAUSTED",
            Self::Other { .. } => "OTHER",
        }
    }
}
