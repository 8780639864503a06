//! The wrapper error type carried across every crate in the workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::kind::ErrorKind;

/// Structured, serializable context attached to an error: which
/// execution and stage it happened in, plus free-form key/value details.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorContext {
    /// The execution this error occurred under, if any.
    pub execution_id: Option<String>,
    /// The stage name in progress when this error occurred, if any.
    pub stage_name: Option<String>,
    /// Free-form additional detail, e.g. `{"attempt": "2"}`.
    pub details: std::collections::BTreeMap<String, String>,
}

impl ErrorContext {
    /// An empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an execution id.
    #[must_use]
    pub fn with_execution(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }

    /// Attach a stage name.
    #[must_use]
    pub fn with_stage(mut self, stage_name: impl Into<String>) -> Self {
        self.stage_name = Some(stage_name.into());
        self
    }

    /// Attach a free-form detail.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// The error type returned by every fallible operation in the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagekitError {
    /// The classified kind of failure.
    pub kind: ErrorKind,
    /// Whether a caller should retry this operation. Defaults to
    /// `kind.is_retryable_by_default()` but callers (the stage runtime,
    /// in particular) can override it once they know whether the
    /// failing stage itself opted into retries.
    pub retryable: bool,
    /// Rich context describing where this error happened.
    pub context: Option<ErrorContext>,
}

impl StagekitError {
    /// Wrap a kind with its default retry posture and no context.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        let retryable = kind.is_retryable_by_default();
        Self {
            kind,
            retryable,
            context: None,
        }
    }

    /// Attach context to this error.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Override the retry posture.
    #[must_use]
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Machine-readable code, e.g. `"TIMEOUT"`.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Shorthand constructor for [`ErrorKind::Cancelled`].
    #[must_use]
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled)
    }

    /// Shorthand constructor for [`ErrorKind::Timeout`].
    #[must_use]
    pub fn timeout(
        stage: impl Into<String>,
        elapsed: std::time::Duration,
        limit: std::time::Duration,
    ) -> Self {
        Self::new(ErrorKind::Timeout {
            stage: stage.into(),
            elapsed,
            limit,
        })
    }

    /// Shorthand constructor for [`ErrorKind::ValidationFailed`].
    #[must_use]
    pub fn validation_failed(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationFailed {
            stage: stage.into(),
            reason: reason.into(),
        })
    }

    /// Shorthand constructor for [`ErrorKind::StageFailed`].
    #[must_use]
    pub fn stage_failed(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::StageFailed {
            stage: stage.into(),
            reason: reason.into(),
        })
    }

    /// Shorthand constructor for [`ErrorKind::RateLimitExceeded`].
    #[must_use]
    pub fn rate_limit_exceeded(limit: u64, window: std::time::Duration) -> Self {
        Self::new(ErrorKind::RateLimitExceeded { limit, window })
    }

    /// Shorthand constructor for [`ErrorKind::CircuitOpen`].
    #[must_use]
    pub fn circuit_open(resource: impl Into<String>, reset_in: std::time::Duration) -> Self {
        Self::new(ErrorKind::CircuitOpen {
            resource: resource.into(),
            reset_in,
        })
    }

    /// Shorthand constructor for [`ErrorKind::DependencyMissing`].
    #[must_use]
    pub fn dependency_missing(schedule_id: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self::new(ErrorKind::DependencyMissing {
            schedule_id: schedule_id.into(),
            dependency: dependency.into(),
        })
    }

    /// Shorthand constructor for [`ErrorKind::CheckpointUnavailable`].
    #[must_use]
    pub fn checkpoint_unavailable(checkpoint_id: impl Into<String>) -> Self {
        Self::new(ErrorKind::CheckpointUnavailable {
            checkpoint_id: checkpoint_id.into(),
        })
    }

    /// Shorthand constructor for [`ErrorKind::QueueExhausted`].
    #[must_use]
    pub fn queue_exhausted(work_item_id: impl Into<String>, attempts: u32) -> Self {
        Self::new(ErrorKind::QueueExhausted {
            work_item_id: work_item_id.into(),
            attempts,
        })
    }

    /// Shorthand constructor for [`ErrorKind::Other`].
    #[must_use]
    pub fn other(message: impl Into<String>, retryable: bool) -> Self {
        Self::new(ErrorKind::Other {
            message: message.into(),
            retryable,
        })
    }
}

impl fmt::Display for StagekitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ctx) = &self.context {
            if let Some(stage) = &ctx.stage_name {
                write!(f, " (stage: {stage})")?;
            }
            if let Some(exec) = &ctx.execution_id {
                write!(f, " (execution: {exec})")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for StagekitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl From<ErrorKind> for StagekitError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<serde_json::Error> for StagekitError {
    fn from(err: serde_json::Error) -> Self {
        Self::other(format!("serialization failed: {err}"), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_retryable_follows_kind() {
        let err = StagekitError::cancelled();
        assert!(!err.retryable);

        let err = StagekitError::timeout(
            "fetch",
            std::time::Duration::from_millis(10),
            std::time::Duration::from_millis(5),
        );
        assert!(err.retryable);
    }

    #[test]
    fn override_retryable() {
        let err = StagekitError::timeout(
            "fetch",
            std::time::Duration::from_millis(10),
            std::time::Duration::from_millis(5),
        )
        .with_retryable(false);
        assert!(!err.retryable);
    }

    #[test]
    fn display_includes_context() {
        let err = StagekitError::stage_failed("upper", "boom")
            .with_context(ErrorContext::new().with_stage("upper").with_execution("abc"));
        let rendered = err.to_string();
        assert!(rendered.contains("upper"));
        assert!(rendered.contains("abc"));
    }

    #[test]
    fn json_roundtrip() {
        let err = StagekitError::stage_failed("upper", "boom");
        let json = serde_json::to_string(&err).unwrap();
        let back: StagekitError = serde_json::from_str(&json).unwrap();
        assert_eq!(back.code(), "STAGE_FAILED");
    }
}
