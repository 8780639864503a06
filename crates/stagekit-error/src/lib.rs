//! # Stagekit Error
//!
//! Centralized error taxonomy for the stagekit stage-graph execution
//! engine. Every crate in the workspace returns [`Result<T>`] and raises
//! [`StagekitError`], so a caller never has to match on a dozen
//! crate-local error types.
//!
//! ```
//! use stagekit_error::{StagekitError, ErrorKind};
//!
//! let err = StagekitError::validation_failed("load-user", "missing id");
//! assert_eq!(err.code(), "VALIDATION_FAILED");
//! assert!(!err.retryable);
//! assert!(matches!(err.kind, ErrorKind::ValidationFailed { .. }));
//! ```

mod error;
mod kind;

pub use error::{ErrorContext, StagekitError};
pub use kind::ErrorKind;

/// The `Result` alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, StagekitError>;

/// Common imports for crates consuming `stagekit-error`.
pub mod prelude {
    pub use crate::{ErrorContext, ErrorKind, Result, StagekitError};
}
