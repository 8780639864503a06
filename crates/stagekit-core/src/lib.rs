//! # Stagekit Core
//!
//! The foundational contracts of the stagekit stage-graph execution
//! engine: [`ExecutionContext`](context::ExecutionContext), the
//! [`StageLike`](stage::StageLike) and [`Middleware`](middleware::Middleware)
//! traits, [`StageResult`](result::StageResult), and the event shapes the
//! orchestrator emits. Every other crate in the workspace depends on this
//! one; this crate depends on nothing workspace-internal but
//! `stagekit-error`.

pub mod context;
pub mod events;
pub mod middleware;
pub mod result;
pub mod stage;
pub mod value;

pub use context::{ExecutionContext, ExecutionMetadata, SharedContext};
pub use events::{Event, EventKind};
pub use middleware::Middleware;
pub use result::{PipelineMetrics, PipelineResult, StageMetadata, StageMetrics, StageResult};
pub use stage::StageLike;
pub use value::{canonical, CtxValue};

/// Common imports for crates and stage authors consuming `stagekit-core`.
pub mod prelude {
    pub use crate::{
        CtxValue, Event, EventKind, ExecutionContext, Middleware, PipelineMetrics,
        PipelineResult, SharedContext, StageLike, StageMetadata, StageMetrics, StageResult,
    };
    pub use stagekit_error::{ErrorKind, Result, StagekitError};
}
