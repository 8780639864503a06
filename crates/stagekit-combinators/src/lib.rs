//! Composable stage combinators: `parallel`, `branch`, `loop_`,
//! `map`/`filter`/`reduce`, `dynamic`, `compose`, and `recover`.
//!
//! Every combinator here is itself a [`stagekit_core::stage::StageLike`],
//! so combinators nest freely: a `branch` arm can run a `parallel` batch,
//! a `loop_` body can be a `recover`-wrapped stage, and so on.

mod branch;
mod compose;
mod dynamic;
mod loop_;
mod map_filter_reduce;
mod parallel;
mod recover;
mod sequence;

pub use branch::{branch, BranchCondition, BranchStage, Predicate};
pub use compose::{compose, ComposeStage};
pub use dynamic::{dynamic, DynamicStage, StageFactory};
pub use loop_::{loop_, LoopPredicate, LoopStage};
pub use map_filter_reduce::{filter, map, reduce, FilterStage, ItemFn, ItemsFn, MapStage, ReduceStage};
pub use parallel::{parallel, ParallelOptions, ParallelStage};
pub use recover::{recover, FallbackRecovery, RecoverStage, RecoveryStrategy, RetryRecovery};
pub use sequence::run_stages;
