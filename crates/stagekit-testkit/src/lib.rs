//! # Stagekit Testkit
//!
//! Test support for pipelines built on `stagekit-engine`: scripted and
//! spying stage doubles ([`mock`]), a thin pipeline runner
//! that records execution history and supports timeouts
//! ([`runner`]), fluent assertions over a `PipelineResult`
//! ([`assert`]), and call-recording wrappers around the checkpoint and
//! dispatch subsystems' in-memory reference implementations
//! ([`doubles`]).
//!
//! None of this crate is required to use stagekit; it exists purely to
//! make testing pipelines built with it pleasant.

pub mod assert;
pub mod doubles;
pub mod mock;
pub mod runner;

pub use assert::{assert_that, PipelineResultAssert};
pub use doubles::{recording_storage, QueueCall, RecordingQueue, RecordingStorageBackend, StorageCall};
pub use mock::{MockBehavior, MockStage, SpyCall, SpyStage};
pub use runner::{TestPipelineRunner, TimedOutcome};
