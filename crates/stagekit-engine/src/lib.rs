//! # Stagekit Engine
//!
//! The pipeline orchestrator: sequences stages declared via
//! [`PipelineBuilder`], dispatches [`Middleware`](stagekit_core::middleware::Middleware)
//! hooks around each stage and around the whole execution, consults the
//! pipeline-level result cache, and emits lifecycle events.

pub mod builder;
pub mod cache_key;
pub mod events;
pub mod options;
pub mod pipeline;

pub use builder::PipelineBuilder;
pub use cache_key::{cache_key, CachedResult};
pub use events::EventBus;
pub use options::PipelineOptions;
pub use pipeline::Pipeline;
