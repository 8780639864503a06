//! The `Middleware` contract: optional cross-cutting hooks.
//!
//! Modeled as a fixed interface of optional async methods, each
//! defaulting to a no-op, rather than the single string-dispatched
//! callback the source system used (see the design note on variadic
//! hooks). Hooks are invoked in registration order by the orchestrator;
//! all hooks for stage *k* complete before stage *k+1* begins.

use async_trait::async_trait;

use stagekit_error::StagekitError;

use crate::context::ExecutionContext;
use crate::result::{PipelineResult, StageResult};

/// A cross-cutting hook registered on a pipeline.
///
/// Most hook errors are logged and swallowed — they must not abort a
/// running pipeline. The exception is `on_pipeline_start`: middleware
/// that enforces a pre-condition (`rateLimit`, `circuitBreaker`,
/// `validation`) signals "reject before any stage runs" by returning
/// `Err` from it, and the orchestrator propagates that error as the
/// pipeline's result without invoking any stage.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Unique name, used in event payloads and diagnostics.
    fn name(&self) -> &str;

    /// Called once before the first stage, in registration order. An
    /// `Err` here aborts the pipeline before any stage executes.
    async fn on_pipeline_start(&self, _ctx: &ExecutionContext) -> Result<(), StagekitError> {
        Ok(())
    }

    /// Called before each stage executes. Errors are logged and
    /// swallowed.
    async fn on_stage_start(
        &self,
        _ctx: &ExecutionContext,
        _stage: &str,
    ) -> Result<(), StagekitError> {
        Ok(())
    }

    /// Called after each stage completes (success or failure). Errors
    /// are logged and swallowed.
    async fn on_stage_complete(
        &self,
        _ctx: &ExecutionContext,
        _stage: &str,
        _result: &StageResult,
    ) -> Result<(), StagekitError> {
        Ok(())
    }

    /// Called whenever a stage fails, in addition to
    /// `on_stage_complete`. Errors are logged and swallowed.
    async fn on_error(
        &self,
        _ctx: &ExecutionContext,
        _stage: &str,
        _error: &StagekitError,
    ) -> Result<(), StagekitError> {
        Ok(())
    }

    /// Called once after the pipeline finishes, in registration order.
    /// Errors are logged and swallowed.
    async fn on_pipeline_complete(&self, _result: &PipelineResult) -> Result<(), StagekitError> {
        Ok(())
    }
}
