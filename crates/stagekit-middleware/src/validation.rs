//! `validation`: pre-validates pipeline input and post-validates output.

use std::sync::Arc;

use async_trait::async_trait;

use stagekit_core::context::ExecutionContext;
use stagekit_core::middleware::Middleware;
use stagekit_core::result::PipelineResult;
use stagekit_core::value::CtxValue;
use stagekit_error::StagekitError;

/// A predicate over a context value, paired with a rejection reason.
pub type Validator = Arc<dyn Fn(&CtxValue) -> Result<(), String> + Send + Sync>;

/// Rejects a pipeline before any stage runs if `input` fails
/// `validate_input`, and logs (without aborting — the pipeline has
/// already finished) if `output` fails `validate_output`.
pub struct ValidationMiddleware {
    validate_input: Option<Validator>,
    validate_output: Option<Validator>,
}

impl ValidationMiddleware {
    /// Build a validation middleware with no checks configured.
    #[must_use]
    pub fn new() -> Self {
        Self {
            validate_input: None,
            validate_output: None,
        }
    }

    /// Validate the pipeline's input before any stage runs.
    #[must_use]
    pub fn with_input_validator(mut self, validator: Validator) -> Self {
        self.validate_input = Some(validator);
        self
    }

    /// Validate the pipeline's final output after it completes.
    #[must_use]
    pub fn with_output_validator(mut self, validator: Validator) -> Self {
        self.validate_output = Some(validator);
        self
    }
}

impl Default for ValidationMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for ValidationMiddleware {
    fn name(&self) -> &str {
        "validation"
    }

    async fn on_pipeline_start(&self, ctx: &ExecutionContext) -> Result<(), StagekitError> {
        if let Some(validate) = &self.validate_input {
            if let Err(reason) = validate(&ctx.input) {
                return Err(StagekitError::validation_failed("<pipeline input>", reason));
            }
        }
        Ok(())
    }

    async fn on_pipeline_complete(&self, result: &PipelineResult) -> Result<(), StagekitError> {
        if let Some(validate) = &self.validate_output {
            if let Some(output) = &result.output {
                if let Err(reason) = validate(output) {
                    tracing::warn!(
                        execution_id = %result.context.execution_id,
                        reason,
                        "pipeline output failed post-validation"
                    );
                }
            }
        }
        Ok(())
    }
}
