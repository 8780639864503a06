//! `audit`: emits structured audit records with an optional user
//! identity resolved from the context.

use std::sync::Arc;

use async_trait::async_trait;

use stagekit_core::context::ExecutionContext;
use stagekit_core::middleware::Middleware;
use stagekit_core::result::{PipelineResult, StageResult};
use stagekit_error::StagekitError;

/// Resolves a caller identity from the context, e.g. by reading a
/// `shared` key populated by an authentication stage.
pub type IdentityResolver = Arc<dyn Fn(&ExecutionContext) -> Option<String> + Send + Sync>;

/// Emits one `tracing` event per stage completion and one per pipeline
/// completion, tagged with the resolved identity when available.
pub struct AuditMiddleware {
    identity: Option<IdentityResolver>,
}

impl AuditMiddleware {
    /// Build an audit middleware with no identity resolution.
    #[must_use]
    pub fn new() -> Self {
        Self { identity: None }
    }

    /// Resolve a user identity for each audit record.
    #[must_use]
    pub fn with_identity_resolver(mut self, resolver: IdentityResolver) -> Self {
        self.identity = Some(resolver);
        self
    }

    fn identity_of(&self, ctx: &ExecutionContext) -> String {
        self.identity
            .as_ref()
            .and_then(|resolve| resolve(ctx))
            .unwrap_or_else(|| "anonymous".to_string())
    }
}

impl Default for AuditMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for AuditMiddleware {
    fn name(&self) -> &str {
        "audit"
    }

    async fn on_stage_complete(
        &self,
        ctx: &ExecutionContext,
        stage: &str,
        result: &StageResult,
    ) -> Result<(), StagekitError> {
        tracing::info!(
            target: "audit",
            execution_id = %ctx.execution_id,
            identity = %self.identity_of(ctx),
            stage,
            success = result.success,
            "audit: stage record"
        );
        Ok(())
    }

    async fn on_pipeline_complete(&self, result: &PipelineResult) -> Result<(), StagekitError> {
        tracing::info!(
            target: "audit",
            execution_id = %result.context.execution_id,
            identity = %self.identity_of(&result.context),
            success = result.success,
            "audit: pipeline record"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc as StdArc;

    #[tokio::test]
    async fn resolves_identity_from_shared_state() {
        let mw = AuditMiddleware::new().with_identity_resolver(StdArc::new(|ctx: &ExecutionContext| {
            ctx.get_shared("user_id").and_then(|v| v.as_str().map(str::to_string))
        }));
        let ctx = ExecutionContext::new(json!(null));
        ctx.set_shared("user_id", json!("alice"));
        assert_eq!(mw.identity_of(&ctx), "alice");
    }

    #[tokio::test]
    async fn defaults_to_anonymous() {
        let mw = AuditMiddleware::new();
        let ctx = ExecutionContext::new(json!(null));
        assert_eq!(mw.identity_of(&ctx), "anonymous");
    }
}
