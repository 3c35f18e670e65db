use async_trait::async_trait;

use crate::error::ApiError;
use crate::pipeline::{RequestContext, Stage};
use crate::types::Operation;

/// Rejects requests without a session cookie. Workspace creation mints one instead.
pub struct RequireSession;

#[async_trait]
impl Stage for RequireSession {
    fn name(&self) -> &'static str {
        "require_session"
    }

    fn applies_to(&self, operation: Operation) -> bool {
        operation.requires_resource()
    }

    async fn execute(&self, ctx: &mut RequestContext) -> Result<(), ApiError> {
        ctx.require_session()?;
        Ok(())
    }
}
