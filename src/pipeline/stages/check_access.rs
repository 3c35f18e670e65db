use async_trait::async_trait;
use tracing::warn;

use crate::error::ApiError;
use crate::namespace::ResId;
use crate::pipeline::{RequestContext, Stage};
use crate::registry::ResourceRegistry;
use crate::types::Operation;

/// Resolves the `res_id` path segment and checks the session owns it
pub struct CheckAccess {
    registry: ResourceRegistry,
}

impl CheckAccess {
    pub fn new(registry: ResourceRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Stage for CheckAccess {
    fn name(&self) -> &'static str {
        "check_access"
    }

    fn applies_to(&self, operation: Operation) -> bool {
        operation.requires_resource()
    }

    async fn execute(&self, ctx: &mut RequestContext) -> Result<(), ApiError> {
        let session_id = ctx.require_session()?;
        let raw = ctx.raw_res_id.as_deref().unwrap_or_default();
        // A res_id that is not a UUID can never have been issued
        let res_id: ResId = raw.parse()?;

        if !self.registry.has_access(&res_id, session_id).await? {
            warn!(res_id = %res_id, operation = %ctx.operation, "Session does not own resource");
            return Err(ApiError::no_access());
        }
        ctx.res_id = Some(res_id);
        Ok(())
    }
}
