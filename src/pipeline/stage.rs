use async_trait::async_trait;

use crate::error::ApiError;
use crate::pipeline::context::RequestContext;
use crate::types::Operation;

/// One check in the request pipeline.
///
/// Returning `Ok(())` hands the request to the next stage; an error ends the
/// request with that error.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stage name for logging and debugging
    fn name(&self) -> &'static str;

    /// Check if stage applies to this operation
    fn applies_to(&self, operation: Operation) -> bool;

    async fn execute(&self, ctx: &mut RequestContext) -> Result<(), ApiError>;
}

pub type StageBox = Box<dyn Stage>;
