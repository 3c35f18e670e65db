use async_trait::async_trait;

use crate::error::ApiError;
use crate::pipeline::{RequestContext, Stage};
use crate::ratelimit::RateLimiter;
use crate::types::Operation;

pub struct RateLimit {
    limiter: RateLimiter,
}

impl RateLimit {
    pub fn new(limiter: RateLimiter) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl Stage for RateLimit {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn applies_to(&self, operation: Operation) -> bool {
        operation.is_rate_limited()
    }

    async fn execute(&self, ctx: &mut RequestContext) -> Result<(), ApiError> {
        let Some(session_id) = ctx.session_id.as_deref() else {
            return Err(ApiError::unauthorized("Cannot rate limit without session_id cookie"));
        };
        if !self.limiter.check_and_record(session_id).await? {
            return Err(ApiError::too_many_requests("Rate limit exceeded"));
        }
        Ok(())
    }
}
