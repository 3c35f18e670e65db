//! Session-scoped request pipeline.
//!
//! Every workspace request runs the registered stages in order before the
//! handler touches the store: session present, session owns the `res_id`,
//! session within its rate limit. The first failing stage ends the request.

pub mod context;
pub mod stage;
pub mod stages;

pub use context::RequestContext;
pub use stage::{Stage, StageBox};

use tracing::debug;

use crate::error::ApiError;
use crate::ratelimit::RateLimiter;
use crate::registry::ResourceRegistry;

pub struct RequestPipeline {
    stages: Vec<StageBox>,
}

impl RequestPipeline {
    /// Create an empty pipeline; stages are added with `register_stage`
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// `RequireSession -> CheckAccess -> RateLimit`, the last one only when enabled
    pub fn standard(registry: ResourceRegistry, limiter: RateLimiter, rate_limiting: bool) -> Self {
        let mut pipeline = Self::new();
        pipeline.register_stage(Box::new(stages::RequireSession));
        pipeline.register_stage(Box::new(stages::CheckAccess::new(registry)));
        if rate_limiting {
            pipeline.register_stage(Box::new(stages::RateLimit::new(limiter)));
        }
        pipeline
    }

    pub fn register_stage(&mut self, stage: StageBox) {
        debug!("Registered pipeline stage '{}'", stage.name());
        self.stages.push(stage);
    }

    pub async fn run(&self, ctx: &mut RequestContext) -> Result<(), ApiError> {
        let operation = ctx.operation;
        for stage in self.stages.iter().filter(|stage| stage.applies_to(operation)) {
            if let Err(err) = stage.execute(ctx).await {
                debug!(
                    stage = stage.name(),
                    operation = %ctx.operation,
                    status = err.status_code(),
                    "Pipeline stopped"
                );
                return Err(err);
            }
            ctx.stages_executed.push(stage.name());
        }
        debug!(
            operation = %ctx.operation,
            stages = ?ctx.stages_executed,
            elapsed_us = ctx.start_time.elapsed().as_micros() as u64,
            "Pipeline passed"
        );
        Ok(())
    }
}

impl Default for RequestPipeline {
    fn default() -> Self {
        Self::new()
    }
}
