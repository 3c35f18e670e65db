// Stage implementations, registered in execution order by RequestPipeline::standard

pub mod check_access;
pub mod rate_limit;
pub mod require_session;

pub use check_access::CheckAccess;
pub use rate_limit::RateLimit;
pub use require_session::RequireSession;
