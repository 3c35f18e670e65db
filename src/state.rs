use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;

use crate::config::AppConfig;
use crate::pipeline::RequestPipeline;
use crate::ratelimit::RateLimiter;
use crate::registry::ResourceRegistry;
use crate::session;
use crate::store::DocumentStore;

/// Shared handles every handler needs. The store is only reachable through here.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub registry: ResourceRegistry,
    pub pipeline: Arc<RequestPipeline>,
    pub cookie_key: Key,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, config: AppConfig) -> Self {
        let registry = ResourceRegistry::new(store.clone(), config.store.control_collection.clone());
        let limiter = RateLimiter::new(
            store.clone(),
            config.store.ratelimit_collection.clone(),
            config.api.rate_limit_quota,
            config.api.rate_limit_window_secs,
        );
        let pipeline = RequestPipeline::standard(registry.clone(), limiter, config.api.enable_rate_limiting);
        let cookie_key = session::cookie_key(&config.security.cookie_secret);

        Self {
            store,
            registry,
            pipeline: Arc::new(pipeline),
            cookie_key,
            config: Arc::new(config),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.config.security.session_cookie_name
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}
