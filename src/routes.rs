use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::config::SecurityConfig;
use crate::handlers::{collection, status, workspace};
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let body_limit = state.config.api.max_request_size_bytes;
    let cors = cors_layer(&state.config.security);

    let router = Router::new()
        // Public
        .route("/", get(status::root))
        .route("/health", get(status::health))
        // Workspaces
        .merge(workspace_routes())
        .merge(collection_routes())
        .with_state(state)
        // Global middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http());

    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

fn workspace_routes() -> Router<AppState> {
    Router::new()
        .route("/mws", post(workspace::create))
        .route("/mws/", post(workspace::create))
        .route("/mws/:res_id/keep-alive", post(workspace::keep_alive))
        .route("/mws/:res_id/db/getCollectionNames", get(workspace::collection_names))
        .route("/mws/:res_id/db", delete(workspace::drop_all))
}

fn collection_routes() -> Router<AppState> {
    Router::new()
        .route("/mws/:res_id/db/:collection/find", get(collection::find))
        .route("/mws/:res_id/db/:collection/insert", post(collection::insert))
        .route("/mws/:res_id/db/:collection/remove", delete(collection::remove))
        .route("/mws/:res_id/db/:collection/update", put(collection::update))
        .route("/mws/:res_id/db/:collection/aggregate", get(collection::aggregate))
        .route("/mws/:res_id/db/:collection/drop", delete(collection::drop_collection))
        .route("/mws/:res_id/db/:collection/count", get(collection::count))
}

/// Credentialed CORS for the configured origins; `*` mirrors the caller's origin
fn cors_layer(security: &SecurityConfig) -> Option<CorsLayer> {
    if !security.enable_cors {
        return None;
    }
    let origin = if security.cors_origins.iter().any(|origin| origin == "*") {
        AllowOrigin::mirror_request()
    } else {
        let origins: Vec<HeaderValue> = security
            .cors_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin {:?}", origin);
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };
    Some(
        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE])
            .allow_credentials(true),
    )
}
