use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET / - Service description
pub async fn root(State(state): State<AppState>) -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "name": "mws-api",
        "version": version,
        "description": "Session-scoped document store proxy",
        "store": state.store.backend(),
        "endpoints": {
            "create": "POST /mws/",
            "keep_alive": "POST /mws/:res_id/keep-alive",
            "find": "GET /mws/:res_id/db/:collection/find",
            "insert": "POST /mws/:res_id/db/:collection/insert",
            "remove": "DELETE /mws/:res_id/db/:collection/remove",
            "update": "PUT /mws/:res_id/db/:collection/update",
            "aggregate": "GET /mws/:res_id/db/:collection/aggregate",
            "count": "GET /mws/:res_id/db/:collection/count",
            "drop": "DELETE /mws/:res_id/db/:collection/drop",
            "collections": "GET /mws/:res_id/db/getCollectionNames",
            "drop_all": "DELETE /mws/:res_id/db",
        }
    }))
}

/// GET /health - Store ping
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.store.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "timestamp": now,
                "store": state.store.backend(),
            })),
        ),
        Err(e) => {
            tracing::error!("Store health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "timestamp": now,
                    "store": state.store.backend(),
                })),
            )
        }
    }
}
