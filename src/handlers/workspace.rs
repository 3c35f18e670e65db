use axum::extract::{Path, State};
use axum_extra::extract::cookie::SignedCookieJar;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::namespace::ResId;
use crate::session;
use crate::state::AppState;
use crate::types::Operation;

use super::authorize;

#[derive(Debug, Serialize)]
pub struct WorkspaceCreated {
    pub res_id: ResId,
    pub is_new: bool,
}

/// POST /mws/ - Create (or return) the workspace of the calling session
pub async fn create(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> Result<(SignedCookieJar, ApiResponse<WorkspaceCreated>), ApiError> {
    let session_id = session::session_id(&jar, state.cookie_name()).unwrap_or_else(session::new_session_id);
    let (res_id, is_new) = state.registry.create_or_get(&session_id).await?;
    if is_new {
        info!(res_id = %res_id, "New workspace");
    }
    let jar = session::bind(jar, state.cookie_name(), &session_id);
    Ok((jar, ApiResponse::success(WorkspaceCreated { res_id, is_new })))
}

/// POST /mws/:res_id/keep-alive - Refresh the workspace activity timestamp
pub async fn keep_alive(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Path(res_id): Path<String>,
) -> ApiResult<()> {
    let auth = authorize(&state, &jar, res_id, Operation::KeepAlive).await?;
    state.registry.touch(&auth.session_id, auth.res_id()).await?;
    Ok(ApiResponse::no_content())
}

/// GET /mws/:res_id/db/getCollectionNames - Logical collection names of the workspace
pub async fn collection_names(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Path(res_id): Path<String>,
) -> ApiResult<serde_json::Value> {
    let auth = authorize(&state, &jar, res_id, Operation::ListCollections).await?;
    let names = auth.collections.list(state.store.as_ref()).await?;
    Ok(ApiResponse::success(json!({ "result": names })))
}

/// DELETE /mws/:res_id/db - Drop every collection of the workspace
pub async fn drop_all(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Path(res_id): Path<String>,
) -> ApiResult<()> {
    let auth = authorize(&state, &jar, res_id, Operation::DropAll).await?;
    state.registry.drop_resource(auth.res_id()).await?;
    Ok(ApiResponse::no_content())
}
