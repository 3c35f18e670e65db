use axum::extract::{Path, State};
use axum_extra::extract::cookie::SignedCookieJar;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::document::{self, aggregate::pipeline_from_value};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::store::{FindQuery, UpdateOptions};
use crate::types::Operation;

use super::authorize;
use super::payload::{parse_args, RawPayload};

const UPDATE_ARGS_MISSING: &str = "update requires spec and document arguments";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FindArgs {
    pub query: Option<Value>,
    pub projection: Option<Value>,
    pub skip: u64,
    /// 0 means no limit
    pub limit: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RemoveArgs {
    pub constraint: Option<Value>,
    pub just_one: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateArgs {
    pub query: Option<Value>,
    pub update: Option<Value>,
    pub upsert: bool,
    pub multi: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CountArgs {
    pub query: Option<Value>,
    pub skip: u64,
    pub limit: u64,
}

fn filter_or_empty(filter: Option<Value>) -> Value {
    match filter {
        Some(Value::Null) | None => json!({}),
        Some(filter) => filter,
    }
}

/// GET /mws/:res_id/db/:collection/find
pub async fn find(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Path((res_id, collection)): Path<(String, String)>,
    payload: RawPayload,
) -> ApiResult<Value> {
    let auth = authorize(&state, &jar, res_id, Operation::Find).await?;
    let physical = auth.collections.physical(&collection)?;
    let args: FindArgs = payload.args()?;

    let query = FindQuery {
        filter: filter_or_empty(args.query),
        projection: args.projection,
        skip: args.skip,
        limit: args.limit,
    };
    let documents = state.store.find(&physical, &query).await?;
    Ok(ApiResponse::success(json!({ "result": documents })))
}

/// POST /mws/:res_id/db/:collection/insert
pub async fn insert(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Path((res_id, collection)): Path<(String, String)>,
    payload: RawPayload,
) -> ApiResult<()> {
    let auth = authorize(&state, &jar, res_id, Operation::Insert).await?;
    let physical = auth.collections.physical(&collection)?;

    let document = match payload.json()? {
        Value::Object(mut args) => args.remove("document"),
        _ => None,
    };
    let Some(document) = document else {
        return Err(ApiError::bad_request("'document' argument not found in the insert request."));
    };
    let documents = document::documents_from_value(document)?;

    state.store.insert(&physical, documents).await?;
    state.registry.note_collection(auth.res_id(), &collection).await?;
    Ok(ApiResponse::no_content())
}

/// DELETE /mws/:res_id/db/:collection/remove
pub async fn remove(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Path((res_id, collection)): Path<(String, String)>,
    payload: RawPayload,
) -> ApiResult<()> {
    let auth = authorize(&state, &jar, res_id, Operation::Remove).await?;
    let physical = auth.collections.physical(&collection)?;
    let args: RemoveArgs = payload.args()?;

    state
        .store
        .remove(&physical, &filter_or_empty(args.constraint), args.just_one)
        .await?;
    Ok(ApiResponse::no_content())
}

/// PUT /mws/:res_id/db/:collection/update
pub async fn update(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Path((res_id, collection)): Path<(String, String)>,
    payload: RawPayload,
) -> ApiResult<()> {
    let auth = authorize(&state, &jar, res_id, Operation::Update).await?;
    let physical = auth.collections.physical(&collection)?;
    let args: UpdateArgs = match payload.json()? {
        value @ Value::Object(_) => parse_args(value)?,
        _ => return Err(ApiError::bad_request(UPDATE_ARGS_MISSING)),
    };

    let (Some(query), Some(update)) = (args.query, args.update) else {
        return Err(ApiError::bad_request(UPDATE_ARGS_MISSING));
    };
    let options = UpdateOptions {
        upsert: args.upsert,
        multi: args.multi,
    };
    let outcome = state.store.update(&physical, &query, &update, options).await?;
    if outcome.upserted {
        state.registry.note_collection(auth.res_id(), &collection).await?;
    }
    Ok(ApiResponse::no_content())
}

/// GET /mws/:res_id/db/:collection/aggregate
pub async fn aggregate(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Path((res_id, collection)): Path<(String, String)>,
    payload: RawPayload,
) -> ApiResult<Value> {
    let auth = authorize(&state, &jar, res_id, Operation::Aggregate).await?;
    let physical = auth.collections.physical(&collection)?;
    let pipeline = pipeline_from_value(payload.json()?)?;

    let documents = state.store.aggregate(&physical, &pipeline).await?;
    Ok(ApiResponse::success(json!({ "result": documents })))
}

/// DELETE /mws/:res_id/db/:collection/drop
pub async fn drop_collection(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Path((res_id, collection)): Path<(String, String)>,
) -> ApiResult<()> {
    let auth = authorize(&state, &jar, res_id, Operation::DropCollection).await?;
    let physical = auth.collections.physical(&collection)?;

    state.store.drop_collection(&physical).await?;
    state.registry.forget_collection(auth.res_id(), &collection).await?;
    Ok(ApiResponse::no_content())
}

/// GET /mws/:res_id/db/:collection/count
pub async fn count(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Path((res_id, collection)): Path<(String, String)>,
    payload: RawPayload,
) -> ApiResult<Value> {
    let auth = authorize(&state, &jar, res_id, Operation::Count).await?;
    let physical = auth.collections.physical(&collection)?;
    let args: CountArgs = payload.args()?;

    let count = state
        .store
        .count(&physical, &filter_or_empty(args.query), args.skip, args.limit)
        .await?;
    Ok(ApiResponse::success(json!({ "count": count })))
}
