// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::document::QueryError;
use crate::namespace::NamespaceError;
use crate::store::StoreError;

/// Reason reported for both an unknown and a malformed `res_id`
pub const NO_ACCESS_REASON: &str = "Session error. User does not have access to res_id";

/// HTTP API error. Every variant renders as `{error, reason, detail}` with the
/// status code repeated in `error`.
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest { reason: String, detail: String },

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 429 Too Many Requests
    TooManyRequests(String),

    // 500 Internal Server Error
    EncodingFailure(String),
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest { .. } => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::TooManyRequests(_) => 429,
            ApiError::EncodingFailure(_) => 500,
            ApiError::Internal(_) => 500,
        }
    }

    /// Client-safe reason
    pub fn reason(&self) -> &str {
        match self {
            ApiError::BadRequest { reason, .. } => reason,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::TooManyRequests(msg) => msg,
            ApiError::EncodingFailure(msg) => msg,
            ApiError::Internal(msg) => msg,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            ApiError::BadRequest { detail, .. } => detail,
            _ => "",
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "error": self.status_code(),
            "reason": self.reason(),
            "detail": self.detail(),
        })
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(reason: impl Into<String>) -> Self {
        ApiError::BadRequest {
            reason: reason.into(),
            detail: String::new(),
        }
    }

    pub fn bad_request_with_detail(reason: impl Into<String>, detail: impl Into<String>) -> Self {
        ApiError::BadRequest {
            reason: reason.into(),
            detail: detail.into(),
        }
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        ApiError::Unauthorized(reason.into())
    }

    pub fn no_access() -> Self {
        ApiError::Forbidden(NO_ACCESS_REASON.to_string())
    }

    pub fn too_many_requests(reason: impl Into<String>) -> Self {
        ApiError::TooManyRequests(reason.into())
    }

    pub fn encoding_failure(reason: impl Into<String>) -> Self {
        ApiError::EncodingFailure(reason.into())
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        ApiError::Internal(reason.into())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            // The store refused the request; its diagnostic is meant for the caller
            StoreError::Operation(query_err) => ApiError::bad_request(query_err.to_string()),
            StoreError::Sqlx(sqlx_err) => {
                // Log the real error but return generic message
                tracing::error!("SQLx error: {}", sqlx_err);
                ApiError::internal("Database error occurred")
            }
            StoreError::Unavailable(msg) => {
                tracing::error!("Store unavailable: {}", msg);
                ApiError::internal("An error occurred while processing your request")
            }
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        StoreError::Operation(err).into()
    }
}

impl From<NamespaceError> for ApiError {
    fn from(err: NamespaceError) -> Self {
        match err {
            NamespaceError::InvalidResId(_) => ApiError::no_access(),
            NamespaceError::InvalidCollectionName(msg) => ApiError::bad_request_with_detail("Invalid collection name", msg),
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_repeats_status() {
        let err = ApiError::too_many_requests("Rate limit exceeded");
        assert_eq!(
            err.to_json(),
            json!({"error": 429, "reason": "Rate limit exceeded", "detail": ""})
        );
    }

    #[test]
    fn store_operation_errors_are_bad_requests() {
        let err: ApiError = StoreError::Operation(QueryError::UnknownStage("$foo".to_string())).into();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.reason(), "Unrecognized pipeline stage name: '$foo'");

        let err: ApiError = StoreError::Unavailable("pool closed".to_string()).into();
        assert_eq!(err.status_code(), 500);
        assert!(!err.reason().contains("pool closed"));
    }

    #[test]
    fn malformed_res_id_looks_like_missing_access() {
        let err: ApiError = NamespaceError::InvalidResId("x".to_string()).into();
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.reason(), NO_ACCESS_REASON);
    }
}
