use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
    http::Method,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::ApiError;

/// JSON arguments of a workspace request, not yet parsed.
///
/// GET requests carry the JSON text as the first key of the query string;
/// every other method carries it as the body. Parsing is deferred so the
/// session checks run before a malformed payload is reported.
#[derive(Debug, Clone)]
pub enum RawPayload {
    Query(Option<String>),
    Body(Bytes),
}

#[async_trait]
impl<S: Send + Sync> FromRequest<S> for RawPayload {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if req.method() == Method::GET {
            return Ok(RawPayload::Query(req.uri().query().map(str::to_string)));
        }
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request_with_detail("Could not read request body", e.body_text()))?;
        Ok(RawPayload::Body(body))
    }
}

impl RawPayload {
    /// The payload as JSON; an absent payload is `{}`
    pub fn json(&self) -> Result<Value, ApiError> {
        let text = match self {
            RawPayload::Query(query) => query.as_deref().and_then(json_text_from_query),
            RawPayload::Body(body) if body.iter().all(u8::is_ascii_whitespace) => None,
            RawPayload::Body(body) => Some(String::from_utf8_lossy(body).into_owned()),
        };
        match text {
            None => Ok(Value::Object(Map::new())),
            Some(text) => serde_json::from_str(&text)
                .map_err(|e| ApiError::bad_request_with_detail("Request payload is not valid JSON", e.to_string())),
        }
    }

    /// The payload decoded into typed arguments; a JSON `null` counts as no arguments
    pub fn args<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        match self.json()? {
            Value::Null => parse_args(Value::Object(Map::new())),
            value => parse_args(value),
        }
    }
}

pub fn parse_args<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value)
        .map_err(|e| ApiError::bad_request_with_detail("Invalid request arguments", e.to_string()))
}

/// The first form-decoded pair of the query string, rejoined when the JSON text held a `=`
fn json_text_from_query(query: &str) -> Option<String> {
    let (key, value) = url::form_urlencoded::parse(query.as_bytes()).next()?;
    let text = if value.is_empty() {
        key.into_owned()
    } else {
        format!("{}={}", key, value)
    };
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}
