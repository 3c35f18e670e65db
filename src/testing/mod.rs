use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use crate::config::{AppConfig, StoreBackend};
use crate::routes;
use crate::state::AppState;
use crate::store::MemoryStore;

/// In-process application backed by a fresh in-memory store
pub struct TestContext {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    router: Router,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(Self::test_config())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(store.clone(), config);
        let router = routes::app(state.clone());
        Self { state, store, router }
    }

    pub fn test_config() -> AppConfig {
        let mut config = AppConfig::development();
        config.store.backend = StoreBackend::Memory;
        config.security.cookie_secret = "test-cookie-secret".to_string();
        config
    }

    /// A browser with its own cookie jar
    pub fn client(&self) -> TestClient {
        TestClient {
            router: self.router.clone(),
            cookie: None,
        }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    /// `Value::Null` for an empty body
    pub body: Value,
}

impl TestResponse {
    pub fn reason(&self) -> &str {
        self.body["reason"].as_str().unwrap_or_default()
    }
}

pub struct TestClient {
    router: Router,
    cookie: Option<String>,
}

impl TestClient {
    /// Send a request the way the browser shell does: JSON in the query string
    /// for GET, JSON body otherwise. Keeps the session cookie between calls.
    pub async fn request(&mut self, method: Method, uri: &str, payload: Option<Value>) -> TestResponse {
        let mut uri = uri.to_string();
        let mut body = Body::empty();
        if let Some(payload) = payload {
            let text = payload.to_string();
            if method == Method::GET {
                let encoded: String = url::form_urlencoded::byte_serialize(text.as_bytes()).collect();
                uri = format!("{}?{}", uri, encoded);
            } else {
                body = Body::from(text);
            }
        }

        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = builder.body(body).unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        if let Some(set_cookie) = response.headers().get(header::SET_COOKIE) {
            let pair = set_cookie.to_str().unwrap().split(';').next().unwrap().to_string();
            self.cookie = Some(pair);
        }

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        TestResponse { status, body }
    }

    pub async fn get(&mut self, uri: &str, payload: Value) -> TestResponse {
        self.request(Method::GET, uri, Some(payload)).await
    }

    pub async fn post(&mut self, uri: &str, payload: Value) -> TestResponse {
        self.request(Method::POST, uri, Some(payload)).await
    }

    pub async fn put(&mut self, uri: &str, payload: Value) -> TestResponse {
        self.request(Method::PUT, uri, Some(payload)).await
    }

    pub async fn delete(&mut self, uri: &str, payload: Option<Value>) -> TestResponse {
        self.request(Method::DELETE, uri, payload).await
    }

    /// POST /mws/ and return the res_id
    pub async fn create_workspace(&mut self) -> String {
        let response = self.request(Method::POST, "/mws/", None).await;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
        response.body["res_id"].as_str().unwrap().to_string()
    }

    pub fn forget_cookie(&mut self) {
        self.cookie = None;
    }
}
