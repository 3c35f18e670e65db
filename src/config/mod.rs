use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

use crate::ratelimit::MAX_WINDOW_SECS;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub enable_rate_limiting: bool,
    /// Requests allowed per session inside one window
    pub rate_limit_quota: u64,
    pub rate_limit_window_secs: u64,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
    /// Secret the session cookie is signed with
    pub cookie_secret: String,
    pub session_cookie_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl StoreBackend {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Some(StoreBackend::Postgres),
            "memory" | "mem" => Some(StoreBackend::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Collection holding one record per workspace
    pub control_collection: String,
    /// Collection holding rate limit events
    pub ratelimit_collection: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = env::var("MWS_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("MWS_DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // API overrides
        if let Ok(v) = env::var("MWS_ENABLE_RATE_LIMITING") {
            self.api.enable_rate_limiting = v.parse().unwrap_or(self.api.enable_rate_limiting);
        }
        if let Ok(v) = env::var("MWS_RATE_LIMIT_QUOTA") {
            self.api.rate_limit_quota = v.parse().unwrap_or(self.api.rate_limit_quota);
        }
        if let Ok(v) = env::var("MWS_RATE_LIMIT_WINDOW_SECS") {
            self.api.rate_limit_window_secs = v.parse().unwrap_or(self.api.rate_limit_window_secs);
        }
        if let Ok(v) = env::var("MWS_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }

        // Security overrides
        if let Ok(v) = env::var("MWS_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("MWS_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        if let Ok(v) = env::var("MWS_COOKIE_SECRET") {
            self.security.cookie_secret = v;
        }
        if let Ok(v) = env::var("MWS_SESSION_COOKIE_NAME") {
            self.security.session_cookie_name = v;
        }

        // Store overrides
        if let Ok(v) = env::var("MWS_STORE_BACKEND") {
            self.store.backend = StoreBackend::parse(&v).unwrap_or(self.store.backend);
        }
        if let Ok(v) = env::var("MWS_CONTROL_COLLECTION") {
            self.store.control_collection = v;
        }
        if let Ok(v) = env::var("MWS_RATELIMIT_COLLECTION") {
            self.store.ratelimit_collection = v;
        }

        self
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.rate_limit_window_secs == 0 {
            return Err(ConfigError::Invalid("rate limit window must be at least one second".to_string()));
        }
        if self.api.rate_limit_window_secs > MAX_WINDOW_SECS {
            return Err(ConfigError::Invalid(format!(
                "rate limit window cannot exceed {} seconds",
                MAX_WINDOW_SECS
            )));
        }
        let store = &self.store;
        for name in [&store.control_collection, &store.ratelimit_collection] {
            if name.is_empty() || name.contains('.') || name.contains('$') {
                return Err(ConfigError::Invalid(format!("bad control collection name: {:?}", name)));
            }
        }
        if store.control_collection == store.ratelimit_collection {
            return Err(ConfigError::Invalid("control and rate limit collections must differ".to_string()));
        }
        if self.security.session_cookie_name.is_empty() {
            return Err(ConfigError::Invalid("session cookie name cannot be empty".to_string()));
        }
        Ok(())
    }

    fn base_store() -> StoreConfig {
        StoreConfig {
            backend: StoreBackend::Postgres,
            control_collection: "clients".to_string(),
            ratelimit_collection: "ratelimit".to_string(),
        }
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                url: "postgres://postgres@localhost:5432/mws".to_string(),
                max_connections: 10,
                connection_timeout: 30,
            },
            api: ApiConfig {
                enable_rate_limiting: true,
                rate_limit_quota: 500,
                rate_limit_window_secs: 60,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
                cookie_secret: "mws-development-cookie-secret".to_string(),
                session_cookie_name: "mws_session".to_string(),
            },
            store: Self::base_store(),
        }
    }

    pub fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                url: "postgres://postgres@localhost:5432/mws".to_string(),
                max_connections: 20,
                connection_timeout: 10,
            },
            api: ApiConfig {
                enable_rate_limiting: true,
                rate_limit_quota: 500,
                rate_limit_window_secs: 60,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
                cookie_secret: String::new(),
                session_cookie_name: "mws_session".to_string(),
            },
            store: Self::base_store(),
        }
    }

    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                url: "postgres://postgres@localhost:5432/mws".to_string(),
                max_connections: 50,
                connection_timeout: 5,
            },
            api: ApiConfig {
                enable_rate_limiting: true,
                rate_limit_quota: 500,
                rate_limit_window_secs: 60,
                max_request_size_bytes: 2 * 1024 * 1024, // 2MB
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://try.mongodb.org".to_string()],
                // Must come from MWS_COOKIE_SECRET
                cookie_secret: String::new(),
                session_cookie_name: "mws_session".to_string(),
            },
            store: Self::base_store(),
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
