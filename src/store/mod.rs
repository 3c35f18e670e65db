//! Document store seam.
//!
//! Everything above this module talks to a `DocumentStore` handle passed in
//! explicitly. `PgDocumentStore` keeps documents as JSONB rows in PostgreSQL;
//! `MemoryStore` keeps them in process for tests and local development.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::document::{Document, QueryError};

pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;

/// Errors from a document store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store refused the request itself (bad filter, bad update, bad pipeline).
    /// The message is safe to hand back to the caller.
    #[error("{0}")]
    Operation(#[from] QueryError),

    /// Infrastructure failure; never shown to clients verbatim
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Parameters of a find request
#[derive(Debug, Clone, Default)]
pub struct FindQuery {
    pub filter: Value,
    pub projection: Option<Value>,
    pub skip: u64,
    /// 0 means no limit
    pub limit: u64,
}

impl FindQuery {
    pub fn new(filter: Value) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    pub upsert: bool,
    pub multi: bool,
}

/// What an update touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub upserted: bool,
}

/// Collection-oriented document store.
///
/// Collection names are physical names; callers are responsible for
/// namespacing. Documents come back in insertion order.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Human readable backend name for logs and the health endpoint
    fn backend(&self) -> &'static str;

    async fn find(&self, collection: &str, query: &FindQuery) -> Result<Vec<Document>, StoreError>;

    /// Count matches; `skip`/`limit` apply to the count when non-zero
    async fn count(&self, collection: &str, filter: &Value, skip: u64, limit: u64) -> Result<u64, StoreError>;

    /// Insert documents, assigning `_id` where missing. Creates the collection.
    async fn insert(&self, collection: &str, documents: Vec<Document>) -> Result<(), StoreError>;

    async fn update(
        &self,
        collection: &str,
        filter: &Value,
        update: &Value,
        options: UpdateOptions,
    ) -> Result<UpdateOutcome, StoreError>;

    /// Remove matches, or only the first one when `just_one`. Returns the number removed.
    async fn remove(&self, collection: &str, filter: &Value, just_one: bool) -> Result<u64, StoreError>;

    async fn aggregate(&self, collection: &str, pipeline: &[Value]) -> Result<Vec<Document>, StoreError>;

    /// Drop a collection. Returns whether it existed.
    async fn drop_collection(&self, collection: &str) -> Result<bool, StoreError>;

    /// All collection names, sorted
    async fn list_collections(&self) -> Result<Vec<String>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}
