//! Mapping between a workspace's logical collection names and the physical
//! names they occupy in the shared store.
//!
//! A physical name is `"{res_id}.{logical}"` with the canonical hyphenated
//! UUID as prefix. The prefix contains no `.`, so splitting at the first `.`
//! recovers both halves, and names of different workspaces never collide.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::document::QueryError;
use crate::store::{DocumentStore, StoreError};

/// Longest logical collection name accepted, in bytes
pub const MAX_LOGICAL_NAME_BYTES: usize = 120;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NamespaceError {
    #[error("Invalid res_id: {0}")]
    InvalidResId(String),

    #[error("Invalid collection name: {0}")]
    InvalidCollectionName(String),
}

impl From<NamespaceError> for StoreError {
    fn from(err: NamespaceError) -> Self {
        StoreError::Operation(QueryError::BadQuery(err.to_string()))
    }
}

/// Resource id of a workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResId(Uuid);

impl ResId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    fn prefix(&self) -> String {
        format!("{}.", self)
    }
}

impl Default for ResId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for ResId {
    type Err = NamespaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(ResId)
            .map_err(|_| NamespaceError::InvalidResId(s.to_string()))
    }
}

impl From<Uuid> for ResId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

pub fn validate_logical_name(name: &str) -> Result<(), NamespaceError> {
    let reason = if name.is_empty() {
        "name cannot be empty"
    } else if name.len() > MAX_LOGICAL_NAME_BYTES {
        "name is too long"
    } else if name.contains('$') {
        "name cannot contain '$'"
    } else if name.contains('\0') {
        "name cannot contain NUL"
    } else {
        return Ok(());
    };
    Err(NamespaceError::InvalidCollectionName(format!("{:?}: {}", name, reason)))
}

/// `"{res_id}.{logical}"`
pub fn physical_name(res_id: &ResId, logical: &str) -> Result<String, NamespaceError> {
    validate_logical_name(logical)?;
    Ok(format!("{}.{}", res_id, logical))
}

/// Logical half of a physical name when it belongs to `res_id`
pub fn logical_name<'a>(res_id: &ResId, physical: &'a str) -> Option<&'a str> {
    physical
        .strip_prefix(&res_id.prefix())
        .filter(|logical| !logical.is_empty())
}

/// Logical names of every collection `res_id` owns in the store
pub async fn logical_names(store: &dyn DocumentStore, res_id: &ResId) -> Result<BTreeSet<String>, StoreError> {
    let names = store.list_collections().await?;
    Ok(names
        .iter()
        .filter_map(|physical| logical_name(res_id, physical))
        .map(str::to_string)
        .collect())
}

/// Collection names of one workspace, resolved against its `ResId`
#[derive(Debug, Clone, Copy)]
pub struct ScopedCollections {
    res_id: ResId,
}

impl ScopedCollections {
    pub fn new(res_id: ResId) -> Self {
        Self { res_id }
    }

    pub fn res_id(&self) -> &ResId {
        &self.res_id
    }

    pub fn physical(&self, logical: &str) -> Result<String, NamespaceError> {
        physical_name(&self.res_id, logical)
    }

    pub async fn list(&self, store: &dyn DocumentStore) -> Result<BTreeSet<String>, StoreError> {
        logical_names(store, &self.res_id).await
    }
}
