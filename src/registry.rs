//! Resource records: which session owns which workspace.
//!
//! One document per workspace lives in the control collection. Records are
//! created here, refreshed by keep-alive and never deleted.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::document::{Document, QueryError};
use crate::namespace::{self, ResId};
use crate::store::{DocumentStore, FindQuery, StoreError, UpdateOptions};

/// Version written into new records
pub const RESOURCE_VERSION: u32 = 1;

/// A workspace record in the control collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub version: u32,
    pub res_id: ResId,
    /// Logical collection names; informational only
    #[serde(default)]
    pub collections: Vec<String>,
    pub session_id: String,
    /// Last activity
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl Resource {
    pub fn new(session_id: &str) -> Self {
        Self {
            version: RESOURCE_VERSION,
            res_id: ResId::new(),
            collections: Vec::new(),
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
        }
    }

    fn into_document(self) -> Result<Document, StoreError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(doc)) => Ok(doc),
            Ok(_) => Err(QueryError::InvalidDocument("resource did not serialize to an object".to_string()).into()),
            Err(e) => Err(QueryError::InvalidDocument(e.to_string()).into()),
        }
    }

    fn from_document(doc: Document) -> Result<Self, StoreError> {
        serde_json::from_value(Value::Object(doc))
            .map_err(|e| StoreError::Unavailable(format!("unreadable resource record: {}", e)))
    }
}

#[derive(Clone)]
pub struct ResourceRegistry {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl ResourceRegistry {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    /// Workspace of `session_id`, created when the session has none.
    ///
    /// Two first requests racing for the same session may both create a
    /// record; lookups then return whichever the store lists first.
    pub async fn create_or_get(&self, session_id: &str) -> Result<(ResId, bool), StoreError> {
        let query = FindQuery::new(json!({ "session_id": session_id })).limit(1);
        if let Some(doc) = self.store.find(&self.collection, &query).await?.into_iter().next() {
            let resource = Resource::from_document(doc)?;
            debug!(res_id = %resource.res_id, "Found existing resource for session");
            return Ok((resource.res_id, false));
        }

        let resource = Resource::new(session_id);
        let res_id = resource.res_id;
        self.store
            .insert(&self.collection, vec![resource.into_document()?])
            .await?;
        info!(res_id = %res_id, "Created resource");
        Ok((res_id, true))
    }

    /// Refresh the activity timestamp. A record that does not exist is left alone.
    pub async fn touch(&self, session_id: &str, res_id: &ResId) -> Result<(), StoreError> {
        let now = Utc::now().timestamp_millis();
        let outcome = self
            .store
            .update(
                &self.collection,
                &owner_filter(res_id, session_id),
                &json!({ "$set": { "timestamp": now } }),
                UpdateOptions::default(),
            )
            .await?;
        if outcome.matched == 0 {
            debug!(res_id = %res_id, "keep-alive for unknown resource ignored");
        }
        Ok(())
    }

    pub async fn has_access(&self, res_id: &ResId, session_id: &str) -> Result<bool, StoreError> {
        let found = self
            .store
            .count(&self.collection, &owner_filter(res_id, session_id), 0, 1)
            .await?;
        Ok(found > 0)
    }

    pub async fn list_logical_collections(&self, res_id: &ResId) -> Result<BTreeSet<String>, StoreError> {
        namespace::logical_names(self.store.as_ref(), res_id).await
    }

    /// Drop every collection of the workspace. The record itself stays.
    pub async fn drop_resource(&self, res_id: &ResId) -> Result<(), StoreError> {
        let logical = self.list_logical_collections(res_id).await?;
        let physical: Vec<String> = logical
            .iter()
            .map(|name| namespace::physical_name(res_id, name))
            .collect::<Result<_, _>>()?;
        try_join_all(physical.iter().map(|name| self.store.drop_collection(name))).await?;
        self.update_record(res_id, json!({ "$set": { "collections": [] } })).await?;
        info!(res_id = %res_id, dropped = physical.len(), "Dropped all resource collections");
        Ok(())
    }

    pub async fn note_collection(&self, res_id: &ResId, logical: &str) -> Result<(), StoreError> {
        self.update_record(res_id, json!({ "$addToSet": { "collections": logical } })).await
    }

    pub async fn forget_collection(&self, res_id: &ResId, logical: &str) -> Result<(), StoreError> {
        self.update_record(res_id, json!({ "$pull": { "collections": logical } })).await
    }

    async fn update_record(&self, res_id: &ResId, update: Value) -> Result<(), StoreError> {
        let options = UpdateOptions { upsert: false, multi: true };
        self.store
            .update(&self.collection, &json!({ "res_id": res_id.to_string() }), &update, options)
            .await?;
        Ok(())
    }
}

fn owner_filter(res_id: &ResId, session_id: &str) -> Value {
    json!({ "res_id": res_id.to_string(), "session_id": session_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    impl ResourceRegistry {
        async fn get(&self, res_id: &ResId) -> Result<Option<Resource>, StoreError> {
            let query = FindQuery::new(json!({ "res_id": res_id.to_string() })).limit(1);
            match self.store.find(&self.collection, &query).await?.into_iter().next() {
                Some(doc) => Resource::from_document(doc).map(Some),
                None => Ok(None),
            }
        }
    }

    fn registry() -> (Arc<MemoryStore>, ResourceRegistry) {
        let store = Arc::new(MemoryStore::new());
        let registry = ResourceRegistry::new(store.clone(), "clients");
        (store, registry)
    }

    #[tokio::test]
    async fn create_or_get_is_stable_per_session() {
        let (_, registry) = registry();
        let (first, is_new) = registry.create_or_get("s1").await.unwrap();
        assert!(is_new);
        let (second, is_new) = registry.create_or_get("s1").await.unwrap();
        assert!(!is_new);
        assert_eq!(first, second);

        let (other, is_new) = registry.create_or_get("s2").await.unwrap();
        assert!(is_new);
        assert_ne!(first, other);
    }

    #[tokio::test]
    async fn record_shape() {
        let (store, registry) = registry();
        let (res_id, _) = registry.create_or_get("s1").await.unwrap();
        let docs = store.find("clients", &FindQuery::new(json!({}))).await.unwrap();
        assert_eq!(docs.len(), 1);
        let doc = &docs[0];
        assert_eq!(doc["version"], json!(1));
        assert_eq!(doc["res_id"], json!(res_id.to_string()));
        assert_eq!(doc["collections"], json!([]));
        assert_eq!(doc["session_id"], json!("s1"));
        assert!(doc["timestamp"].is_i64());
    }

    #[tokio::test]
    async fn access_requires_matching_pair() {
        let (_, registry) = registry();
        let (mine, _) = registry.create_or_get("s1").await.unwrap();
        let (theirs, _) = registry.create_or_get("s2").await.unwrap();
        assert!(registry.has_access(&mine, "s1").await.unwrap());
        assert!(!registry.has_access(&mine, "s2").await.unwrap());
        assert!(!registry.has_access(&theirs, "s1").await.unwrap());
        assert!(!registry.has_access(&ResId::new(), "s1").await.unwrap());
    }

    #[tokio::test]
    async fn touch_moves_timestamp_and_ignores_misses() {
        let (_, registry) = registry();
        let (res_id, _) = registry.create_or_get("s1").await.unwrap();
        let before = registry.get(&res_id).await.unwrap().unwrap().timestamp;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        registry.touch("s1", &res_id).await.unwrap();
        let after = registry.get(&res_id).await.unwrap().unwrap().timestamp;
        assert!(after > before);

        registry.touch("s2", &res_id).await.unwrap();
        registry.touch("s1", &ResId::new()).await.unwrap();
    }

    #[tokio::test]
    async fn collections_cache_and_drop_resource() {
        let (store, registry) = registry();
        let (res_id, _) = registry.create_or_get("s1").await.unwrap();
        for name in ["widgets", "gadgets"] {
            store
                .insert(&format!("{}.{}", res_id, name), vec![Document::new()])
                .await
                .unwrap();
            registry.note_collection(&res_id, name).await.unwrap();
        }
        registry.note_collection(&res_id, "widgets").await.unwrap();
        let record = registry.get(&res_id).await.unwrap().unwrap();
        assert_eq!(record.collections, vec!["widgets".to_string(), "gadgets".to_string()]);

        registry.forget_collection(&res_id, "gadgets").await.unwrap();
        assert_eq!(registry.get(&res_id).await.unwrap().unwrap().collections, vec!["widgets".to_string()]);

        let (neighbour, _) = registry.create_or_get("s2").await.unwrap();
        store
            .insert(&namespace::physical_name(&neighbour, "widgets").unwrap(), vec![Document::new()])
            .await
            .unwrap();

        registry.drop_resource(&res_id).await.unwrap();
        assert!(registry.list_logical_collections(&res_id).await.unwrap().is_empty());
        let kept = registry.list_logical_collections(&neighbour).await.unwrap();
        assert_eq!(kept.into_iter().collect::<Vec<_>>(), vec!["widgets".to_string()]);
        let record = registry.get(&res_id).await.unwrap().unwrap();
        assert!(record.collections.is_empty());
        assert!(registry.has_access(&res_id, "s1").await.unwrap());
    }
}
