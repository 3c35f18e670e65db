use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{DocumentStore, FindQuery, StoreError, UpdateOptions, UpdateOutcome};
use crate::document::{self, aggregate, matcher, projection, Document};

/// In-process store. Collections live in a map guarded by one lock, so every
/// operation is atomic with respect to the others.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<BTreeMap<String, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matching(docs: &[Document], filter: &Value) -> Result<Vec<usize>, StoreError> {
    matcher::validate(filter)?;
    let mut hits = Vec::new();
    for (index, doc) in docs.iter().enumerate() {
        if matcher::matches(doc, filter)? {
            hits.push(index);
        }
    }
    Ok(hits)
}

fn window<T>(items: Vec<T>, skip: u64, limit: u64) -> Vec<T> {
    let iter = items.into_iter().skip(usize::try_from(skip).unwrap_or(usize::MAX));
    if limit == 0 {
        iter.collect()
    } else {
        iter.take(usize::try_from(limit).unwrap_or(usize::MAX)).collect()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn find(&self, collection: &str, query: &FindQuery) -> Result<Vec<Document>, StoreError> {
        let projection = query.projection.clone().unwrap_or(Value::Null);
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            matcher::validate(&query.filter)?;
            return Ok(Vec::new());
        };
        let hits = window(matching(docs, &query.filter)?, query.skip, query.limit);
        hits.into_iter()
            .map(|index| projection::project(docs[index].clone(), &projection).map_err(StoreError::from))
            .collect()
    }

    async fn count(&self, collection: &str, filter: &Value, skip: u64, limit: u64) -> Result<u64, StoreError> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            matcher::validate(filter)?;
            return Ok(0);
        };
        Ok(window(matching(docs, filter)?, skip, limit).len() as u64)
    }

    async fn insert(&self, collection: &str, documents: Vec<Document>) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        for mut doc in documents {
            document::ensure_id(&mut doc);
            docs.push(doc);
        }
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Value,
        update: &Value,
        options: UpdateOptions,
    ) -> Result<UpdateOutcome, StoreError> {
        document::update::classify(update)?;
        let mut collections = self.collections.write().await;
        let mut hits = match collections.get(collection) {
            Some(docs) => matching(docs, filter)?,
            None => {
                matcher::validate(filter)?;
                Vec::new()
            }
        };
        if !options.multi {
            hits.truncate(1);
        }

        if hits.is_empty() {
            if !options.upsert {
                return Ok(UpdateOutcome::default());
            }
            let mut seed = document::update::upsert_seed(filter)?;
            document::update::apply(&mut seed, update)?;
            document::ensure_id(&mut seed);
            collections.entry(collection.to_string()).or_default().push(seed);
            return Ok(UpdateOutcome { matched: 0, upserted: true });
        }

        let Some(docs) = collections.get_mut(collection) else {
            return Ok(UpdateOutcome::default());
        };
        // Apply to copies first so a failing update leaves the collection untouched
        let mut updated = Vec::with_capacity(hits.len());
        for &index in &hits {
            let mut copy = docs[index].clone();
            document::update::apply(&mut copy, update)?;
            updated.push((index, copy));
        }
        for (index, doc) in updated {
            docs[index] = doc;
        }
        Ok(UpdateOutcome {
            matched: hits.len() as u64,
            upserted: false,
        })
    }

    async fn remove(&self, collection: &str, filter: &Value, just_one: bool) -> Result<u64, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            matcher::validate(filter)?;
            return Ok(0);
        };
        let mut hits = matching(docs, filter)?;
        if just_one {
            hits.truncate(1);
        }
        for index in hits.iter().rev() {
            docs.remove(*index);
        }
        Ok(hits.len() as u64)
    }

    async fn aggregate(&self, collection: &str, pipeline: &[Value]) -> Result<Vec<Document>, StoreError> {
        aggregate::validate(pipeline)?;
        let docs = {
            let collections = self.collections.read().await;
            collections.get(collection).cloned().unwrap_or_default()
        };
        Ok(aggregate::run(docs, pipeline)?)
    }

    async fn drop_collection(&self, collection: &str) -> Result<bool, StoreError> {
        Ok(self.collections.write().await.remove(collection).is_some())
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.collections.read().await.keys().cloned().collect())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
