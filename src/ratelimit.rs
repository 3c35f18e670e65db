use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::store::{DocumentStore, StoreError};

/// Longest accepted window, one year
pub const MAX_WINDOW_SECS: u64 = 366 * 24 * 60 * 60;

/// Sliding window limiter over events persisted in the store.
///
/// Every attempt is recorded, including denied ones. Recording and counting
/// are two store calls, so concurrent attempts may both pass at the boundary.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn DocumentStore>,
    collection: String,
    quota: u64,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>, quota: u64, window_secs: u64) -> Self {
        Self {
            store,
            collection: collection.into(),
            quota,
            window: Duration::seconds(window_secs.min(MAX_WINDOW_SECS) as i64),
        }
    }

    pub async fn check_and_record(&self, session_id: &str) -> Result<bool, StoreError> {
        self.check_and_record_at(session_id, Utc::now()).await
    }

    /// Record an attempt at `now` and report whether the session is still within quota
    pub async fn check_and_record_at(&self, session_id: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let now_ms = now.timestamp_millis();
        let mut event = Map::new();
        event.insert("session_id".to_string(), Value::String(session_id.to_string()));
        event.insert("timestamp".to_string(), json!(now_ms));
        self.store.insert(&self.collection, vec![event]).await?;

        let since = now_ms - self.window.num_milliseconds();
        let filter = json!({ "session_id": session_id, "timestamp": { "$gt": since } });
        let recent = self.store.count(&self.collection, &filter, 0, 0).await?;

        if recent > self.quota {
            warn!(recent, quota = self.quota, "Rate limit exceeded");
            return Ok(false);
        }
        debug!(recent, quota = self.quota, "Rate limit check passed");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn limiter(quota: u64) -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryStore::new()), "ratelimit", quota, 60)
    }

    #[tokio::test]
    async fn denies_past_quota_then_recovers_after_window() {
        let limiter = limiter(3);
        let start = Utc::now();
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(limiter.check_and_record_at("s1", start).await.unwrap());
        }
        assert_eq!(seen, vec![true, true, true, false]);

        let later = start + Duration::seconds(61);
        assert!(limiter.check_and_record_at("s1", later).await.unwrap());
    }

    #[tokio::test]
    async fn window_boundary_is_exclusive() {
        let limiter = limiter(1);
        let start = Utc::now();
        assert!(limiter.check_and_record_at("s1", start).await.unwrap());
        // Exactly one window later the first event no longer counts
        assert!(limiter.check_and_record_at("s1", start + Duration::seconds(60)).await.unwrap());
    }

    #[tokio::test]
    async fn sessions_are_counted_separately() {
        let limiter = limiter(1);
        let now = Utc::now();
        assert!(limiter.check_and_record_at("s1", now).await.unwrap());
        assert!(limiter.check_and_record_at("s2", now).await.unwrap());
        assert!(!limiter.check_and_record_at("s1", now).await.unwrap());
    }

    #[tokio::test]
    async fn denied_attempts_are_still_recorded() {
        let store = Arc::new(MemoryStore::new());
        let limiter = RateLimiter::new(store.clone(), "ratelimit", 0, 60);
        assert!(!limiter.check_and_record("s1").await.unwrap());
        assert!(!limiter.check_and_record("s1").await.unwrap());
        assert_eq!(store.count("ratelimit", &json!({"session_id": "s1"}), 0, 0).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn oversized_window_is_capped() {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()), "ratelimit", 1, u64::MAX);
        assert_eq!(limiter.window, Duration::seconds(MAX_WINDOW_SECS as i64));
        assert!(limiter.check_and_record("s1").await.unwrap());
        assert!(!limiter.check_and_record("s1").await.unwrap());
    }
}
