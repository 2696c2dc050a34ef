//! Result and schema caching
//!
//! Keys are plain strings assembled by the callers (`query:{tenant}:{ds}:{hash}`,
//! `schema:{tenant}:{ds}`); values are JSON. The in-memory store checks expiry
//! lazily on read and sweeps opportunistically on write, so a stale entry
//! never escapes but may linger until touched.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value as JsonValue;
use std::time::{Duration, Instant};

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a live entry, or `None` when absent or expired.
    async fn get(&self, key: &str) -> Option<JsonValue>;

    /// Store a value with a time-to-live.
    async fn set(&self, key: &str, value: JsonValue, ttl: Duration);

    /// Drop an entry if present.
    async fn remove(&self, key: &str);
}

struct Entry {
    value: JsonValue,
    expires_at: Instant,
}

/// Process-local cache backed by a concurrent map.
#[derive(Default)]
pub struct InMemoryCacheStore {
    entries: DashMap<String, Entry>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sweep_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Option<JsonValue> {
        let live = match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => None,
            None => return None,
        };
        if live.is_none() {
            self.entries.remove(key);
        }
        live
    }

    async fn set(&self, key: &str, value: JsonValue, ttl: Duration) {
        self.sweep_expired();
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_get_remove() {
        let cache = InMemoryCacheStore::new();
        cache
            .set("query:a:b:abc", json!({"rows": 3}), Duration::from_secs(60))
            .await;
        assert_eq!(cache.get("query:a:b:abc").await, Some(json!({"rows": 3})));

        cache.remove("query:a:b:abc").await;
        assert_eq!(cache.get("query:a:b:abc").await, None);
    }

    #[tokio::test]
    async fn expired_entries_are_not_returned() {
        let cache = InMemoryCacheStore::new();
        cache
            .set("schema:t:d", json!(1), Duration::from_millis(0))
            .await;
        assert_eq!(cache.get("schema:t:d").await, None);
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let cache = InMemoryCacheStore::new();
        assert_eq!(cache.get("nope").await, None);
    }
}
