//! In-memory cache store
//!
//! Uses DashMap for concurrent access. Suitable for single-instance
//! deployments and tests; use the Redis store to share entries between
//! processes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::CacheStore;
use crate::error::Result;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    /// `None` when the lifetime is past what `Instant` can represent
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-memory cache store; clones share entries
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStore {
    tags: Arc<DashMap<String, HashMap<String, Entry>>>,
}

impl MemoryCacheStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries in `tag`
    pub fn len(&self, tag: &str) -> usize {
        let now = Instant::now();
        self.tags
            .get(tag)
            .map_or(0, |entries| entries.values().filter(|e| e.is_live(now)).count())
    }

    /// Whether `tag` holds no live entries
    pub fn is_empty(&self, tag: &str) -> bool {
        self.len(tag) == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, tag: &str, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let Some(mut entries) = self.tags.get_mut(tag) else {
            return Ok(None);
        };
        let live = entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone());
        if live.is_none() {
            entries.remove(key);
        }
        Ok(live)
    }

    async fn put(&self, tag: &str, key: &str, value: String, ttl: Duration) -> Result<()> {
        let expires_at = Instant::now().checked_add(ttl);
        self.tags
            .entry(tag.to_string())
            .or_default()
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn flush(&self, tag: &str) -> Result<()> {
        self.tags.remove(tag);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_flush() {
        let store = MemoryCacheStore::new();
        store
            .put("posts_0", "k", "v".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        store
            .put("posts_7", "k", "other".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.get("posts_0", "k").await.unwrap().as_deref(), Some("v"));
        store.flush("posts_0").await.unwrap();
        assert_eq!(store.get("posts_0", "k").await.unwrap(), None);
        // other tags survive
        assert_eq!(store.len("posts_7"), 1);
    }

    #[tokio::test]
    async fn test_expired_entries_miss() {
        let store = MemoryCacheStore::new();
        store
            .put("t", "k", "v".to_string(), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(store.get("t", "k").await.unwrap(), None);
        assert!(store.is_empty("t"));
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_never_expires() {
        let store = MemoryCacheStore::new();
        store
            .put("t", "k", "v".to_string(), Duration::from_secs(u64::MAX))
            .await
            .unwrap();
        assert_eq!(store.get("t", "k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.len("t"), 1);
    }
}
