//! Tag-invalidated result caching
//!
//! [`CachedRepository`] wraps an [`EntityRepository`](crate::repository::EntityRepository)
//! and memoizes its reads in a [`CacheStore`]. Every entry belongs to one
//! tag, `{RepositoryName}_{userId}`, and every write flushes that tag.
//!
//! Entry keys have the form `{method}@{RepositoryName}_{tag}-{hash}`, where
//! `hash` covers the call arguments and the criteria stack fingerprint, so
//! the same read under the same criteria maps to the same entry.

mod memory;
#[cfg(feature = "cache")]
mod redis;
mod repository;

pub use memory::MemoryCacheStore;
#[cfg(feature = "cache")]
pub use redis::RedisCacheStore;
pub use repository::CachedRepository;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Tag-partitioned key/value store with expiring entries
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Value stored under `key` in `tag`, if present and not expired
    async fn get(&self, tag: &str, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key` in `tag` for `ttl`
    async fn put(&self, tag: &str, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Drop every entry in `tag`
    async fn flush(&self, tag: &str) -> Result<()>;
}

/// Cache tag for a repository and (optionally) an authenticated user
///
/// ```rust
/// use acton_repository::cache::cache_tag;
///
/// assert_eq!(cache_tag("PostRepository", Some("42")), "PostRepository_42");
/// assert_eq!(cache_tag("PostRepository", None), "PostRepository_0");
/// ```
pub fn cache_tag(repository: &str, user_id: Option<&str>) -> String {
    format!("{}_{}", repository, user_id.unwrap_or("0"))
}

/// Cache key for one read
///
/// `args` are the read's arguments in call order and `fingerprint` the
/// criteria stack's [`fingerprint`](crate::criteria::CriteriaStack::fingerprint).
pub fn cache_key(method: &str, repository: &str, tag: &str, args: &Value, fingerprint: &Value) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(args.to_string().as_bytes());
    hasher.update(fingerprint.to_string().as_bytes());
    format!(
        "{}@{}_{}-{}",
        method,
        repository,
        tag,
        hasher.finalize().to_hex()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_layout() {
        let key = cache_key("get", "PostRepository", "PostRepository_0", &json!([["*"]]), &json!([]));
        assert!(key.starts_with("get@PostRepository_PostRepository_0-"));
        // blake3 hex digest
        assert_eq!(key.rsplit('-').next().map(str::len), Some(64));
    }

    #[test]
    fn test_key_depends_on_args_and_fingerprint() {
        let fingerprint = json!([{ "criterion": "LimitCriteria", "parameters": { "limit": 5 } }]);
        let base = cache_key("get", "R", "R_0", &json!([["*"]]), &fingerprint);

        assert_eq!(base, cache_key("get", "R", "R_0", &json!([["*"]]), &fingerprint));
        assert_ne!(base, cache_key("get", "R", "R_0", &json!([["id"]]), &fingerprint));
        assert_ne!(base, cache_key("get", "R", "R_0", &json!([["*"]]), &json!([])));
        assert_ne!(base, cache_key("first", "R", "R_0", &json!([["*"]]), &fingerprint));
    }
}
