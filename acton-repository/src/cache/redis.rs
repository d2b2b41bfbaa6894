//! Redis cache store
//!
//! Entries are plain string keys with an expiry; each tag keeps a set of its
//! entry keys so a flush can delete them.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::redis::{self, AsyncCommands};
use deadpool_redis::{Config as DeadpoolConfig, Connection, Pool, Runtime};

use super::CacheStore;
use crate::backoff::Backoff;
use crate::config::RedisConfig;
use crate::error::{Error, Result};

/// Cache store backed by a Redis connection pool
#[derive(Clone)]
pub struct RedisCacheStore {
    pool: Pool,
}

impl fmt::Debug for RedisCacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.pool.status();
        write!(f, "RedisCacheStore(size={}, available={})", status.size, status.available)
    }
}

impl RedisCacheStore {
    /// Wrap an existing pool
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Connect using the configuration, retrying with exponential backoff
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        Ok(Self::new(create_pool(config).await?))
    }

    /// Underlying pool
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn connection(&self) -> Result<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| Error::Cache(format!("Failed to get Redis connection: {}", e)))
    }
}

/// Whole seconds for `EX`/`EXPIRE`: at least 1, at most `i64::MAX`
fn expiry_seconds(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX).max(1)
}

fn tag_set(tag: &str) -> String {
    format!("{}:keys", tag)
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, _tag: &str, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn put(&self, tag: &str, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.connection().await?;
        let seconds = expiry_seconds(ttl);
        let set = tag_set(tag);

        redis::pipe()
            .atomic()
            .set_ex(key, value, seconds as u64)
            .ignore()
            .sadd(&set, key)
            .ignore()
            .expire(&set, seconds)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn flush(&self, tag: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        let set = tag_set(tag);

        let keys: Vec<String> = conn.smembers(&set).await?;
        if !keys.is_empty() {
            let _: () = conn.del(&keys).await?;
        }
        let _: () = conn.del(&set).await?;
        tracing::debug!(tag, entries = keys.len(), "Flushed Redis cache tag");
        Ok(())
    }
}

async fn create_pool(config: &RedisConfig) -> Result<Pool> {
    Backoff::new(config.max_retries, config.retry_delay_secs)
        .run("redis", || open_pool(config))
        .await
}

/// Build the pool and check out one connection to prove the server answers
async fn open_pool(config: &RedisConfig) -> Result<Pool> {
    let builder = DeadpoolConfig::from_url(&config.url)
        .builder()
        .map_err(|e| Error::Internal(format!("Invalid Redis URL: {}", e)))?;
    let pool = builder
        .max_size(config.max_connections)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| Error::Internal(format!("Invalid Redis pool settings: {}", e)))?;

    pool.get()
        .await
        .map_err(|e| Error::Cache(format!("Redis unreachable: {}", e)))?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_set_name() {
        assert_eq!(tag_set("PostRepository_0"), "PostRepository_0:keys");
    }

    #[test]
    fn test_expiry_seconds_clamped() {
        assert_eq!(expiry_seconds(Duration::ZERO), 1);
        assert_eq!(expiry_seconds(Duration::from_secs(3600)), 3600);
        assert_eq!(expiry_seconds(Duration::from_secs(u64::MAX)), i64::MAX);
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_after_retries() {
        let config = RedisConfig {
            url: "redis://127.0.0.1:1".to_string(),
            max_connections: 2,
            max_retries: 0,
            retry_delay_secs: 0,
        };
        assert!(RedisCacheStore::connect(&config).await.is_err());
    }
}
