//! Mismatch cache.
//!
//! Flagged row keys accumulate in Redis lists during validation so a crashed
//! or repeated run can see what the previous pass flagged. Keys are
//! namespaced per run (`{resource_id}_{package_id}_` prefix) so concurrent
//! validations of different resources never collide.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::CacheConfig;
use crate::error::Result;

/// Append-only list cache for flagged row keys.
#[async_trait]
pub trait MismatchCache: Send + Sync {
    /// Append values to the list stored at `key`.
    async fn append(&self, key: &str, values: &[String]) -> Result<()>;

    /// Length of the list stored at `key`; zero if absent.
    async fn list_length(&self, key: &str) -> Result<u64>;

    /// Delete every key starting with `prefix`. Returns the count deleted.
    async fn clear_prefix(&self, prefix: &str) -> Result<u64>;
}

/// Redis-backed mismatch cache.
pub struct RedisCache {
    conn: Mutex<MultiplexedConnection>,
}

impl RedisCache {
    /// Connect to Redis and verify the connection with a ping.
    pub async fn connect(config: &CacheConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        let mut conn = client.get_multiplexed_async_connection().await?;

        redis::cmd("PING").query_async::<()>(&mut conn).await?;

        info!("Connected to Redis cache");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl MismatchCache for RedisCache {
    async fn append(&self, key: &str, values: &[String]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().await;
        conn.rpush::<_, _, ()>(key, values).await?;
        Ok(())
    }

    async fn list_length(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.lock().await;
        let len: u64 = conn.llen(key).await?;
        Ok(len)
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<u64> {
        let mut conn = self.conn.lock().await;

        let pattern = format!("{}*", prefix.replace('*', "\\*"));
        let keys: Vec<String> = {
            let mut iter = conn.scan_match::<_, String>(&pattern).await?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        if keys.is_empty() {
            return Ok(0);
        }

        let deleted: u64 = conn.del(&keys).await?;
        debug!("Cleared {} cache keys under prefix {}", deleted, prefix);
        Ok(deleted)
    }
}

/// In-memory cache used by tests and dry runs.
#[derive(Default)]
pub struct MemoryCache {
    lists: Mutex<HashMap<String, Vec<String>>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the list stored at `key`.
    pub async fn entries(&self, key: &str) -> Vec<String> {
        self.lists
            .lock()
            .await
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// All keys currently held, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lists.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl MismatchCache for MemoryCache {
    async fn append(&self, key: &str, values: &[String]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        self.lists
            .lock()
            .await
            .entry(key.to_string())
            .or_default()
            .extend_from_slice(values);
        Ok(())
    }

    async fn list_length(&self, key: &str) -> Result<u64> {
        Ok(self
            .lists
            .lock()
            .await
            .get(key)
            .map(|list| list.len() as u64)
            .unwrap_or(0))
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<u64> {
        let mut lists = self.lists.lock().await;
        let before = lists.len();
        lists.retain(|key, _| !key.starts_with(prefix));
        Ok((before - lists.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_and_length() {
        let cache = MemoryCache::new();
        cache
            .append("r1_p1_false_indexes:orders", &["1".into(), "2".into()])
            .await
            .unwrap();
        cache
            .append("r1_p1_false_indexes:orders", &["9".into()])
            .await
            .unwrap();

        assert_eq!(
            cache.list_length("r1_p1_false_indexes:orders").await.unwrap(),
            3
        );
        assert_eq!(cache.list_length("absent").await.unwrap(), 0);
        assert_eq!(
            cache.entries("r1_p1_false_indexes:orders").await,
            vec!["1", "2", "9"]
        );
    }

    #[tokio::test]
    async fn test_empty_append_is_noop() {
        let cache = MemoryCache::new();
        cache.append("k", &[]).await.unwrap();
        assert_eq!(cache.list_length("k").await.unwrap(), 0);
        assert!(cache.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_clear_prefix_only_touches_namespace() {
        let cache = MemoryCache::new();
        cache.append("r1_p1_false_indexes:a", &["x".into()]).await.unwrap();
        cache.append("r1_p1_false_indexes:b", &["y".into()]).await.unwrap();
        cache.append("r2_p2_false_indexes:a", &["z".into()]).await.unwrap();

        let deleted = cache.clear_prefix("r1_p1_").await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(cache.list_length("r1_p1_false_indexes:a").await.unwrap(), 0);
        assert_eq!(cache.list_length("r2_p2_false_indexes:a").await.unwrap(), 1);
    }
}
