//! Redis cache implementation
//!
//! This module provides the networked cache back-end with per-entry TTL.

use crate::backend::EntityCache;
use crate::errors::CacheError;
use async_trait::async_trait;
use config::CacheConfig;
use redis::{AsyncCommands, Client};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Redis-based cache back-end
#[derive(Clone)]
pub struct RedisCache {
    client: Arc<Client>,
    config: Arc<CacheConfig>,
    connection_pool: Arc<RwLock<Option<redis::aio::MultiplexedConnection>>>,
}

impl Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let connection_status = {
            match self.connection_pool.try_read() {
                Ok(pool) => {
                    if pool.is_some() {
                        "connected"
                    } else {
                        "no_connection"
                    }
                }
                Err(_) => "lock_error",
            }
        };

        f.debug_struct("RedisCache")
            .field("redis_url", &self.config.redis_url)
            .field("default_ttl_seconds", &self.config.default_ttl_seconds)
            .field("connected", &connection_status)
            .finish()
    }
}

impl RedisCache {
    /// Create a new Redis cache; the connection is opened lazily
    pub fn new(config: CacheConfig) -> Result<Self, CacheError> {
        let client = Client::open(config.redis_url.as_str())?;

        Ok(Self {
            client: Arc::new(client),
            config: Arc::new(config),
            connection_pool: Arc::new(RwLock::new(None)),
        })
    }

    /// Get or create Redis connection
    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        let mut pool = self.connection_pool.write().await;

        if pool.is_none() {
            let timeout = Duration::from_millis(self.config.connection_timeout_ms);
            let connection =
                tokio::time::timeout(timeout, self.client.get_multiplexed_async_connection())
                    .await
                    .map_err(|_| CacheError::Timeout)??;
            tracing::debug!(url = %self.config.redis_url, "opened redis connection");
            *pool = Some(connection);
        }

        Ok(pool
            .as_ref()
            .ok_or_else(|| CacheError::Connection("Failed to get connection from pool".into()))?
            .clone())
    }

    fn effective_ttl(&self, ttl: Option<Duration>) -> u64 {
        ttl.map(|t| t.as_secs())
            .unwrap_or(self.config.default_ttl_seconds)
    }

    /// Get current configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

#[async_trait]
impl EntityCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.get_connection().await?;
        let cached: Option<String> = conn.get(key).await?;
        Ok(cached)
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut conn = self.get_connection().await?;
        let seconds = self.effective_ttl(ttl);
        if seconds == 0 {
            let _: () = conn.set(key, value).await?;
        } else {
            let _: () = conn.set_ex(key, value, seconds).await?;
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.get_connection().await?;
        let deleted: i32 = conn.del(key).await?;
        Ok(deleted > 0)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.get_connection().await?;
        let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::CacheBackendKind;

    #[test]
    fn test_ttl_falls_back_to_config() {
        let cache = RedisCache::new(CacheConfig::new(
            CacheBackendKind::Redis,
            "redis://localhost:6379".to_string(),
            120,
            "test".to_string(),
        ))
        .unwrap();
        assert_eq!(cache.effective_ttl(None), 120);
        assert_eq!(cache.effective_ttl(Some(Duration::from_secs(5))), 5);
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let result = RedisCache::new(CacheConfig::new(
            CacheBackendKind::Redis,
            "not a url".to_string(),
            60,
            "test".to_string(),
        ));
        assert!(result.is_err());
    }
}
