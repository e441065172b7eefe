//! Cache back-end contract
//!
//! Both back-ends store opaque string payloads keyed by string. Entity typing and key
//! namespacing live in [`crate::CacheParams`].

use crate::errors::CacheError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;

#[async_trait]
pub trait EntityCache: Send + Sync + Debug {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value`; `None` falls back to the back-end's default TTL
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Returns whether an entry was present
    async fn remove(&self, key: &str) -> Result<bool, CacheError>;

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Build the back-end selected by `config`; `None` means caching is off
pub fn build_backend(
    config: &config::CacheConfig,
) -> Result<Option<std::sync::Arc<dyn EntityCache>>, CacheError> {
    use config::CacheBackendKind;
    use std::sync::Arc;

    match config.backend {
        CacheBackendKind::None => Ok(None),
        CacheBackendKind::Local => Ok(Some(Arc::new(crate::local::LocalCache::new(Some(
            config.ttl_duration(),
        ))))),
        CacheBackendKind::Redis => Ok(Some(Arc::new(crate::redis_cache::RedisCache::new(
            config.clone(),
        )?))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{CacheBackendKind, CacheConfig};

    #[tokio::test]
    async fn test_build_local_backend() {
        let mut config = CacheConfig::default();
        assert!(build_backend(&config).unwrap().is_none());

        config.backend = CacheBackendKind::Local;
        let backend = build_backend(&config).unwrap().unwrap();
        backend.put("k", "v", None).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(backend.ping().await.is_ok());
    }
}
