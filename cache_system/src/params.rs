//! Cache parameter configuration
//!
//! This module defines the CacheParams struct, which binds a back-end to a key
//! namespace and TTL and handles entity (de)serialization.

use crate::backend::EntityCache;
use crate::errors::CacheError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// Cache parameters for configuring cache behavior per entity type
#[derive(Debug, Clone)]
pub struct CacheParams {
    /// The cache back-end instance
    pub backend: Arc<dyn EntityCache>,
    /// TTL for entries written through these params; `None` uses the back-end default
    pub ttl: Option<Duration>,
    /// Prefix for cache keys
    pub prefix: String,
}

impl CacheParams {
    pub fn new(backend: Arc<dyn EntityCache>, ttl: Option<Duration>, prefix: &str) -> Self {
        Self {
            backend,
            ttl,
            prefix: prefix.to_string(),
        }
    }

    /// Generate cache key for an entity by its canonical key string
    pub fn record_key(&self, entity_type: &str, key: &str) -> String {
        format!("{}:{}:record:{}", self.prefix, entity_type, key)
    }

    pub async fn get_record<T>(&self, entity_type: &str, key: &str) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned,
    {
        match self.backend.get(&self.record_key(entity_type, key)).await? {
            Some(json_str) => Ok(Some(serde_json::from_str(&json_str)?)),
            None => Ok(None),
        }
    }

    pub async fn put_record<T>(&self, entity_type: &str, key: &str, value: &T) -> Result<(), CacheError>
    where
        T: Serialize,
    {
        let json_str = serde_json::to_string(value)?;
        self.backend
            .put(&self.record_key(entity_type, key), &json_str, self.ttl)
            .await
    }

    pub async fn evict(&self, entity_type: &str, key: &str) -> Result<bool, CacheError> {
        self.backend.remove(&self.record_key(entity_type, key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalCache;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Product {
        sku: String,
        qty: i64,
    }

    #[tokio::test]
    async fn test_records_are_namespaced() {
        let local = Arc::new(LocalCache::new(None));
        let params = CacheParams::new(local.clone(), None, "app");
        let product = Product { sku: "A-1".into(), qty: 3 };

        params.put_record("product", "N(x)", &product).await.unwrap();
        assert_eq!(
            local.get("app:product:record:N(x)").await.unwrap().is_some(),
            true
        );
        let back: Option<Product> = params.get_record("product", "N(x)").await.unwrap();
        assert_eq!(back, Some(product));

        // Same key string under another entity type is a different entry
        let other: Option<Product> = params.get_record("order", "N(x)").await.unwrap();
        assert!(other.is_none());

        assert!(params.evict("product", "N(x)").await.unwrap());
        let gone: Option<Product> = params.get_record("product", "N(x)").await.unwrap();
        assert!(gone.is_none());
    }
}
