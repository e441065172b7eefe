//! Per entity type cache selection
//!
//! Entity types without their own [`CacheParams`] fall back to the default ones; a
//! type can also opt out of caching entirely.

use crate::errors::PersistError;
use crate::primary_key::PrimaryKey;
use cache_system::CacheParams;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct CacheRouter {
    default: Option<CacheParams>,
    per_type: HashMap<String, Option<CacheParams>>,
}

impl CacheRouter {
    pub fn new(default: Option<CacheParams>) -> Self {
        Self {
            default,
            per_type: HashMap::new(),
        }
    }

    pub fn with_entity(mut self, entity_type: &str, params: CacheParams) -> Self {
        self.per_type.insert(entity_type.to_string(), Some(params));
        self
    }

    /// Never cache `entity_type`, even with a default configured
    pub fn without_entity(mut self, entity_type: &str) -> Self {
        self.per_type.insert(entity_type.to_string(), None);
        self
    }

    pub fn params_for(&self, entity_type: &str) -> Option<&CacheParams> {
        match self.per_type.get(entity_type) {
            Some(params) => params.as_ref(),
            None => self.default.as_ref(),
        }
    }

    /// Every configured parameter set, default first
    pub fn all_params(&self) -> Vec<&CacheParams> {
        self.default
            .iter()
            .chain(self.per_type.values().flatten())
            .collect()
    }

    pub fn is_enabled(&self) -> bool {
        self.default.is_some() || self.per_type.values().any(Option::is_some)
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        entity_type: &str,
        key: &PrimaryKey,
    ) -> Result<Option<T>, PersistError> {
        let Some(params) = self.params_for(entity_type) else {
            return Ok(None);
        };
        let found = params
            .get_record(entity_type, &key.string_key())
            .await
            .map_err(|e| PersistError::cache("get", e))?;
        debug!(entity_type, key = %key, hit = found.is_some(), "cache lookup");
        Ok(found)
    }

    pub async fn put<T: Serialize>(
        &self,
        entity_type: &str,
        key: &PrimaryKey,
        value: &T,
    ) -> Result<(), PersistError> {
        let Some(params) = self.params_for(entity_type) else {
            return Ok(());
        };
        params
            .put_record(entity_type, &key.string_key(), value)
            .await
            .map_err(|e| PersistError::cache("put", e))
    }

    /// Drop the entry for `key`; a miss is not an error
    pub async fn evict(&self, entity_type: &str, key: &PrimaryKey) -> Result<(), PersistError> {
        let Some(params) = self.params_for(entity_type) else {
            return Ok(());
        };
        match params.evict(entity_type, &key.string_key()).await {
            Ok(removed) => {
                debug!(entity_type, key = %key, removed, "evicted from cache");
                Ok(())
            }
            Err(source) => Err(PersistError::CacheInvalidation {
                entity_type: entity_type.to_string(),
                key: key.value_list(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cache_system::LocalCache;
    use std::sync::Arc;

    fn params(prefix: &str) -> CacheParams {
        CacheParams::new(Arc::new(LocalCache::new(None)), None, prefix)
    }

    #[tokio::test]
    async fn test_routing_and_eviction() {
        let router = CacheRouter::new(Some(params("app")))
            .with_entity("order", params("orders"))
            .without_entity("audit");
        let key = PrimaryKey::surrogate_numeric("id", 1).unwrap();

        assert_eq!(router.params_for("product").unwrap().prefix, "app");
        assert_eq!(router.params_for("order").unwrap().prefix, "orders");
        assert!(router.params_for("audit").is_none());
        assert_eq!(router.all_params().len(), 2);

        router.put("order", &key, &"cached".to_string()).await.unwrap();
        let hit: Option<String> = router.get("order", &key).await.unwrap();
        assert_eq!(hit.as_deref(), Some("cached"));

        router.evict("order", &key).await.unwrap();
        let miss: Option<String> = router.get("order", &key).await.unwrap();
        assert!(miss.is_none());

        // Opted-out types never hit
        router.put("audit", &key, &1i64).await.unwrap();
        assert!(router.get::<i64>("audit", &key).await.unwrap().is_none());
    }

    #[test]
    fn test_disabled_router() {
        assert!(!CacheRouter::default().is_enabled());
        assert!(CacheRouter::default().with_entity("x", params("p")).is_enabled());
    }
}
