//! Trait definitions
//!
//! This module defines the typed store operations shared by every entity store.

use crate::errors::PersistError;
use crate::primary_key::PrimaryKey;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Trait that defines common persistence operations for all entities
///
/// Each call runs in its own unit of work on the store's subsystem and returns the
/// entities with their final statuses.
#[async_trait]
pub trait StoreObject: Clone + Send + Sync + Debug {
    /// The model type that this object represents
    type Model: Clone + Send + Sync + Debug + Serialize + for<'de> Deserialize<'de>;

    /// Insert an entity graph
    async fn insert(&self, entity: Self::Model) -> Result<Self::Model, PersistError>;

    /// Write pending changes of an entity graph
    async fn update(&self, entity: Self::Model) -> Result<Self::Model, PersistError>;

    /// Delete an entity graph
    async fn delete(&self, entity: Self::Model) -> Result<Self::Model, PersistError>;

    /// Insert many entities in batches
    async fn insert_many(
        &self,
        entities: Vec<Self::Model>,
    ) -> Result<Vec<Self::Model>, PersistError>;

    /// Update many entities in batches
    async fn update_many(
        &self,
        entities: Vec<Self::Model>,
    ) -> Result<Vec<Self::Model>, PersistError>;

    /// Delete many entities in batches
    async fn delete_many(
        &self,
        entities: Vec<Self::Model>,
    ) -> Result<Vec<Self::Model>, PersistError>;

    /// Get an entity by its key, reading through the cache
    async fn find_by_key(&self, key: &PrimaryKey) -> Result<Option<Self::Model>, PersistError>;
}
