//! Convenience re-exports for common store-object usage

// Core traits
pub use crate::traits::{Entity, Loadable, SqlStrategy, StoreObject, TableStrategy};

// Error types
pub use crate::errors::PersistError;

// Keys and entity lifecycle
pub use crate::primary_key::PrimaryKey;
pub use crate::status::{EntityState, EntityStatus, KeySource, Operation};

// Units of work and stores
pub use crate::engine::Engine;
pub use crate::generic_store::EntityStore;
pub use crate::unit_of_work::UnitOfWork;

// Rows and connections
pub use crate::connection::{ConnectionRegistry, MemoryDatabase, Row};

// Cache params (re-exported from cache_system)
pub use crate::CacheParams;

// Common external dependencies that are frequently used
pub use async_trait::async_trait;
pub use futures::future::BoxFuture;
pub use serde::{Deserialize, Serialize};
pub use type_mapping::{ColumnValue, Statement};
pub use uuid::Uuid;
