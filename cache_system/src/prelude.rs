//! Convenience re-exports for common cache-system usage

// Core cache system components
pub use crate::backend::{EntityCache, build_backend};
pub use crate::errors::CacheError;
pub use crate::local::LocalCache;
pub use crate::params::CacheParams;
pub use crate::redis_cache::RedisCache;

// Re-export centralized config
pub use config::{CacheBackendKind, CacheConfig};

// Common external dependencies
pub use async_trait::async_trait;
pub use serde::{Deserialize, Serialize};
pub use serde_json;
