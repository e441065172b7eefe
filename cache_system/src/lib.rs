//! Entity cache for the persistence engine
//!
//! Two back-ends share the [`EntityCache`] contract: a process-local map and Redis.
//! [`CacheParams`] binds a back-end to a key namespace and handles serialization.

pub mod backend;
pub mod errors;
pub mod local;
pub mod params;
pub mod prelude;
pub mod redis_cache;

// Re-export centralized config
pub use config::{CacheBackendKind, CacheConfig};

pub use backend::{EntityCache, build_backend};
pub use errors::CacheError;
pub use local::LocalCache;
pub use params::CacheParams;
pub use redis_cache::RedisCache;
