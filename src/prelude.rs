//! Convenience re-exports for common PersistHaus usage
//!
//! This prelude module re-exports the most commonly used items from the PersistHaus ecosystem,
//! making it easier to import everything you need with a single use statement.
//!
//! # Example
//!
//! ```rust
//! use persisthaus::prelude::*;
//!
//! // Now you have access to all the common PersistHaus types and traits
//! ```

// Core PersistHaus components
pub use crate::core::PersistHaus;
pub use crate::errors::PersistHausError;

// Re-export centralized config
pub use config::{
    AppConfig, BackendKind, CacheConfig, DatabaseConfig, SignalConfig, SubsystemConfig,
    UnitOfWorkConfig,
};

// Re-export commonly used store-object types for convenience
pub use store_object::prelude::*;

// Re-export signal system for event handling
pub use signal_system::prelude::*;

// Re-export cache system
pub use cache_system::prelude::*;

// Common external dependencies
pub use anyhow;
pub use async_trait;
pub use tokio;
