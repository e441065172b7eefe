//! Error types for the PersistHaus crate
//!
//! This module contains all error types that can be returned by PersistHaus operations.

use cache_system::CacheError;
use config::ConfigError;
use store_object::PersistError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistHausError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Store object not found: {0}")]
    StoreNotFound(String),

    #[error("Store object already registered: {0}")]
    StoreAlreadyRegistered(String),
}
