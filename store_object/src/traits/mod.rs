//! Traits for persistence operations
//!
//! This module contains the traits that define the interface between entities, their
//! statement text and the typed stores.

pub mod core;
pub mod entity;
pub mod sql_strategy;

// Re-export all public items for convenience
pub use core::StoreObject;
pub use entity::{Entity, Loadable};
pub use sql_strategy::{SqlStrategy, TableStrategy};
