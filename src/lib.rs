//! # PersistHaus
//!
//! A unit of work persistence engine: entity graphs are written in dependency order on
//! one connection, many entities go out in batches, and committed changes evict cache
//! entries and notify observers.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use persisthaus::prelude::*;
//!
//! static PRODUCTS: TableStrategy = TableStrategy::new("products", &["sku"], &["qty"]);
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Product {
//!     state: EntityState,
//!     pub qty: i64,
//! }
//!
//! impl Entity for Product {
//!     fn entity_type(&self) -> &'static str { "product" }
//!     fn sql(&self) -> &dyn SqlStrategy { &PRODUCTS }
//!     fn state(&self) -> &EntityState { &self.state }
//!     fn state_mut(&mut self) -> &mut EntityState { &mut self.state }
//!     fn bind_fields(&self, statement: &mut Statement, index: usize) -> usize {
//!         statement.bind(index, self.qty)
//!     }
//! }
//!
//! impl Loadable for Product {
//!     fn type_name() -> &'static str { "product" }
//!     fn strategy() -> &'static dyn SqlStrategy { &PRODUCTS }
//!     fn from_row(row: &Row) -> Result<Self, PersistError> {
//!         let key = PrimaryKey::natural(vec![row.require("sku")?.clone()])?;
//!         Ok(Self { state: EntityState::loaded(key), qty: row.get_i64("qty")? })
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let persisthaus = PersistHaus::new(AppConfig::load()?).await?;
//!     let products = persisthaus.store::<Product>("main")?;
//!
//!     let key = PrimaryKey::natural(vec![ColumnValue::text("sku", "A-1")?])?;
//!     let product = Product { state: EntityState::with_key(key.clone()), qty: 3 };
//!     products.insert(product).await?;
//!
//!     let found = products.find_by_key(&key).await?;
//!     println!("Found: {:?}", found);
//!     Ok(())
//! }
//! ```

/// Conditional debug logging macros
/// These macros only compile in code when the `debug-logging` feature is enabled
#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

pub mod core;
pub mod errors;
pub mod prelude;

// Re-export the main public types for convenience
pub use core::PersistHaus;
pub use errors::PersistHausError;

// Re-export centralized config
pub use config::{
    AppConfig, BackendKind, CacheConfig, DatabaseConfig, SignalConfig, SubsystemConfig,
    UnitOfWorkConfig,
};

// Re-export internal crates used by the public API
pub use cache_system;
pub use signal_system;
pub use store_object;
pub use type_mapping;

// Re-export external dependencies used in public API
pub use async_trait;
pub use sqlx;
