//! Store Object - Unit of work persistence engine
//!
//! This crate maps entity graphs onto relational rows. A [`UnitOfWork`] owns one
//! connection and writes whole graphs in dependency order; an [`Engine`] runs units of
//! work with a bounded join and publishes cache evictions and lifecycle events after
//! commit. [`EntityStore`] wraps both behind a typed per-entity API.

pub mod cache_router;
pub mod connection;
pub mod engine;
pub mod errors;
pub mod generic_store;
pub mod prelude;
pub mod primary_key;
pub mod status;
pub mod traits;
pub mod unit_of_work;

pub use cache_router::CacheRouter;
pub use cache_system::CacheParams;
pub use connection::{
    Connection, ConnectionProvider, ConnectionRegistry, DriverError, MemoryDatabase,
    MemoryProvider, PostgresProvider, Row, StatementOutcome,
};
pub use engine::Engine;
pub use errors::{BatchFailure, PersistError};
pub use generic_store::EntityStore;
pub use primary_key::{KeyKind, PrimaryKey};
pub use status::{EntityState, EntityStatus, KeySource, Operation};
pub use traits::*;
pub use unit_of_work::{BatchReport, Mutation, UnitOfWork};
