//! Signal system for entity lifecycle notifications
//!
//! Observers register callbacks with a [`SignalManager`]; the persistence engine emits a
//! [`DatabaseEvent`] for every entity it inserted, updated, deleted or saw removed by a
//! database cascade, once the enclosing unit of work has committed.

pub mod event;
pub mod manager;
pub mod prelude;
pub mod types;

pub use config::SignalConfig;
pub use event::{DatabaseEvent, EventType};
pub use manager::SignalManager;
pub use types::{CallbackId, EventCallback, SignalError, SignalStats};
