//! Convenience re-exports for common signal-system usage

// Core signal system components
pub use crate::event::{DatabaseEvent, EventType};
pub use crate::manager::SignalManager;
pub use crate::types::{CallbackId, EventCallback, SignalError, SignalStats};

// Re-export centralized config
pub use config::SignalConfig;
