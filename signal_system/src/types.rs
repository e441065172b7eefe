//! Type definitions for signal system

use crate::event::DatabaseEvent;
use std::sync::Arc;
use thiserror::Error;

/// Event callback type that returns a Result
pub type EventCallback = Arc<dyn Fn(&DatabaseEvent) -> anyhow::Result<()> + Send + Sync>;

/// Identifier handed out when a callback is registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(pub u64);

/// Signal system errors
#[derive(Error, Debug)]
pub enum SignalError {
    #[error("Callback limit reached: {0}")]
    TooManyCallbacks(usize),

    #[error("Callback registry lock poisoned")]
    Poisoned,
}

/// Counters describing callback activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalStats {
    pub callbacks: usize,
    pub events_emitted: u64,
    pub callback_failures: u64,
}
