use crate::event::DatabaseEvent;
use crate::types::{CallbackId, EventCallback, SignalError, SignalStats};
use config::SignalConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Signal manager for entity lifecycle notifications
pub struct SignalManager {
    callbacks: RwLock<Vec<(CallbackId, EventCallback)>>,
    next_id: AtomicU64,
    emitted: AtomicU64,
    failures: AtomicU64,
    max_callbacks: usize,
}

impl std::fmt::Debug for SignalManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalManager")
            .field("callback_count", &self.callback_count())
            .field("max_callbacks", &self.max_callbacks)
            .finish()
    }
}

impl SignalManager {
    pub fn new(config: &SignalConfig) -> Self {
        Self {
            callbacks: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            emitted: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            max_callbacks: config.max_callbacks,
        }
    }

    /// Add event callback
    pub fn add_callback<F>(&self, callback: F) -> Result<CallbackId, SignalError>
    where
        F: Fn(&DatabaseEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut callbacks = self.callbacks.write().map_err(|_| SignalError::Poisoned)?;
        if callbacks.len() >= self.max_callbacks {
            return Err(SignalError::TooManyCallbacks(self.max_callbacks));
        }
        let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        callbacks.push((id, Arc::new(callback)));
        Ok(id)
    }

    /// Observe events for one entity type only
    pub fn observe<F>(&self, entity_type: &str, callback: F) -> Result<CallbackId, SignalError>
    where
        F: Fn(&DatabaseEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let entity_type = entity_type.to_string();
        self.add_callback(move |event| {
            if event.entity_type == entity_type {
                callback(event)
            } else {
                Ok(())
            }
        })
    }

    pub fn remove_callback(&self, id: CallbackId) -> bool {
        match self.callbacks.write() {
            Ok(mut callbacks) => {
                let before = callbacks.len();
                callbacks.retain(|(cid, _)| *cid != id);
                callbacks.len() != before
            }
            Err(_) => false,
        }
    }

    /// Emit event to all subscribers; a failing callback is logged and does not stop the others
    pub fn emit(&self, event: &DatabaseEvent) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
        // Snapshot so callbacks may register further callbacks
        let callbacks: Vec<(CallbackId, EventCallback)> = match self.callbacks.read() {
            Ok(callbacks) => callbacks.clone(),
            Err(_) => return,
        };
        for (id, callback) in callbacks {
            if let Err(e) = callback(event) {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    callback = id.0,
                    entity_type = %event.entity_type,
                    record_key = %event.record_key,
                    "signal callback failed: {e:#}"
                );
            }
        }
    }

    /// Clear all callbacks
    pub fn clear_callbacks(&self) {
        if let Ok(mut callbacks) = self.callbacks.write() {
            callbacks.clear();
        }
    }

    /// Get number of registered callbacks
    pub fn callback_count(&self) -> usize {
        self.callbacks.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn stats(&self) -> SignalStats {
        SignalStats {
            callbacks: self.callback_count(),
            events_emitted: self.emitted.load(Ordering::Relaxed),
            callback_failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for SignalManager {
    fn default() -> Self {
        Self::new(&SignalConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;
    use std::sync::Mutex;

    #[test]
    fn test_observe_filters_by_entity_type() {
        let manager = SignalManager::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        manager
            .observe("order", move |event| {
                sink.lock().unwrap().push(event.record_key.clone());
                Ok(())
            })
            .unwrap();

        manager.emit(&DatabaseEvent::new(EventType::Delete, "order", "k1"));
        manager.emit(&DatabaseEvent::new(EventType::Delete, "customer", "k2"));

        assert_eq!(*seen.lock().unwrap(), vec!["k1".to_string()]);
        assert_eq!(manager.stats().events_emitted, 2);
    }

    #[test]
    fn test_failing_callback_does_not_block_others() {
        let manager = SignalManager::default();
        let count = Arc::new(AtomicU64::new(0));
        manager
            .add_callback(|_| Err(anyhow::anyhow!("observer exploded")))
            .unwrap();
        let counter = count.clone();
        manager
            .add_callback(move |_| {
                counter.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })
            .unwrap();

        manager.emit(&DatabaseEvent::new(EventType::Insert, "order", "k"));
        assert_eq!(count.load(Ordering::Relaxed), 1);
        assert_eq!(manager.stats().callback_failures, 1);
    }

    #[test]
    fn test_callback_limit_and_removal() {
        let manager = SignalManager::new(&SignalConfig { max_callbacks: 1 });
        let id = manager.add_callback(|_| Ok(())).unwrap();
        assert!(matches!(
            manager.add_callback(|_| Ok(())),
            Err(SignalError::TooManyCallbacks(1))
        ));
        assert!(manager.remove_callback(id));
        assert!(!manager.remove_callback(id));
        assert_eq!(manager.callback_count(), 0);
    }
}
