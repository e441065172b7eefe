//! Core PersistHaus functionality
//!
//! This module contains the main PersistHaus struct and its implementation,
//! providing centralized coordination for subsystems, units of work, caching, and signals.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use cache_system::{CacheParams, EntityCache, build_backend};
use config::AppConfig;
use futures::future::BoxFuture;
use signal_system::SignalManager;
use store_object::traits::{Loadable, StoreObject};
use store_object::{
    CacheRouter, Connection, ConnectionRegistry, Engine, EntityStore, PersistError, UnitOfWork,
};
use tracing::info;

use crate::errors::PersistHausError;

/// Main PersistHaus coordinator that owns the subsystems and the store objects
pub struct PersistHaus {
    config: AppConfig,
    engine: Engine,
    signals: Arc<SignalManager>,
    stores: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for PersistHaus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistHaus")
            .field("subsystems", &self.engine.registry().subsystems())
            .field("stores", &self.stores.keys().collect::<Vec<_>>())
            .field("cache_enabled", &self.engine.caches().is_enabled())
            .finish()
    }
}

impl PersistHaus {
    /// Open every configured subsystem
    pub async fn new(config: AppConfig) -> Result<Self, PersistHausError> {
        config.validate()?;
        let registry = ConnectionRegistry::from_config(&config).await?;
        Self::with_registry(config, registry)
    }

    /// Load configuration from the environment, then open it
    pub async fn from_env() -> Result<Self, PersistHausError> {
        let config = AppConfig::load()?;
        Self::new(config).await
    }

    /// Use providers registered by the caller instead of the configured backends
    pub fn with_registry(
        config: AppConfig,
        registry: ConnectionRegistry,
    ) -> Result<Self, PersistHausError> {
        let signals = Arc::new(SignalManager::new(&config.signal));
        let default_cache = build_backend(&config.cache)?
            .map(|backend| CacheParams::new(backend, None, &config.cache.key_prefix));
        let engine = Engine::new(Arc::new(registry), config.unit_of_work.clone())
            .with_caches(CacheRouter::new(default_cache))
            .with_signals(signals.clone());

        info!(
            subsystems = ?engine.registry().subsystems(),
            cache = ?config.cache.backend,
            "persisthaus ready"
        );
        Ok(Self {
            config,
            engine,
            signals,
            stores: HashMap::new(),
        })
    }

    /// Replace the cache routing; stores created afterwards use the new one
    pub fn set_caches(&mut self, caches: CacheRouter) {
        self.engine = self.engine.clone().with_caches(caches);
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        self.engine.registry()
    }

    pub fn signals(&self) -> &Arc<SignalManager> {
        &self.signals
    }

    /// Typed store for `E` on `subsystem`
    pub fn store<E: Loadable>(&self, subsystem: &str) -> Result<EntityStore<E>, PersistHausError> {
        if !self.engine.registry().contains(subsystem) {
            return Err(PersistError::UnknownSubsystem(subsystem.to_string()).into());
        }
        Ok(EntityStore::new(self.engine.clone(), subsystem))
    }

    /// Run `work` in its own unit of work on `subsystem`
    pub async fn run<T, F>(&self, subsystem: &str, work: F) -> Result<T, PersistError>
    where
        T: Send + 'static,
        F: for<'u> FnOnce(&'u mut UnitOfWork) -> BoxFuture<'u, Result<T, PersistError>>
            + Send
            + 'static,
    {
        self.engine.run(subsystem, work).await
    }

    /// Register a store object with a given name
    pub fn register_store<T>(&mut self, name: String, store: T) -> Result<(), PersistHausError>
    where
        T: StoreObject + Send + Sync + 'static,
    {
        if self.stores.contains_key(&name) {
            return Err(PersistHausError::StoreAlreadyRegistered(name));
        }

        self.stores.insert(name, Box::new(store));
        Ok(())
    }

    /// Get a registered store object by name
    pub fn get_store<T>(&self, name: &str) -> Result<&T, PersistHausError>
    where
        T: StoreObject + Send + Sync + 'static,
    {
        self.stores
            .get(name)
            .and_then(|store| store.downcast_ref::<T>())
            .ok_or_else(|| PersistHausError::StoreNotFound(name.to_string()))
    }

    /// List all registered store names
    pub fn list_stores(&self) -> Vec<&String> {
        self.stores.keys().collect()
    }

    /// Remove a store object by name
    pub fn unregister_store(&mut self, name: &str) -> Result<(), PersistHausError> {
        self.stores
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| PersistHausError::StoreNotFound(name.to_string()))
    }

    /// Check that every subsystem hands out a connection and the cache answers
    pub async fn health_check(&self) -> Result<(), PersistHausError> {
        for subsystem in self.engine.registry().subsystems() {
            let mut connection = self.engine.registry().acquire(subsystem).await?;
            if let Err(source) = connection.release().await {
                return Err(PersistError::Connection {
                    subsystem: subsystem.to_string(),
                    source,
                }
                .into());
            }
        }
        for params in self.engine.caches().all_params() {
            params.backend.ping().await?;
        }
        Ok(())
    }

    /// Close pooled connections of every subsystem
    pub async fn shutdown(&self) {
        self.engine.registry().shutdown().await;
        info!("persisthaus shut down");
    }
}
