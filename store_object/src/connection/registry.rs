//! Subsystem to connection provider mapping
//!
//! Built once at application startup and torn down explicitly with
//! [`ConnectionRegistry::shutdown`].

use crate::connection::{
    Connection, ConnectionProvider, MemoryDatabase, MemoryProvider, PostgresProvider,
};
use crate::errors::PersistError;
use config::{AppConfig, BackendKind};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    providers: BTreeMap<String, Arc<dyn ConnectionProvider>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a provider for every configured subsystem
    pub async fn from_config(config: &AppConfig) -> Result<Self, PersistError> {
        let mut registry = Self::new();
        for (name, subsystem) in &config.subsystems {
            let provider: Arc<dyn ConnectionProvider> = match subsystem.backend {
                BackendKind::Memory => Arc::new(MemoryProvider::new(MemoryDatabase::new())),
                BackendKind::Postgres => {
                    let database = subsystem.database.clone().ok_or_else(|| {
                        PersistError::invalid(format!(
                            "subsystem {} uses postgres without a database section",
                            name
                        ))
                    })?;
                    let provider = PostgresProvider::connect(database, subsystem.pooled)
                        .await
                        .map_err(|source| PersistError::Connection {
                            subsystem: name.clone(),
                            source,
                        })?;
                    Arc::new(provider)
                }
            };
            info!(subsystem = %name, backend = %subsystem.backend, pooled = subsystem.pooled, "registered subsystem");
            registry.register(name, provider);
        }
        Ok(registry)
    }

    /// Add or replace the provider for `subsystem`
    pub fn register(&mut self, subsystem: &str, provider: Arc<dyn ConnectionProvider>) {
        self.providers.insert(subsystem.to_string(), provider);
    }

    pub fn provider(&self, subsystem: &str) -> Result<Arc<dyn ConnectionProvider>, PersistError> {
        self.providers
            .get(subsystem)
            .cloned()
            .ok_or_else(|| PersistError::UnknownSubsystem(subsystem.to_string()))
    }

    pub async fn acquire(&self, subsystem: &str) -> Result<Box<dyn Connection>, PersistError> {
        self.provider(subsystem)?
            .acquire()
            .await
            .map_err(|source| PersistError::Connection {
                subsystem: subsystem.to_string(),
                source,
            })
    }

    pub fn subsystems(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, subsystem: &str) -> bool {
        self.providers.contains_key(subsystem)
    }

    /// Close every provider's pooled resources
    pub async fn shutdown(&self) {
        for (name, provider) in &self.providers {
            provider.close().await;
            info!(subsystem = %name, "closed subsystem");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_config_and_unknown_subsystem() {
        let config = AppConfig::in_memory("main");
        let registry = ConnectionRegistry::from_config(&config).await.unwrap();
        assert_eq!(registry.subsystems(), vec!["main"]);
        assert!(registry.acquire("main").await.is_ok());

        match registry.acquire("reporting").await {
            Err(PersistError::UnknownSubsystem(name)) => assert_eq!(name, "reporting"),
            other => panic!("expected unknown subsystem, got {:?}", other.map(|_| ())),
        }

        registry.shutdown().await;
        assert!(registry.contains("main"));
    }
}
