//! # Configuration Management for PersistHaus
//!
//! This crate provides centralized configuration structures for all PersistHaus components:
//! the named database subsystems, the cache back-end, unit-of-work tuning and the signal system.
//!
//! ## TOML File Configuration
//! ```toml
//! [subsystems.orders]
//! backend = "postgres"
//! pooled = true
//!
//! [subsystems.orders.database]
//! host = "localhost"
//! port = 5432
//! database = "orders"
//! username = "postgres"
//! password = "password"
//! min_connections = 1
//! max_connections = 10
//! connection_timeout_seconds = 30
//! idle_timeout_seconds = 600
//! max_lifetime_seconds = 3600
//!
//! [subsystems.scratch]
//! backend = "memory"
//!
//! [cache]
//! backend = "redis"
//! redis_url = "redis://localhost:6379"
//! default_ttl_seconds = 3600
//! key_prefix = "persisthaus"
//! connection_timeout_ms = 3000
//!
//! [unit_of_work]
//! batch_size = 100
//! join_timeout_seconds = 30
//!
//! [signal]
//! max_callbacks = 100
//! ```
//!
//! Load configuration:
//! ```rust,ignore
//! use config::AppConfig;
//!
//! // Load from persisthaus.toml (or the path in PERSISTHAUS_CONFIG)
//! let config = AppConfig::load()?;
//!
//! // Or load from custom path
//! let config = AppConfig::from_file("config/production.toml")?;
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use std::{env, path::Path};
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "./persisthaus.toml";
const CONFIG_PATH_VAR: &str = "PERSISTHAUS_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Environment variable error: {0}")]
    Env(#[from] env::VarError),
    #[error("Dotenvy error: {0}")]
    Dotenvy(#[from] dotenvy::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logical database targets keyed by subsystem name
    pub subsystems: BTreeMap<String, SubsystemConfig>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub unit_of_work: UnitOfWorkConfig,
    #[serde(default)]
    pub signal: SignalConfig,
}

/// Database backend behind a subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Postgres,
    Memory,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Postgres => write!(f, "postgres"),
            BackendKind::Memory => write!(f, "memory"),
        }
    }
}

/// One named logical database target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsystemConfig {
    pub backend: BackendKind,
    /// Share connections through a pool, or open one per unit of work
    #[serde(default = "default_pooled")]
    pub pooled: bool,
    /// Required for the postgres backend
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub connection_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
    pub max_lifetime_seconds: u64,
}

/// Cache back-end selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    #[default]
    None,
    Local,
    Redis,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackendKind,
    #[serde(default)]
    pub redis_url: String,
    /// TTL applied to `put` calls that do not carry their own
    pub default_ttl_seconds: u64,
    /// Namespace for every cache key
    pub key_prefix: String,
    pub connection_timeout_ms: u64,
}

/// Unit of work tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitOfWorkConfig {
    /// Statements per batch submission
    pub batch_size: usize,
    /// How long a caller waits on a spawned unit of work
    pub join_timeout_seconds: u64,
}

/// Signal system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    pub max_callbacks: usize,
}

fn default_pooled() -> bool {
    true
}

impl AppConfig {
    /// Load configuration from TOML file specified in .env or defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config = {
            // A missing .env file is fine, the variable may come from the process environment
            if let Err(e) = dotenvy::dotenv() {
                if !e.not_found() {
                    return Err(e.into());
                }
            }

            if let Ok(config_path) = env::var(CONFIG_PATH_VAR) {
                Self::from_file(&config_path)
            } else if Path::new(DEFAULT_CONFIG_PATH).exists() {
                Self::from_file(DEFAULT_CONFIG_PATH)
            } else {
                Err(ConfigError::Invalid(format!(
                    "Config path must be specified in .env file as {} or in {} file",
                    CONFIG_PATH_VAR, DEFAULT_CONFIG_PATH
                )))
            }
        }?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Single in-memory subsystem, no cache; handy for tests and demos
    pub fn in_memory(subsystem: &str) -> Self {
        let mut subsystems = BTreeMap::new();
        subsystems.insert(
            subsystem.to_string(),
            SubsystemConfig {
                backend: BackendKind::Memory,
                pooled: true,
                database: None,
            },
        );
        Self {
            subsystems,
            cache: CacheConfig::default(),
            unit_of_work: UnitOfWorkConfig::default(),
            signal: SignalConfig::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.subsystems.is_empty() {
            return Err(ConfigError::Invalid(
                "At least one subsystem must be configured".to_string(),
            ));
        }

        for (name, subsystem) in &self.subsystems {
            if name.is_empty() {
                return Err(ConfigError::Invalid(
                    "Subsystem name cannot be empty".to_string(),
                ));
            }
            match (subsystem.backend, &subsystem.database) {
                (BackendKind::Postgres, None) => {
                    return Err(ConfigError::Invalid(format!(
                        "Subsystem '{}' uses the postgres backend but has no [database] section",
                        name
                    )));
                }
                (BackendKind::Postgres, Some(database)) => database.validate(name)?,
                (BackendKind::Memory, _) => {}
            }
        }

        // Cache validations
        if self.cache.backend == CacheBackendKind::Redis && self.cache.redis_url.is_empty() {
            return Err(ConfigError::Invalid(
                "Redis URL cannot be empty".to_string(),
            ));
        }
        if self.cache.backend != CacheBackendKind::None && self.cache.key_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "Cache key_prefix cannot be empty".to_string(),
            ));
        }

        // Unit of work validations
        if self.unit_of_work.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "Unit of work batch_size must be greater than 0".to_string(),
            ));
        }
        if self.unit_of_work.join_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "Unit of work join_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    /// Create a new database configuration
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        host: String,
        port: u16,
        database: String,
        username: String,
        password: String,
        min_connections: u32,
        max_connections: u32,
        connection_timeout_seconds: u64,
        idle_timeout_seconds: u64,
        max_lifetime_seconds: u64,
    ) -> Self {
        Self {
            host,
            port,
            database,
            username,
            password,
            min_connections,
            max_connections,
            connection_timeout_seconds,
            idle_timeout_seconds,
            max_lifetime_seconds,
        }
    }

    /// Build connection string
    pub fn connection_string(&self) -> String {
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database
        )
    }

    fn validate(&self, subsystem: &str) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "Database host cannot be empty (subsystem '{}')",
                subsystem
            )));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid(format!(
                "Database port cannot be zero (subsystem '{}')",
                subsystem
            )));
        }
        if self.database.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "Database name cannot be empty (subsystem '{}')",
                subsystem
            )));
        }
        if self.username.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "Database username cannot be empty (subsystem '{}')",
                subsystem
            )));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid(format!(
                "Database max_connections must be greater than 0 (subsystem '{}')",
                subsystem
            )));
        }
        if self.min_connections > self.max_connections {
            return Err(ConfigError::Invalid(format!(
                "Database min_connections cannot be greater than max_connections (subsystem '{}')",
                subsystem
            )));
        }
        if self.connection_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(format!(
                "Database connection_timeout_seconds must be greater than 0 (subsystem '{}')",
                subsystem
            )));
        }
        Ok(())
    }
}

impl CacheConfig {
    /// Create a new cache configuration
    pub fn new(
        backend: CacheBackendKind,
        redis_url: String,
        default_ttl_seconds: u64,
        key_prefix: String,
    ) -> Self {
        Self {
            backend,
            redis_url,
            default_ttl_seconds,
            key_prefix,
            connection_timeout_ms: 3000,
        }
    }

    /// Get TTL as Duration
    pub fn ttl_duration(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::None,
            redis_url: "redis://localhost:6379".to_string(),
            default_ttl_seconds: 3600, // 1 hour
            key_prefix: "persisthaus".to_string(),
            connection_timeout_ms: 3000,
        }
    }
}

impl UnitOfWorkConfig {
    pub fn new(batch_size: usize, join_timeout_seconds: u64) -> Self {
        Self {
            batch_size,
            join_timeout_seconds,
        }
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_seconds)
    }
}

impl Default for UnitOfWorkConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            join_timeout_seconds: 30,
        }
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self { max_callbacks: 100 }
    }
}
