//! Unit of work execution
//!
//! [`Engine::run`] gives a closure its own unit of work on a spawned task and waits
//! for it with a bounded join. Commit, rollback and connection release happen on that
//! task; cache eviction and lifecycle events follow a successful commit.

use crate::cache_router::CacheRouter;
use crate::connection::ConnectionRegistry;
use crate::errors::PersistError;
use crate::unit_of_work::{Mutation, UnitOfWork};
use config::UnitOfWorkConfig;
use futures::future::BoxFuture;
use signal_system::{EventType, SignalManager};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Engine {
    registry: Arc<ConnectionRegistry>,
    caches: CacheRouter,
    signals: Option<Arc<SignalManager>>,
    settings: UnitOfWorkConfig,
}

impl Engine {
    pub fn new(registry: Arc<ConnectionRegistry>, settings: UnitOfWorkConfig) -> Self {
        Self {
            registry,
            caches: CacheRouter::default(),
            signals: None,
            settings,
        }
    }

    pub fn with_caches(mut self, caches: CacheRouter) -> Self {
        self.caches = caches;
        self
    }

    pub fn with_signals(mut self, signals: Arc<SignalManager>) -> Self {
        self.signals = Some(signals);
        self
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn caches(&self) -> &CacheRouter {
        &self.caches
    }

    pub fn signals(&self) -> Option<&Arc<SignalManager>> {
        self.signals.as_ref()
    }

    pub fn settings(&self) -> &UnitOfWorkConfig {
        &self.settings
    }

    /// Open a unit of work on `subsystem`; finish it with [`Engine::finish`]
    pub async fn begin(&self, subsystem: &str) -> Result<UnitOfWork, PersistError> {
        let connection = self.registry.acquire(subsystem).await?;
        let uow = UnitOfWork::new(subsystem, connection, self.settings.batch_size);
        debug!(uow = %uow.id(), subsystem, "began unit of work");
        Ok(uow)
    }

    /// Run `work` in a fresh unit of work, committing when it returns `Ok`.
    ///
    /// The caller waits at most the configured join timeout. When that elapses the
    /// worker is aborted and `PersistError::Timeout` is returned. Only `work` itself
    /// can be cut short: finishing runs on its own task, so a commit that has begun
    /// still evicts caches and emits its events after the caller gave up.
    pub async fn run<T, F>(&self, subsystem: &str, work: F) -> Result<T, PersistError>
    where
        T: Send + 'static,
        F: for<'u> FnOnce(&'u mut UnitOfWork) -> BoxFuture<'u, Result<T, PersistError>>
            + Send
            + 'static,
    {
        let uow = self.begin(subsystem).await?;
        let id = uow.id();
        let engine = self.clone();
        let handle = tokio::spawn(async move {
            let mut uow = uow;
            let result = work(&mut uow).await;
            let finishing = tokio::spawn(async move { engine.finish(uow, result).await });
            match finishing.await {
                Ok(result) => result,
                Err(join_error) => Err(PersistError::Worker(join_error.to_string())),
            }
        });
        let abort = handle.abort_handle();
        let timeout = self.settings.join_timeout();

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                error!(uow = %id, error = %join_error, "unit of work worker died");
                Err(PersistError::Worker(join_error.to_string()))
            }
            Err(_) => {
                warn!(uow = %id, subsystem, seconds = timeout.as_secs(), "unit of work timed out");
                abort.abort();
                Err(PersistError::Timeout {
                    subsystem: subsystem.to_string(),
                    seconds: timeout.as_secs(),
                })
            }
        }
    }

    /// Commit on `Ok`, roll back on `Err`, always release the connection
    pub async fn finish<T>(
        &self,
        mut uow: UnitOfWork,
        result: Result<T, PersistError>,
    ) -> Result<T, PersistError> {
        let result = match result {
            Ok(_) if uow.is_rollback_only() => Err(PersistError::Worker(format!(
                "unit of work {} had a failed statement and cannot commit",
                uow.id()
            ))),
            other => other,
        };

        match result {
            Ok(value) => {
                if let Err(source) = uow.commit().await {
                    error!(uow = %uow.id(), error = %source, "commit failed");
                    uow.release().await;
                    return Err(PersistError::Connection {
                        subsystem: uow.subsystem().to_string(),
                        source,
                    });
                }
                info!(
                    uow = %uow.id(),
                    subsystem = uow.subsystem(),
                    statements = uow.statement_count(),
                    "committed unit of work"
                );
                let mutations = uow.take_mutations();
                let id = uow.id();
                let subsystem = uow.subsystem().to_string();
                uow.release().await;
                self.publish(id, &subsystem, &mutations).await?;
                Ok(value)
            }
            Err(e) => {
                warn!(uow = %uow.id(), error = %e, "rolling back unit of work");
                if let Err(rollback_error) = uow.rollback().await {
                    error!(uow = %uow.id(), error = %rollback_error, "rollback failed");
                }
                uow.release().await;
                Err(e)
            }
        }
    }

    /// Evict stale cache entries, then notify observers
    async fn publish(
        &self,
        unit_of_work: Uuid,
        subsystem: &str,
        mutations: &[Mutation],
    ) -> Result<(), PersistError> {
        let mut first_failure = None;
        for mutation in mutations {
            if mutation.event_type == EventType::Insert {
                continue;
            }
            if let Err(e) = self.caches.evict(mutation.entity_type, &mutation.key).await {
                warn!(uow = %unit_of_work, error = %e, "cache eviction failed");
                if first_failure.is_none() {
                    first_failure = Some(e);
                }
            }
        }

        if let Some(signals) = &self.signals {
            for mutation in mutations {
                signals.emit(&mutation.to_event(subsystem, unit_of_work));
            }
        }

        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{MemoryDatabase, MemoryProvider};
    use crate::status::Operation;
    use std::time::Duration;
    use type_mapping::Statement;

    async fn engine(timeout_seconds: u64) -> (MemoryDatabase, Engine) {
        let db = MemoryDatabase::new();
        db.create_table("notes", &["id"]).await;
        let mut registry = ConnectionRegistry::new();
        registry.register("main", Arc::new(MemoryProvider::new(db.clone())));
        let engine = Engine::new(Arc::new(registry), UnitOfWorkConfig::new(10, timeout_seconds));
        (db, engine)
    }

    fn note(id: i64) -> Statement {
        let mut statement = Statement::new("INSERT INTO notes (id) VALUES (?)");
        statement.bind(1, id);
        statement
    }

    #[tokio::test]
    async fn test_run_commits_on_ok_and_rolls_back_on_err() {
        let (db, engine) = engine(5).await;

        let affected = engine
            .run("main", |uow| {
                Box::pin(async move { uow.execute(Operation::Insert, &note(1)).await })
            })
            .await
            .unwrap();
        assert_eq!(affected, 1);
        assert_eq!(db.row_count("notes").await, 1);

        let result: Result<(), PersistError> = engine
            .run("main", |uow| {
                Box::pin(async move {
                    uow.execute(Operation::Insert, &note(2)).await?;
                    Err(PersistError::invalid("changed my mind"))
                })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(db.row_count("notes").await, 1);
    }

    #[tokio::test]
    async fn test_swallowed_failure_still_rolls_back() {
        let (db, engine) = engine(5).await;
        let result = engine
            .run("main", |uow| {
                Box::pin(async move {
                    uow.execute(Operation::Insert, &note(1)).await?;
                    // Duplicate key, error ignored by the closure
                    let _ = uow.execute(Operation::Insert, &note(1)).await;
                    Ok::<_, PersistError>(())
                })
            })
            .await;
        assert!(matches!(result, Err(PersistError::Worker(_))));
        assert_eq!(db.row_count("notes").await, 0);
    }

    #[tokio::test]
    async fn test_join_timeout_fails_fast() {
        let (db, engine) = engine(1).await;
        let result = engine
            .run("main", |uow| {
                Box::pin(async move {
                    uow.execute(Operation::Insert, &note(1)).await?;
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok::<_, PersistError>(())
                })
            })
            .await;
        match result {
            Err(PersistError::Timeout { subsystem, seconds }) => {
                assert_eq!(subsystem, "main");
                assert_eq!(seconds, 1);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(db.row_count("notes").await, 0);
    }

    #[tokio::test]
    async fn test_failed_statement_names_the_callers_operation() {
        let (_db, engine) = engine(5).await;
        let result = engine
            .run("main", |uow| {
                Box::pin(async move {
                    uow.execute(Operation::Insert, &note(1)).await?;
                    uow.execute(Operation::Insert, &note(1)).await
                })
            })
            .await;
        match result {
            Err(PersistError::Execution { operation, .. }) => {
                assert_eq!(operation, Operation::Insert)
            }
            other => panic!("expected an execution error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_subsystem() {
        let (_db, engine) = engine(5).await;
        let result = engine
            .run("reporting", |_uow| Box::pin(async move { Ok::<_, PersistError>(()) }))
            .await;
        assert!(matches!(result, Err(PersistError::UnknownSubsystem(_))));
    }
}
