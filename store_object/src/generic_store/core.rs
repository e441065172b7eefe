use crate::connection::Row;
use crate::engine::Engine;
use crate::errors::PersistError;
use crate::primary_key::PrimaryKey;
use crate::status::Operation;
use crate::traits::{Entity, Loadable, SqlStrategy};
use crate::unit_of_work::{BatchReport, UnitOfWork};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use tracing::warn;
use type_mapping::Statement;

/// Typed store for one entity type on one subsystem
///
/// The `StoreObject` methods each run in their own unit of work. The `*_in` methods
/// join a unit of work the caller already has, so several stores can write together.
pub struct EntityStore<E> {
    pub(crate) engine: Engine,
    pub(crate) subsystem: String,
    pub(crate) _phantom: PhantomData<fn() -> E>,
}

impl<E> Clone for EntityStore<E> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            subsystem: self.subsystem.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<E: Loadable> std::fmt::Debug for EntityStore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("entity_type", &E::type_name())
            .field("subsystem", &self.subsystem)
            .field("has_signals", &self.has_signals())
            .field("has_cache", &self.has_cache())
            .finish()
    }
}

impl<E: Loadable> EntityStore<E> {
    pub fn new(engine: Engine, subsystem: &str) -> Self {
        Self {
            engine,
            subsystem: subsystem.to_string(),
            _phantom: PhantomData,
        }
    }

    pub fn subsystem(&self) -> &str {
        &self.subsystem
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn has_signals(&self) -> bool {
        self.engine.signals().is_some()
    }

    pub fn has_cache(&self) -> bool {
        self.engine.caches().params_for(E::type_name()).is_some()
    }

    pub async fn insert_in(&self, uow: &mut UnitOfWork, entity: &mut E) -> Result<(), PersistError> {
        uow.insert(entity).await
    }

    pub async fn update_in(&self, uow: &mut UnitOfWork, entity: &mut E) -> Result<(), PersistError> {
        uow.update(entity).await
    }

    pub async fn delete_in(&self, uow: &mut UnitOfWork, entity: &mut E) -> Result<(), PersistError> {
        uow.delete(entity).await
    }

    pub async fn insert_many_in(
        &self,
        uow: &mut UnitOfWork,
        entities: &mut [E],
    ) -> Result<BatchReport, PersistError> {
        batch_in(uow, Operation::Insert, entities).await
    }

    pub async fn update_many_in(
        &self,
        uow: &mut UnitOfWork,
        entities: &mut [E],
    ) -> Result<BatchReport, PersistError> {
        batch_in(uow, Operation::Update, entities).await
    }

    pub async fn delete_many_in(
        &self,
        uow: &mut UnitOfWork,
        entities: &mut [E],
    ) -> Result<BatchReport, PersistError> {
        batch_in(uow, Operation::Delete, entities).await
    }

    /// Read one entity with its parts; the cache is not consulted
    pub async fn find_by_key_in(
        &self,
        uow: &mut UnitOfWork,
        key: &PrimaryKey,
    ) -> Result<Option<E>, PersistError> {
        find_in::<E>(uow, key).await
    }
}

impl<E> EntityStore<E>
where
    E: Loadable + Serialize + DeserializeOwned + 'static,
{
    /// Inserted entities go to the cache; a failing cache only costs a later miss
    pub(crate) async fn write_through(&self, entities: &[E]) {
        for entity in entities {
            let Some(key) = entity.primary_key() else {
                continue;
            };
            if let Err(e) = self.engine.caches().put(E::type_name(), key, entity).await {
                warn!(entity_type = E::type_name(), key = %key, error = %e, "cache write failed");
            }
        }
    }
}

pub(crate) async fn batch_in<E: Entity>(
    uow: &mut UnitOfWork,
    operation: Operation,
    entities: &mut [E],
) -> Result<BatchReport, PersistError> {
    let mut refs: Vec<&mut dyn Entity> = entities.iter_mut().map(|e| e as &mut dyn Entity).collect();
    match operation {
        Operation::Insert => uow.insert_batch(&mut refs).await,
        Operation::Update => uow.update_batch(&mut refs).await,
        Operation::Delete => uow.delete_batch(&mut refs).await,
        Operation::Select => Err(PersistError::invalid("select is not a batch operation")),
    }
}

pub(crate) async fn find_in<E: Loadable>(
    uow: &mut UnitOfWork,
    key: &PrimaryKey,
) -> Result<Option<E>, PersistError> {
    let mut statement = Statement::new(E::strategy().select_sql(&key.sql_where_expression(None)));
    key.bind_parameters(&mut statement, 1);
    let rows: Vec<Row> = uow.query(&statement).await?;
    match rows.first() {
        None => Ok(None),
        Some(row) => {
            let mut entity = E::from_row(row)?;
            entity.load_parts(uow).await?;
            Ok(Some(entity))
        }
    }
}
