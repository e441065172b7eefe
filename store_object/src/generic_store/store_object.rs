//! Generic store implementations
//!
//! Each call is one unit of work: the entities move onto the worker task, and come
//! back with their final statuses once it committed.

use super::core::{batch_in, find_in, EntityStore};
use crate::errors::PersistError;
use crate::primary_key::PrimaryKey;
use crate::status::Operation;
use crate::traits::{Loadable, StoreObject};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

#[async_trait]
impl<E> StoreObject for EntityStore<E>
where
    E: Loadable + Clone + Serialize + DeserializeOwned + 'static,
{
    type Model = E;

    async fn insert(&self, entity: Self::Model) -> Result<Self::Model, PersistError> {
        let inserted = self
            .engine
            .run(&self.subsystem, move |uow| {
                Box::pin(async move {
                    let mut entity = entity;
                    uow.insert(&mut entity).await?;
                    Ok::<_, PersistError>(entity)
                })
            })
            .await?;
        self.write_through(std::slice::from_ref(&inserted)).await;
        Ok(inserted)
    }

    async fn update(&self, entity: Self::Model) -> Result<Self::Model, PersistError> {
        self.engine
            .run(&self.subsystem, move |uow| {
                Box::pin(async move {
                    let mut entity = entity;
                    uow.update(&mut entity).await?;
                    Ok::<_, PersistError>(entity)
                })
            })
            .await
    }

    async fn delete(&self, entity: Self::Model) -> Result<Self::Model, PersistError> {
        self.engine
            .run(&self.subsystem, move |uow| {
                Box::pin(async move {
                    let mut entity = entity;
                    uow.delete(&mut entity).await?;
                    Ok::<_, PersistError>(entity)
                })
            })
            .await
    }

    async fn insert_many(
        &self,
        entities: Vec<Self::Model>,
    ) -> Result<Vec<Self::Model>, PersistError> {
        let inserted = self.run_batch(Operation::Insert, entities).await?;
        self.write_through(&inserted).await;
        Ok(inserted)
    }

    async fn update_many(
        &self,
        entities: Vec<Self::Model>,
    ) -> Result<Vec<Self::Model>, PersistError> {
        self.run_batch(Operation::Update, entities).await
    }

    async fn delete_many(
        &self,
        entities: Vec<Self::Model>,
    ) -> Result<Vec<Self::Model>, PersistError> {
        self.run_batch(Operation::Delete, entities).await
    }

    async fn find_by_key(&self, key: &PrimaryKey) -> Result<Option<Self::Model>, PersistError> {
        // Try cache first
        if let Some(cached) = self.engine.caches().get::<E>(E::type_name(), key).await? {
            debug!(entity_type = E::type_name(), key = %key, "served from cache");
            return Ok(Some(cached));
        }

        let owned = key.clone();
        let found = self
            .engine
            .run(&self.subsystem, move |uow| {
                Box::pin(async move { find_in::<E>(uow, &owned).await })
            })
            .await?;

        if let Some(entity) = &found {
            self.engine.caches().put(E::type_name(), key, entity).await?;
        }
        Ok(found)
    }
}

impl<E> EntityStore<E>
where
    E: Loadable + Clone + Serialize + DeserializeOwned + 'static,
{
    async fn run_batch(
        &self,
        operation: Operation,
        entities: Vec<E>,
    ) -> Result<Vec<E>, PersistError> {
        self.engine
            .run(&self.subsystem, move |uow| {
                Box::pin(async move {
                    let mut entities = entities;
                    let report = batch_in(uow, operation, &mut entities).await?;
                    debug!(
                        %operation,
                        submitted = report.submitted,
                        batches = report.batches,
                        skipped = report.skipped,
                        "batch finished"
                    );
                    Ok::<_, PersistError>(entities)
                })
            })
            .await
    }
}
