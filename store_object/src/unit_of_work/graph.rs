//! Recursive insert, update and delete of entity graphs
//!
//! Owners are written before their parts on insert, removed parts are deleted before
//! their owner is updated, and parts without a database cascade are deleted before
//! their owner. Each entity is handled at most once per operation kind in a unit of work.

use super::{entity_statement, validate_graph, UnitOfWork};
use crate::errors::PersistError;
use crate::primary_key::PrimaryKey;
use crate::status::{EntityStatus, KeySource, Operation};
use crate::traits::Entity;
use futures::future::BoxFuture;
use signal_system::EventType;
use tracing::debug;
use uuid::Uuid;

impl UnitOfWork {
    /// Insert a new entity and all of its new parts
    pub async fn insert(&mut self, entity: &mut dyn Entity) -> Result<(), PersistError> {
        if entity.status() != EntityStatus::New {
            return Err(PersistError::invalid(format!(
                "{} is {:?}; only new entities can be inserted",
                entity.entity_type(),
                entity.status()
            )));
        }
        validate_graph(entity, Operation::Insert)?;
        self.insert_graph(entity).await
    }

    /// Write whatever the graph's statuses ask for: new parts are inserted, changed
    /// ones updated and removed ones deleted
    pub async fn update(&mut self, entity: &mut dyn Entity) -> Result<(), PersistError> {
        validate_graph(entity, Operation::Update)?;
        self.update_graph(entity).await
    }

    /// Delete an entity with its parts
    pub async fn delete(&mut self, entity: &mut dyn Entity) -> Result<(), PersistError> {
        validate_graph(entity, Operation::Delete)?;
        self.delete_graph(entity).await
    }

    /// Make sure a new entity has a key, then let it hand the key down to its parts
    pub(crate) async fn ensure_key(
        &mut self,
        entity: &mut (dyn Entity + '_),
    ) -> Result<(), PersistError> {
        if entity.primary_key().is_none() {
            let key = match entity.key_source() {
                KeySource::Sequence { column, sequence } => {
                    let value = self.next_sequence_value(sequence).await?;
                    PrimaryKey::surrogate_numeric(column, value)?
                }
                KeySource::Generated { column } => {
                    PrimaryKey::surrogate_uuid(column, Uuid::new_v4())?
                }
                KeySource::Assigned | KeySource::Inherited => {
                    return Err(PersistError::no_primary_key(
                        entity.entity_type(),
                        Operation::Insert,
                    ))
                }
            };
            debug!(entity_type = entity.entity_type(), key = %key, "assigned key");
            entity.state_mut().assign_key(key)?;
        }
        entity.on_key_assigned()
    }

    pub(crate) fn insert_graph<'a, 'e: 'a>(
        &'a mut self,
        entity: &'a mut (dyn Entity + 'e),
    ) -> BoxFuture<'a, Result<(), PersistError>> {
        Box::pin(async move {
            if entity.status() != EntityStatus::New {
                return Ok(());
            }
            self.ensure_key(entity).await?;
            let tracking = Self::tracking_key(entity, Operation::Insert)?;
            if let Some(status) = self.visited.get(&tracking).copied() {
                debug!(entity = %tracking.1, "already inserted in this unit of work");
                entity.set_status(status);
                return Ok(());
            }
            self.visited.insert(tracking, EntityStatus::Existing);

            let statement = entity_statement(entity, Operation::Insert)?;
            self.execute_for(entity, Operation::Insert, &statement).await?;
            let key = entity.require_key(Operation::Insert)?.clone();
            self.record(EventType::Insert, entity.entity_type(), key);

            for part in entity.parts_mut() {
                self.insert_graph(part).await?;
            }
            entity.set_status(EntityStatus::Existing);
            Ok(())
        })
    }

    pub(crate) fn update_graph<'a, 'e: 'a>(
        &'a mut self,
        entity: &'a mut (dyn Entity + 'e),
    ) -> BoxFuture<'a, Result<(), PersistError>> {
        Box::pin(async move {
            match entity.status() {
                EntityStatus::New => return self.insert_graph(entity).await,
                EntityStatus::Deleted | EntityStatus::CascadeDeleted => {
                    return self.delete_graph(entity).await
                }
                EntityStatus::Failed => return Err(failed(entity)),
                EntityStatus::Existing | EntityStatus::Changed => {}
            }
            let tracking = Self::tracking_key(entity, Operation::Update)?;
            if let Some(status) = self.visited.get(&tracking).copied() {
                entity.set_status(status);
                return Ok(());
            }
            self.visited.insert(tracking, EntityStatus::Existing);

            self.delete_removed_parts(entity).await?;

            if entity.status() == EntityStatus::Changed {
                let statement = entity_statement(entity, Operation::Update)?;
                self.execute_for(entity, Operation::Update, &statement).await?;
                let key = entity.require_key(Operation::Update)?.clone();
                self.record(EventType::Update, entity.entity_type(), key);
            }

            self.save_parts(entity).await?;
            // Only once every part is written
            entity.set_status(EntityStatus::Existing);
            entity.release_removed_parts();
            Ok(())
        })
    }

    pub(crate) fn delete_graph<'a, 'e: 'a>(
        &'a mut self,
        entity: &'a mut (dyn Entity + 'e),
    ) -> BoxFuture<'a, Result<(), PersistError>> {
        Box::pin(async move {
            match entity.status() {
                // Never written, nothing to remove
                EntityStatus::New => return Ok(()),
                EntityStatus::Failed => return Err(failed(entity)),
                // The database already removed the row
                EntityStatus::CascadeDeleted => {
                    self.mark_cascaded(entity);
                    return Ok(());
                }
                EntityStatus::Existing | EntityStatus::Changed | EntityStatus::Deleted => {}
            }
            let tracking = Self::tracking_key(entity, Operation::Delete)?;
            if let Some(status) = self.visited.get(&tracking).copied() {
                entity.set_status(status);
                return Ok(());
            }
            self.visited.insert(tracking, EntityStatus::Deleted);

            self.delete_uncascaded_parts(entity).await?;

            let statement = entity_statement(entity, Operation::Delete)?;
            self.execute_for(entity, Operation::Delete, &statement).await?;
            entity.set_status(EntityStatus::Deleted);
            let key = entity.require_key(Operation::Delete)?.clone();
            self.record(EventType::Delete, entity.entity_type(), key);

            self.cascade_parts(entity);
            Ok(())
        })
    }

    /// Parts marked for removal go before their owner's own statement
    pub(crate) async fn delete_removed_parts(
        &mut self,
        entity: &mut (dyn Entity + '_),
    ) -> Result<(), PersistError> {
        for part in entity.parts_mut() {
            if part.status().is_removal() {
                self.delete_graph(part).await?;
            }
        }
        Ok(())
    }

    /// New parts are inserted, persisted ones saved recursively
    pub(crate) async fn save_parts(
        &mut self,
        entity: &mut (dyn Entity + '_),
    ) -> Result<(), PersistError> {
        entity.on_key_assigned()?;
        for part in entity.parts_mut() {
            match part.status() {
                EntityStatus::New | EntityStatus::Existing | EntityStatus::Changed => {
                    self.update_graph(part).await?
                }
                EntityStatus::Deleted | EntityStatus::CascadeDeleted | EntityStatus::Failed => {}
            }
        }
        Ok(())
    }

    /// Parts the database will not remove for us are deleted explicitly first
    pub(crate) async fn delete_uncascaded_parts(
        &mut self,
        entity: &mut (dyn Entity + '_),
    ) -> Result<(), PersistError> {
        for part in entity.parts_mut() {
            if !part.deleted_by_owner_cascade() {
                self.delete_graph(part).await?;
            }
        }
        Ok(())
    }

    /// After the owner's delete, cascaded parts are gone as well
    pub(crate) fn cascade_parts(&mut self, entity: &mut (dyn Entity + '_)) {
        for part in entity.parts_mut() {
            if part.deleted_by_owner_cascade() {
                self.mark_cascaded(part);
            }
        }
    }

    /// Record a database-side removal; no statement is issued
    pub(crate) fn mark_cascaded(&mut self, entity: &mut (dyn Entity + '_)) {
        if matches!(entity.status(), EntityStatus::New | EntityStatus::Failed) {
            return;
        }
        let Some(tracking) = entity.tracking_key().map(|key| (Operation::Delete, key)) else {
            return;
        };
        if let Some(status) = self.visited.get(&tracking).copied() {
            entity.set_status(status);
            return;
        }
        self.visited.insert(tracking, EntityStatus::CascadeDeleted);
        entity.set_status(EntityStatus::CascadeDeleted);
        if let Some(key) = entity.primary_key().cloned() {
            self.record(EventType::CascadeDelete, entity.entity_type(), key);
        }
        for part in entity.parts_mut() {
            self.mark_cascaded(part);
        }
    }
}

fn failed(entity: &dyn Entity) -> PersistError {
    PersistError::invalid(format!(
        "{} {} failed earlier in this unit of work",
        entity.entity_type(),
        entity.primary_key().map(PrimaryKey::value_list).unwrap_or_default()
    ))
}
