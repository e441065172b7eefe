//! Entity traits
//!
//! This module defines what the engine needs from an in-memory business object: its
//! state, its statement text, how to bind its fields, and the parts it owns.

use crate::connection::Row;
use crate::errors::PersistError;
use crate::primary_key::PrimaryKey;
use crate::status::{EntityState, EntityStatus, KeySource, Operation};
use crate::traits::sql_strategy::SqlStrategy;
use crate::unit_of_work::UnitOfWork;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::fmt::Debug;
use type_mapping::Statement;

/// An object mapped to one row plus the parts it owns
pub trait Entity: Send + Sync + Debug {
    /// Logical type name, used for cache namespaces, events and dedup tracking
    fn entity_type(&self) -> &'static str;

    fn sql(&self) -> &dyn SqlStrategy;

    fn state(&self) -> &EntityState;

    fn state_mut(&mut self) -> &mut EntityState;

    /// Bind the non-key fields from `index`; returns the next free index
    fn bind_fields(&self, statement: &mut Statement, index: usize) -> usize;

    fn key_source(&self) -> KeySource {
        KeySource::Assigned
    }

    /// Called once the key is known, before the insert. Owners derive part keys here.
    fn on_key_assigned(&mut self) -> Result<(), PersistError> {
        Ok(())
    }

    fn parts(&self) -> Vec<&dyn Entity> {
        Vec::new()
    }

    fn parts_mut(&mut self) -> Vec<&mut dyn Entity> {
        Vec::new()
    }

    /// The row goes away through an `ON DELETE CASCADE` when the owner is deleted
    fn deleted_by_owner_cascade(&self) -> bool {
        false
    }

    /// Domain rules checked before any statement is issued
    fn validate(&self) -> Result<(), PersistError> {
        Ok(())
    }

    /// Drop parts that were removed, so owned collections match the database
    fn release_removed_parts(&mut self) {}

    fn primary_key(&self) -> Option<&PrimaryKey> {
        self.state().key()
    }

    fn status(&self) -> EntityStatus {
        self.state().status()
    }

    fn set_status(&mut self, status: EntityStatus) {
        self.state_mut().set_status(status);
    }

    fn require_key(&self, operation: Operation) -> Result<&PrimaryKey, PersistError> {
        self.primary_key()
            .ok_or_else(|| PersistError::no_primary_key(self.entity_type(), operation))
    }

    /// Key of this entity in a unit of work's visited set and in caches
    fn tracking_key(&self) -> Option<String> {
        self.primary_key()
            .map(|key| format!("{}#{}", self.entity_type(), key.string_key()))
    }

    /// Entities order by key within one type
    fn compare_to(&self, other: &dyn Entity) -> Result<Ordering, PersistError> {
        if self.entity_type() != other.entity_type() {
            return Err(PersistError::Incomparable {
                left: self.entity_type().to_string(),
                right: other.entity_type().to_string(),
                reason: "entity types differ".to_string(),
            });
        }
        let mine = self.require_key(Operation::Select)?;
        let theirs = other.require_key(Operation::Select)?;
        mine.compare_to(theirs)
    }
}

/// Entities that can be read back by key
#[async_trait]
pub trait Loadable: Entity + Sized {
    fn type_name() -> &'static str;

    fn strategy() -> &'static dyn SqlStrategy;

    /// Build from a row; the result must carry its key with status `Existing`
    fn from_row(row: &Row) -> Result<Self, PersistError>;

    /// Read owned parts after the row itself was loaded
    async fn load_parts(&mut self, _uow: &mut UnitOfWork) -> Result<(), PersistError> {
        Ok(())
    }
}
