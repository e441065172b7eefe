//! Entity lifecycle within a unit of work

use crate::errors::PersistError;
use crate::primary_key::PrimaryKey;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    /// Not yet written
    New,
    /// Persisted and unchanged since
    Existing,
    /// Persisted with pending field changes
    Changed,
    /// Marked for removal, or removed by an explicit delete
    Deleted,
    /// Removed by a database cascade; no statement of its own
    CascadeDeleted,
    /// A statement for this entity failed; never retried in the same unit of work
    Failed,
}

impl EntityStatus {
    pub fn is_removal(self) -> bool {
        matches!(self, EntityStatus::Deleted | EntityStatus::CascadeDeleted)
    }

    pub fn is_persisted(self) -> bool {
        matches!(self, EntityStatus::Existing | EntityStatus::Changed)
    }
}

/// Operation a statement was issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Insert,
    Update,
    Delete,
    Select,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Insert => write!(f, "insert"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
            Operation::Select => write!(f, "select"),
        }
    }
}

/// Where an entity's key comes from when it is inserted without one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Caller supplies the key before insert
    Assigned,
    /// Numeric surrogate drawn from a database sequence
    Sequence {
        column: &'static str,
        sequence: &'static str,
    },
    /// Random unique identifier generated in process
    Generated { column: &'static str },
    /// Composite key set by the owner in `Entity::on_key_assigned`
    Inherited,
}

/// Key and status carried by every entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    key: Option<PrimaryKey>,
    status: EntityStatus,
}

impl Default for EntityState {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityState {
    pub fn new() -> Self {
        Self {
            key: None,
            status: EntityStatus::New,
        }
    }

    pub fn with_key(key: PrimaryKey) -> Self {
        Self {
            key: Some(key),
            status: EntityStatus::New,
        }
    }

    /// State of an entity read back from the database
    pub fn loaded(key: PrimaryKey) -> Self {
        Self {
            key: Some(key),
            status: EntityStatus::Existing,
        }
    }

    pub fn key(&self) -> Option<&PrimaryKey> {
        self.key.as_ref()
    }

    pub fn status(&self) -> EntityStatus {
        self.status
    }

    pub fn set_status(&mut self, status: EntityStatus) {
        self.status = status;
    }

    /// Keys are immutable once assigned; re-assigning an equal key is a no-op
    pub fn assign_key(&mut self, key: PrimaryKey) -> Result<(), PersistError> {
        match &self.key {
            Some(existing) if *existing == key => Ok(()),
            Some(existing) => Err(PersistError::invalid(format!(
                "primary key {} is already assigned, cannot change it to {}",
                existing, key
            ))),
            None => {
                self.key = Some(key);
                Ok(())
            }
        }
    }

    /// A mutable field was set
    pub fn touch(&mut self) {
        if self.status == EntityStatus::Existing {
            self.status = EntityStatus::Changed;
        }
    }

    /// Returns false when there is nothing persisted to remove
    pub fn mark_deleted(&mut self) -> bool {
        if self.status.is_persisted() {
            self.status = EntityStatus::Deleted;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_only_moves_existing() {
        let mut state = EntityState::new();
        state.touch();
        assert_eq!(state.status(), EntityStatus::New);

        state.set_status(EntityStatus::Existing);
        state.touch();
        assert_eq!(state.status(), EntityStatus::Changed);
        state.touch();
        assert_eq!(state.status(), EntityStatus::Changed);
    }

    #[test]
    fn test_key_is_immutable_once_assigned() {
        let mut state = EntityState::new();
        state.assign_key(PrimaryKey::surrogate_numeric("id", 1).unwrap()).unwrap();
        state.assign_key(PrimaryKey::surrogate_numeric("id", 1).unwrap()).unwrap();
        assert!(state
            .assign_key(PrimaryKey::surrogate_numeric("id", 2).unwrap())
            .is_err());
    }

    #[test]
    fn test_mark_deleted() {
        let mut state = EntityState::new();
        assert!(!state.mark_deleted());
        assert_eq!(state.status(), EntityStatus::New);

        let mut loaded = EntityState::loaded(PrimaryKey::surrogate_numeric("id", 1).unwrap());
        assert!(loaded.mark_deleted());
        assert_eq!(loaded.status(), EntityStatus::Deleted);
    }
}
