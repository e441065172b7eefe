//! Entity lifecycle event types and definitions
//!
//! This module defines the structure of events that flow through the signal system
//! once a unit of work has committed.

use serde::{Deserialize, Serialize};
use type_mapping::ColumnValue;
use uuid::Uuid;

/// Entity lifecycle event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Insert,
    Update,
    Delete,
    /// Removed by a database-level cascade, no DELETE statement was issued
    CascadeDelete,
}

impl EventType {
    /// Whether the entity no longer exists after this event
    pub fn is_removal(self) -> bool {
        matches!(self, EventType::Delete | EventType::CascadeDelete)
    }
}

/// Entity lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseEvent {
    pub id: Uuid,
    pub event_type: EventType,
    /// Entity type name
    pub entity_type: String,
    /// Canonical primary key string
    pub record_key: String,
    /// Primary key columns in declared order, parent columns first
    pub key_columns: Vec<ColumnValue>,
    /// Subsystem the change was written to
    pub subsystem: Option<String>,
    /// Unit of work that produced the change
    pub unit_of_work: Option<Uuid>,
    /// Event timestamp (UTC)
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl DatabaseEvent {
    pub fn new(event_type: EventType, entity_type: impl Into<String>, record_key: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            entity_type: entity_type.into(),
            record_key: record_key.into(),
            key_columns: Vec::new(),
            subsystem: None,
            unit_of_work: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_key_columns(mut self, columns: Vec<ColumnValue>) -> Self {
        self.key_columns = columns;
        self
    }

    pub fn with_subsystem(mut self, subsystem: impl Into<String>) -> Self {
        self.subsystem = Some(subsystem.into());
        self
    }

    pub fn with_unit_of_work(mut self, id: Uuid) -> Self {
        self.unit_of_work = Some(id);
        self
    }

    /// Look up one key column by name
    pub fn key_column(&self, name: &str) -> Option<&ColumnValue> {
        self.key_columns.iter().find(|c| c.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_lookup() {
        let event = DatabaseEvent::new(EventType::CascadeDelete, "order_line", "C[...]")
            .with_key_columns(vec![
                ColumnValue::numeric("order_id", 7).unwrap(),
                ColumnValue::numeric("line_no", 2).unwrap(),
            ])
            .with_subsystem("orders");
        assert!(event.event_type.is_removal());
        assert_eq!(event.key_column("line_no").and_then(|c| c.as_i64()), Some(2));
        assert!(event.key_column("sku").is_none());
        assert_eq!(event.subsystem.as_deref(), Some("orders"));
    }

    #[test]
    fn test_event_serializes_to_json() {
        let event = DatabaseEvent::new(EventType::Update, "product", "N(...)")
            .with_key_columns(vec![ColumnValue::text("sku", "A-1").unwrap()]);
        let json = serde_json::to_string(&event).unwrap();
        let back: DatabaseEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type, EventType::Update);
        assert_eq!(back.key_columns.len(), 1);
        assert!(back.key_columns[0].value_equals(&event.key_columns[0]));
    }
}
