//! Connection contract
//!
//! A [`ConnectionProvider`] hands out connections with auto-commit off. The engine only
//! ever executes statements, queries, commits, rolls back and releases; how the
//! connection was opened is the provider's business.

pub mod memory;
pub mod postgres;
pub mod registry;

use crate::errors::PersistError;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use config::BackendKind;
use rust_decimal::Decimal;
use std::fmt::Debug;
use thiserror::Error;
use type_mapping::{ColumnValue, DecodeError, Statement};
use uuid::Uuid;

pub use memory::{MemoryDatabase, MemoryProvider};
pub use postgres::PostgresProvider;
pub use registry::ConnectionRegistry;

/// Failure reported by a database driver, normalized across backends
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct DriverError {
    /// SQLSTATE when the backend reports one
    pub code: Option<String>,
    pub message: String,
}

impl DriverError {
    pub fn new(code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }
}

impl From<sqlx::Error> for DriverError {
    fn from(error: sqlx::Error) -> Self {
        let code = error
            .as_database_error()
            .and_then(|db| db.code().map(|c| c.into_owned()));
        Self::new(code, error.to_string())
    }
}

/// Per-statement result of a batch submission, in submission order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementOutcome {
    Affected(u64),
    /// Executed, row count unknown
    SuccessNoInfo,
    ExecutionFailed,
}

impl StatementOutcome {
    pub fn is_success(self) -> bool {
        !matches!(self, StatementOutcome::ExecutionFailed)
    }
}

/// The submission itself broke off; `outcomes` covers the statements that ran before
#[derive(Error, Debug, Clone)]
#[error("batch aborted after {} statements", outcomes.len())]
pub struct BatchExecutionError {
    pub outcomes: Vec<StatementOutcome>,
    #[source]
    pub source: DriverError,
}

/// One result row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<ColumnValue>,
}

impl Row {
    pub fn new(columns: Vec<ColumnValue>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[ColumnValue] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ColumnValue> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// Replace the column of the same name, or append it
    pub(crate) fn set(&mut self, column: ColumnValue) {
        match self.columns.iter_mut().find(|c| c.name() == column.name()) {
            Some(slot) => *slot = column,
            None => self.columns.push(column),
        }
    }

    /// Column by name; missing columns are a decode failure
    pub fn require(&self, name: &str) -> Result<&ColumnValue, PersistError> {
        self.get(name)
            .ok_or_else(|| decode_failure(name, "any", "", "column missing from row"))
    }

    pub fn get_i64(&self, name: &str) -> Result<i64, PersistError> {
        self.typed(name, "numeric", ColumnValue::as_i64)
    }

    pub fn get_decimal(&self, name: &str) -> Result<Decimal, PersistError> {
        self.typed(name, "decimal", ColumnValue::as_decimal)
    }

    pub fn get_text(&self, name: &str) -> Result<String, PersistError> {
        self.typed(name, "text", |c| c.as_text().map(str::to_string))
    }

    /// Text column that may be NULL
    pub fn get_optional_text(&self, name: &str) -> Result<Option<String>, PersistError> {
        let column = self.require(name)?;
        if !column.has_value() {
            return Ok(None);
        }
        self.get_text(name).map(Some)
    }

    pub fn get_date(&self, name: &str) -> Result<NaiveDate, PersistError> {
        self.typed(name, "date", ColumnValue::as_date)
    }

    pub fn get_timestamp(&self, name: &str) -> Result<NaiveDateTime, PersistError> {
        self.typed(name, "timestamp", ColumnValue::as_timestamp)
    }

    pub fn get_uuid(&self, name: &str) -> Result<Uuid, PersistError> {
        self.typed(name, "unique_id", ColumnValue::as_uuid)
    }

    fn typed<T>(
        &self,
        name: &str,
        kind: &str,
        read: impl Fn(&ColumnValue) -> Option<T>,
    ) -> Result<T, PersistError> {
        let column = self.require(name)?;
        read(column).ok_or_else(|| {
            decode_failure(name, kind, &column.to_string(), "column holds another kind")
        })
    }
}

fn decode_failure(name: &str, kind: &str, value: &str, reason: &str) -> PersistError {
    PersistError::Decode(DecodeError {
        name: name.to_string(),
        kind: kind.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    })
}

/// A connection with auto-commit off, owned by one unit of work
#[async_trait]
pub trait Connection: Send {
    fn backend(&self) -> BackendKind;

    /// Run one statement, returning the affected row count
    async fn execute(&mut self, statement: &Statement) -> Result<u64, DriverError>;

    /// Run statements in order; one failing statement does not stop the rest
    async fn execute_batch(
        &mut self,
        statements: &[Statement],
    ) -> Result<Vec<StatementOutcome>, BatchExecutionError>;

    async fn query(&mut self, statement: &Statement) -> Result<Vec<Row>, DriverError>;

    async fn commit(&mut self) -> Result<(), DriverError>;

    async fn rollback(&mut self) -> Result<(), DriverError>;

    /// Give the connection back; an open transaction is rolled back
    async fn release(&mut self) -> Result<(), DriverError>;

    /// Statement drawing the next value of `sequence` as a single `nextval` column
    fn sequence_statement(&self, sequence: &str) -> Statement {
        Statement::new(format!("SELECT NEXTVAL('{}') AS nextval", sequence))
    }
}

/// Source of connections for one subsystem
#[async_trait]
pub trait ConnectionProvider: Send + Sync + Debug {
    fn backend(&self) -> BackendKind;

    async fn acquire(&self) -> Result<Box<dyn Connection>, DriverError>;

    /// Close pooled resources
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_typed_access() {
        let row = Row::new(vec![
            ColumnValue::numeric("id", 4).unwrap(),
            ColumnValue::text("name", "widget").unwrap(),
            ColumnValue::null("note", type_mapping::ColumnKind::Text).unwrap(),
        ]);
        assert_eq!(row.get_i64("id").unwrap(), 4);
        assert_eq!(row.get_text("name").unwrap(), "widget");
        assert_eq!(row.get_optional_text("note").unwrap(), None);
        assert!(matches!(row.get_i64("name"), Err(PersistError::Decode(_))));
        assert!(matches!(row.require("missing"), Err(PersistError::Decode(_))));
    }
}
