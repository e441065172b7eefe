//! Unit of work
//!
//! A unit of work owns one connection of one subsystem for its whole life. Every
//! statement of a graph or batch operation goes through it, so the whole graph commits
//! or rolls back together. Dedup tracking, recorded mutations and the rollback-only
//! flag all live here; the engine decides when to commit and what to publish.
//!
//! Dedup spans every call on one unit of work, so nested stores sharing it write an
//! entity at most once per operation kind.

mod batch;
mod graph;

pub use batch::BatchReport;

use crate::connection::{Connection, DriverError, Row};
use crate::errors::PersistError;
use crate::primary_key::PrimaryKey;
use crate::status::{EntityStatus, Operation};
use crate::traits::{Entity, SqlStrategy};
use config::BackendKind;
use signal_system::{DatabaseEvent, EventType};
use std::collections::HashMap;
use tracing::{debug, warn};
use type_mapping::Statement;
use uuid::Uuid;

/// A change the unit of work made, published once it commits
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub event_type: EventType,
    pub entity_type: &'static str,
    pub key: PrimaryKey,
}

impl Mutation {
    pub fn to_event(&self, subsystem: &str, unit_of_work: Uuid) -> DatabaseEvent {
        DatabaseEvent::new(self.event_type, self.entity_type, self.key.string_key())
            .with_key_columns(self.key.all_columns().into_iter().cloned().collect())
            .with_subsystem(subsystem)
            .with_unit_of_work(unit_of_work)
    }
}

pub struct UnitOfWork {
    id: Uuid,
    subsystem: String,
    connection: Box<dyn Connection>,
    /// Status each entity reached per operation, kept for the whole unit of work
    visited: HashMap<(Operation, String), EntityStatus>,
    mutations: Vec<Mutation>,
    batch_size: usize,
    statements: usize,
    rollback_only: bool,
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.id)
            .field("subsystem", &self.subsystem)
            .field("backend", &self.connection.backend())
            .field("statements", &self.statements)
            .field("mutations", &self.mutations.len())
            .field("rollback_only", &self.rollback_only)
            .finish()
    }
}

impl UnitOfWork {
    pub fn new(subsystem: &str, connection: Box<dyn Connection>, batch_size: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            subsystem: subsystem.to_string(),
            connection,
            visited: HashMap::new(),
            mutations: Vec::new(),
            batch_size: batch_size.max(1),
            statements: 0,
            rollback_only: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn subsystem(&self) -> &str {
        &self.subsystem
    }

    pub fn backend(&self) -> BackendKind {
        self.connection.backend()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn set_batch_size(&mut self, batch_size: usize) {
        self.batch_size = batch_size.max(1);
    }

    /// Statements executed so far
    pub fn statement_count(&self) -> usize {
        self.statements
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    /// Set once any statement failed; the unit of work can then only roll back
    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    /// Whether this unit of work already wrote `entity` for `operation`
    pub fn has_visited(&self, entity: &dyn Entity, operation: Operation) -> bool {
        entity
            .tracking_key()
            .is_some_and(|key| self.visited.contains_key(&(operation, key)))
    }

    /// Run a caller-built write statement; `operation` names it in errors
    pub async fn execute(
        &mut self,
        operation: Operation,
        statement: &Statement,
    ) -> Result<u64, PersistError> {
        statement.check_bound()?;
        debug!(uow = %self.id, sql = statement.sql(), "executing statement");
        match self.connection.execute(statement).await {
            Ok(affected) => {
                self.statements += 1;
                Ok(affected)
            }
            Err(source) => {
                self.rollback_only = true;
                Err(PersistError::execution("statement", None, operation, source))
            }
        }
    }

    /// Run a caller-built query; rows come back in the order the backend returned them
    pub async fn query(&mut self, statement: &Statement) -> Result<Vec<Row>, PersistError> {
        statement.check_bound()?;
        debug!(uow = %self.id, sql = statement.sql(), "running query");
        match self.connection.query(statement).await {
            Ok(rows) => {
                self.statements += 1;
                Ok(rows)
            }
            Err(source) => {
                self.rollback_only = true;
                Err(PersistError::execution("statement", None, Operation::Select, source))
            }
        }
    }

    pub async fn next_sequence_value(&mut self, sequence: &str) -> Result<i64, PersistError> {
        let statement = self.connection.sequence_statement(sequence);
        let rows = self.query(&statement).await?;
        rows.first()
            .ok_or_else(|| PersistError::invalid(format!("sequence {} returned no row", sequence)))?
            .get_i64("nextval")
    }

    pub(crate) async fn commit(&mut self) -> Result<(), DriverError> {
        self.connection.commit().await
    }

    pub(crate) async fn rollback(&mut self) -> Result<(), DriverError> {
        self.connection.rollback().await
    }

    pub(crate) async fn release(&mut self) {
        if let Err(e) = self.connection.release().await {
            warn!(uow = %self.id, error = %e, "failed to release connection");
        }
    }

    pub(crate) fn take_mutations(&mut self) -> Vec<Mutation> {
        std::mem::take(&mut self.mutations)
    }

    fn record(&mut self, event_type: EventType, entity_type: &'static str, key: PrimaryKey) {
        self.mutations.push(Mutation {
            event_type,
            entity_type,
            key,
        });
    }

    fn tracking_key(
        entity: &dyn Entity,
        operation: Operation,
    ) -> Result<(Operation, String), PersistError> {
        entity
            .tracking_key()
            .map(|key| (operation, key))
            .ok_or_else(|| PersistError::no_primary_key(entity.entity_type(), operation))
    }

    /// Execute the statement written for `entity`; a failure marks it `Failed`
    async fn execute_for(
        &mut self,
        entity: &mut (dyn Entity + '_),
        operation: Operation,
        statement: &Statement,
    ) -> Result<u64, PersistError> {
        debug!(
            uow = %self.id,
            entity_type = entity.entity_type(),
            %operation,
            sql = statement.sql(),
            "executing"
        );
        match self.connection.execute(statement).await {
            Ok(affected) => {
                self.statements += 1;
                Ok(affected)
            }
            Err(source) => {
                self.fail(entity, operation);
                warn!(
                    uow = %self.id,
                    entity_type = entity.entity_type(),
                    %operation,
                    code = source.code.as_deref().unwrap_or("-"),
                    "statement failed"
                );
                Err(PersistError::execution(
                    entity.entity_type(),
                    entity.primary_key(),
                    operation,
                    source,
                ))
            }
        }
    }

    fn fail(&mut self, entity: &mut (dyn Entity + '_), operation: Operation) {
        entity.set_status(EntityStatus::Failed);
        if let Some(key) = entity.tracking_key() {
            self.visited.insert((operation, key), EntityStatus::Failed);
        }
        self.rollback_only = true;
    }
}

/// Build the statement for one entity; key columns bind first on insert and last on update
pub(crate) fn entity_statement(
    entity: &dyn Entity,
    operation: Operation,
) -> Result<Statement, PersistError> {
    let key = entity.require_key(operation)?;
    let sql = entity.sql();
    let statement = match operation {
        Operation::Insert => {
            let mut statement = Statement::new(sql.insert_sql());
            let next = key.bind_parameters(&mut statement, 1);
            entity.bind_fields(&mut statement, next);
            statement
        }
        Operation::Update => {
            let mut statement = Statement::new(sql.update_sql(&key.sql_where_expression(None)));
            let next = entity.bind_fields(&mut statement, 1);
            key.bind_parameters(&mut statement, next);
            statement
        }
        Operation::Delete => {
            let mut statement = Statement::new(sql.delete_sql(&key.sql_where_expression(None)));
            key.bind_parameters(&mut statement, 1);
            statement
        }
        Operation::Select => {
            let mut statement = Statement::new(sql.select_sql(&key.sql_where_expression(None)));
            key.bind_parameters(&mut statement, 1);
            statement
        }
    };
    statement.check_bound()?;
    Ok(statement)
}

/// Checks run over the whole graph before the first statement
pub(crate) fn validate_graph(entity: &dyn Entity, operation: Operation) -> Result<(), PersistError> {
    let status = entity.status();
    if status == EntityStatus::Failed {
        return Err(PersistError::invalid(format!(
            "{} {} failed earlier; reset its status before writing it again",
            entity.entity_type(),
            entity.primary_key().map(PrimaryKey::value_list).unwrap_or_default()
        )));
    }
    if status != EntityStatus::New && entity.primary_key().is_none() {
        return Err(PersistError::no_primary_key(entity.entity_type(), operation));
    }
    entity.validate()?;
    for part in entity.parts() {
        validate_graph(part, operation)?;
    }
    Ok(())
}
