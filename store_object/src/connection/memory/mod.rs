//! In-memory backend
//!
//! Tables live behind one shared lock. Each connection reads and writes a private
//! snapshot and journals its writes; commit replays the journal onto the shared tables
//! as one step, rollback throws it away. Sequences are not transactional.

mod parser;

use crate::connection::{
    BatchExecutionError, Connection, ConnectionProvider, DriverError, Row, StatementOutcome,
};
use async_trait::async_trait;
use config::BackendKind;
use parser::Command;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use type_mapping::{ColumnValue, Statement, Value};

const UNIQUE_VIOLATION: &str = "23505";
const NOT_NULL_VIOLATION: &str = "23502";
const CHECK_VIOLATION: &str = "23514";
const UNDEFINED_TABLE: &str = "42P01";
const UNDEFINED_COLUMN: &str = "42703";
const UNDEFINED_OBJECT: &str = "42704";
const PROTOCOL_VIOLATION: &str = "08P01";
const CONNECTION_DOES_NOT_EXIST: &str = "08003";

type CheckFn = Arc<dyn Fn(&Row) -> bool + Send + Sync>;

/// Named row predicate enforced on insert and update
#[derive(Clone)]
struct CheckConstraint {
    name: String,
    check: CheckFn,
}

impl fmt::Debug for CheckConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckConstraint")
            .field("name", &self.name)
            .finish()
    }
}

/// `ON DELETE CASCADE` from the owning table to `child`, joined on `columns`
#[derive(Debug, Clone)]
struct Cascade {
    child: String,
    columns: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct Table {
    key_columns: Vec<String>,
    rows: Vec<Row>,
    checks: Vec<CheckConstraint>,
    cascades: Vec<Cascade>,
}

impl Table {
    fn same_key(&self, a: &Row, b: &Row) -> bool {
        !self.key_columns.is_empty()
            && self.key_columns.iter().all(|k| match (a.get(k), b.get(k)) {
                (Some(x), Some(y)) => x.value().sql_eq(y.value()),
                _ => false,
            })
    }

    fn check_row(&self, table: &str, row: &Row) -> Result<(), DriverError> {
        for key in &self.key_columns {
            if !row.get(key).is_some_and(ColumnValue::has_value) {
                return Err(DriverError::new(
                    Some(NOT_NULL_VIOLATION.to_string()),
                    format!("null value in column \"{}\" of relation \"{}\"", key, table),
                ));
            }
        }
        for constraint in &self.checks {
            if !(constraint.check)(row) {
                return Err(DriverError::new(
                    Some(CHECK_VIOLATION.to_string()),
                    format!(
                        "new row for relation \"{}\" violates check constraint \"{}\"",
                        table, constraint.name
                    ),
                ));
            }
        }
        Ok(())
    }
}

fn unique_violation(table: &str) -> DriverError {
    DriverError::new(
        Some(UNIQUE_VIOLATION.to_string()),
        format!("duplicate key value violates primary key of \"{}\"", table),
    )
}

fn row_matches(row: &Row, conditions: &[String], params: &[Value]) -> bool {
    conditions
        .iter()
        .zip(params)
        .all(|(column, value)| row.get(column).is_some_and(|c| c.value().sql_eq(value)))
}

fn column_value(name: &str, value: &Value) -> Result<ColumnValue, DriverError> {
    ColumnValue::new(name, value.clone()).map_err(|e| {
        DriverError::new(Some(UNDEFINED_COLUMN.to_string()), e.to_string())
    })
}

fn cascade_delete(tables: &mut BTreeMap<String, Table>, cascades: &[Cascade], removed: &[Row]) {
    if removed.is_empty() {
        return;
    }
    for cascade in cascades {
        let Some(child) = tables.get_mut(&cascade.child) else {
            continue;
        };
        let mut gone = Vec::new();
        child.rows.retain(|row| {
            let owned = removed.iter().any(|parent| {
                cascade.columns.iter().all(|c| match (row.get(c), parent.get(c)) {
                    (Some(a), Some(b)) => a.value().sql_eq(b.value()),
                    _ => false,
                })
            });
            if owned {
                gone.push(row.clone());
            }
            !owned
        });
        let nested = child.cascades.clone();
        cascade_delete(tables, &nested, &gone);
    }
}

enum Applied {
    Affected(u64),
    Rows(Vec<Row>),
}

/// Apply one parsed statement; on error `tables` is left untouched
fn apply(
    tables: &mut BTreeMap<String, Table>,
    command: &Command,
    params: &[Value],
) -> Result<Applied, DriverError> {
    let table_name = match command {
        Command::Insert { table, .. }
        | Command::Update { table, .. }
        | Command::Delete { table, .. }
        | Command::Select { table, .. } => table,
        Command::NextVal { .. } => {
            return Err(DriverError::other("sequences are not table statements"))
        }
    };
    let table = tables.get_mut(table_name).ok_or_else(|| {
        DriverError::new(
            Some(UNDEFINED_TABLE.to_string()),
            format!("relation \"{}\" does not exist", table_name),
        )
    })?;

    match command {
        Command::Insert { columns, .. } => {
            let row = Row::new(
                columns
                    .iter()
                    .zip(params)
                    .map(|(name, value)| column_value(name, value))
                    .collect::<Result<Vec<_>, _>>()?,
            );
            table.check_row(table_name, &row)?;
            if table.rows.iter().any(|existing| table.same_key(existing, &row)) {
                return Err(unique_violation(table_name));
            }
            table.rows.push(row);
            Ok(Applied::Affected(1))
        }
        Command::Update {
            assignments,
            conditions,
            ..
        } => {
            let (values, filter) = params.split_at(assignments.len());
            let mut candidate = table.rows.clone();
            let mut changed = Vec::new();
            for (index, row) in candidate.iter_mut().enumerate() {
                if !row_matches(row, conditions, filter) {
                    continue;
                }
                for (name, value) in assignments.iter().zip(values) {
                    row.set(column_value(name, value)?);
                }
                table.check_row(table_name, row)?;
                changed.push(index);
            }
            for &index in &changed {
                let conflict = candidate
                    .iter()
                    .enumerate()
                    .any(|(other, row)| other != index && table.same_key(row, &candidate[index]));
                if conflict {
                    return Err(unique_violation(table_name));
                }
            }
            table.rows = candidate;
            Ok(Applied::Affected(changed.len() as u64))
        }
        Command::Delete { conditions, .. } => {
            let (removed, kept): (Vec<Row>, Vec<Row>) = std::mem::take(&mut table.rows)
                .into_iter()
                .partition(|row| row_matches(row, conditions, params));
            table.rows = kept;
            let cascades = table.cascades.clone();
            cascade_delete(tables, &cascades, &removed);
            Ok(Applied::Affected(removed.len() as u64))
        }
        Command::Select {
            projection,
            conditions,
            ..
        } => {
            let mut rows = Vec::new();
            for row in table.rows.iter().filter(|r| row_matches(r, conditions, params)) {
                match projection {
                    None => rows.push(row.clone()),
                    Some(names) => {
                        let columns = names
                            .iter()
                            .map(|name| {
                                row.get(name).cloned().ok_or_else(|| {
                                    DriverError::new(
                                        Some(UNDEFINED_COLUMN.to_string()),
                                        format!("column \"{}\" does not exist", name),
                                    )
                                })
                            })
                            .collect::<Result<Vec<_>, _>>()?;
                        rows.push(Row::new(columns));
                    }
                }
            }
            Ok(Applied::Rows(rows))
        }
        Command::NextVal { .. } => Ok(Applied::Rows(Vec::new())),
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, Table>,
    sequences: BTreeMap<String, i64>,
    log: Vec<String>,
}

/// Shared in-memory database; clones share the same tables
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) a table whose rows are unique over `key_columns`
    pub async fn create_table(&self, name: &str, key_columns: &[&str]) {
        let table = Table {
            key_columns: key_columns.iter().map(|k| k.to_ascii_lowercase()).collect(),
            ..Table::default()
        };
        self.state
            .lock()
            .await
            .tables
            .insert(name.to_ascii_lowercase(), table);
    }

    /// The first `NEXTVAL` returns `start`
    pub async fn create_sequence(&self, name: &str, start: i64) {
        self.state
            .lock()
            .await
            .sequences
            .insert(name.to_ascii_lowercase(), start - 1);
    }

    pub async fn add_check<F>(&self, table: &str, name: &str, check: F) -> Result<(), DriverError>
    where
        F: Fn(&Row) -> bool + Send + Sync + 'static,
    {
        let mut state = self.state.lock().await;
        let entry = state.tables.get_mut(&table.to_ascii_lowercase()).ok_or_else(|| {
            DriverError::new(
                Some(UNDEFINED_TABLE.to_string()),
                format!("relation \"{}\" does not exist", table),
            )
        })?;
        entry.checks.push(CheckConstraint {
            name: name.to_string(),
            check: Arc::new(check),
        });
        Ok(())
    }

    /// Deleting a `parent` row also deletes the `child` rows sharing its `columns`
    pub async fn add_cascade(
        &self,
        parent: &str,
        child: &str,
        columns: &[&str],
    ) -> Result<(), DriverError> {
        let mut state = self.state.lock().await;
        let child = child.to_ascii_lowercase();
        if !state.tables.contains_key(&child) {
            return Err(DriverError::new(
                Some(UNDEFINED_TABLE.to_string()),
                format!("relation \"{}\" does not exist", child),
            ));
        }
        let entry = state.tables.get_mut(&parent.to_ascii_lowercase()).ok_or_else(|| {
            DriverError::new(
                Some(UNDEFINED_TABLE.to_string()),
                format!("relation \"{}\" does not exist", parent),
            )
        })?;
        entry.cascades.push(Cascade {
            child,
            columns: columns.iter().map(|c| c.to_ascii_lowercase()).collect(),
        });
        Ok(())
    }

    /// Committed rows of `table`
    pub async fn rows(&self, table: &str) -> Vec<Row> {
        self.state
            .lock()
            .await
            .tables
            .get(&table.to_ascii_lowercase())
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub async fn row_count(&self, table: &str) -> usize {
        self.rows(table).await.len()
    }

    /// First committed row of `table` whose `column` equals `value`
    pub async fn find_row(&self, table: &str, column: &str, value: impl Into<Value>) -> Option<Row> {
        let value = value.into();
        self.rows(table)
            .await
            .into_iter()
            .find(|row| row.get(column).is_some_and(|c| c.value().sql_eq(&value)))
    }

    /// Every statement text executed so far, committed or not
    pub async fn statement_log(&self) -> Vec<String> {
        self.state.lock().await.log.clone()
    }

    /// Logged statements starting with `verb`, ignoring case
    pub async fn count_statements(&self, verb: &str) -> usize {
        let verb = verb.to_ascii_uppercase();
        self.state
            .lock()
            .await
            .log
            .iter()
            .filter(|sql| sql.trim_start().to_ascii_uppercase().starts_with(&verb))
            .count()
    }

    pub async fn clear_log(&self) {
        self.state.lock().await.log.clear();
    }

    async fn record(&self, sql: &str) {
        self.state.lock().await.log.push(sql.to_string());
    }

    async fn next_value(&self, sequence: &str) -> Result<i64, DriverError> {
        let mut state = self.state.lock().await;
        let current = state.sequences.get_mut(sequence).ok_or_else(|| {
            DriverError::new(
                Some(UNDEFINED_OBJECT.to_string()),
                format!("sequence \"{}\" does not exist", sequence),
            )
        })?;
        *current += 1;
        Ok(*current)
    }

    async fn snapshot(&self) -> BTreeMap<String, Table> {
        self.state.lock().await.tables.clone()
    }

    /// Replay a journal onto the shared tables, all or nothing
    async fn replay(&self, journal: &[(Command, Vec<Value>)]) -> Result<(), DriverError> {
        let mut state = self.state.lock().await;
        let mut tables = state.tables.clone();
        for (command, params) in journal {
            apply(&mut tables, command, params)?;
        }
        state.tables = tables;
        Ok(())
    }
}

/// Provider handing out connections to one [`MemoryDatabase`]
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    database: MemoryDatabase,
}

impl MemoryProvider {
    pub fn new(database: MemoryDatabase) -> Self {
        Self { database }
    }

    pub fn database(&self) -> &MemoryDatabase {
        &self.database
    }
}

#[async_trait]
impl ConnectionProvider for MemoryProvider {
    fn backend(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn acquire(&self) -> Result<Box<dyn Connection>, DriverError> {
        Ok(Box::new(MemoryConnection {
            database: self.database.clone(),
            working: None,
            journal: Vec::new(),
            released: false,
        }))
    }

    async fn close(&self) {}
}

pub struct MemoryConnection {
    database: MemoryDatabase,
    working: Option<BTreeMap<String, Table>>,
    journal: Vec<(Command, Vec<Value>)>,
    released: bool,
}

impl MemoryConnection {
    async fn working(&mut self) -> &mut BTreeMap<String, Table> {
        if self.working.is_none() {
            self.working = Some(self.database.snapshot().await);
        }
        self.working.get_or_insert_with(BTreeMap::new)
    }

    async fn run(&mut self, statement: &Statement) -> Result<Applied, DriverError> {
        if self.released {
            return Err(DriverError::new(
                Some(CONNECTION_DOES_NOT_EXIST.to_string()),
                "connection already released",
            ));
        }
        let command = parser::parse(statement.sql())?;
        let params: Vec<Value> = statement
            .parameters()
            .map_err(|e| DriverError::new(Some(PROTOCOL_VIOLATION.to_string()), e.to_string()))?
            .into_iter()
            .cloned()
            .collect();
        if params.len() != command.placeholder_count() {
            return Err(DriverError::new(
                Some(PROTOCOL_VIOLATION.to_string()),
                format!(
                    "statement supplies {} parameters but requires {}",
                    params.len(),
                    command.placeholder_count()
                ),
            ));
        }
        self.database.record(statement.sql()).await;

        if let Command::NextVal { sequence, alias } = &command {
            let value = self.database.next_value(sequence).await?;
            let column = column_value(alias, &Value::Numeric(value))?;
            return Ok(Applied::Rows(vec![Row::new(vec![column])]));
        }

        let applied = apply(self.working().await, &command, &params)?;
        if command.is_write() {
            self.journal.push((command, params));
        }
        Ok(applied)
    }

    fn discard(&mut self) {
        self.journal.clear();
        self.working = None;
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn backend(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64, DriverError> {
        match self.run(statement).await? {
            Applied::Affected(count) => Ok(count),
            Applied::Rows(rows) => Ok(rows.len() as u64),
        }
    }

    async fn execute_batch(
        &mut self,
        statements: &[Statement],
    ) -> Result<Vec<StatementOutcome>, BatchExecutionError> {
        let mut outcomes = Vec::with_capacity(statements.len());
        for statement in statements {
            match self.run(statement).await {
                Ok(Applied::Affected(count)) => outcomes.push(StatementOutcome::Affected(count)),
                Ok(Applied::Rows(_)) => outcomes.push(StatementOutcome::SuccessNoInfo),
                Err(error) => {
                    debug!(sql = statement.sql(), error = %error, "batch statement failed");
                    outcomes.push(StatementOutcome::ExecutionFailed);
                }
            }
        }
        Ok(outcomes)
    }

    async fn query(&mut self, statement: &Statement) -> Result<Vec<Row>, DriverError> {
        match self.run(statement).await? {
            Applied::Rows(rows) => Ok(rows),
            Applied::Affected(_) => Ok(Vec::new()),
        }
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        let journal = std::mem::take(&mut self.journal);
        self.working = None;
        self.database.replay(&journal).await
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        self.discard();
        Ok(())
    }

    async fn release(&mut self) -> Result<(), DriverError> {
        self.discard();
        self.released = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn products() -> (MemoryDatabase, MemoryProvider) {
        let db = MemoryDatabase::new();
        db.create_table("products", &["sku"]).await;
        db.add_check("products", "qty_not_negative", |row| {
            row.get("qty").and_then(ColumnValue::as_i64).unwrap_or(0) >= 0
        })
        .await
        .unwrap();
        let provider = MemoryProvider::new(db.clone());
        (db, provider)
    }

    fn insert(sku: &str, qty: i64) -> Statement {
        let mut stmt = Statement::new("INSERT INTO products (sku, qty) VALUES (?, ?)");
        let next = stmt.bind(1, sku);
        stmt.bind(next, qty);
        stmt
    }

    #[tokio::test]
    async fn test_commit_publishes_and_rollback_discards() {
        let (db, provider) = products().await;

        let mut conn = provider.acquire().await.unwrap();
        assert_eq!(conn.execute(&insert("a", 1)).await.unwrap(), 1);
        // Own writes are visible before commit, others' are not
        let mut select = Statement::new("SELECT * FROM products WHERE sku = ?");
        select.bind(1, "a");
        assert_eq!(conn.query(&select).await.unwrap().len(), 1);
        assert_eq!(db.row_count("products").await, 0);
        conn.commit().await.unwrap();
        assert_eq!(db.row_count("products").await, 1);

        let mut conn = provider.acquire().await.unwrap();
        conn.execute(&insert("b", 1)).await.unwrap();
        conn.rollback().await.unwrap();
        conn.release().await.unwrap();
        assert_eq!(db.row_count("products").await, 1);
        assert!(db.find_row("products", "sku", "b").await.is_none());
    }

    #[tokio::test]
    async fn test_constraints_report_sqlstate() {
        let (_db, provider) = products().await;
        let mut conn = provider.acquire().await.unwrap();
        conn.execute(&insert("a", 1)).await.unwrap();

        let duplicate = conn.execute(&insert("a", 2)).await.unwrap_err();
        assert_eq!(duplicate.code.as_deref(), Some(UNIQUE_VIOLATION));
        let negative = conn.execute(&insert("b", -1)).await.unwrap_err();
        assert_eq!(negative.code.as_deref(), Some(CHECK_VIOLATION));
    }

    #[tokio::test]
    async fn test_batch_continues_after_failure() {
        let (db, provider) = products().await;
        let mut conn = provider.acquire().await.unwrap();
        let outcomes = conn
            .execute_batch(&[insert("a", 1), insert("b", -5), insert("c", 3)])
            .await
            .unwrap();
        assert_eq!(
            outcomes,
            vec![
                StatementOutcome::Affected(1),
                StatementOutcome::ExecutionFailed,
                StatementOutcome::Affected(1),
            ]
        );
        conn.commit().await.unwrap();
        assert_eq!(db.row_count("products").await, 2);
    }

    #[tokio::test]
    async fn test_update_delete_and_sequences() {
        let (db, provider) = products().await;
        db.create_sequence("product_seq", 10).await;
        let mut conn = provider.acquire().await.unwrap();
        conn.execute(&insert("a", 1)).await.unwrap();
        conn.execute(&insert("b", 1)).await.unwrap();

        let mut update = Statement::new("UPDATE products SET qty = ? WHERE sku = ?");
        let next = update.bind(1, 9i64);
        update.bind(next, "a");
        assert_eq!(conn.execute(&update).await.unwrap(), 1);

        let mut delete = Statement::new("DELETE FROM products WHERE sku = ?");
        delete.bind(1, "b");
        assert_eq!(conn.execute(&delete).await.unwrap(), 1);

        let seq = conn.sequence_statement("product_seq");
        let first = conn.query(&seq).await.unwrap();
        assert_eq!(first[0].get_i64("nextval").unwrap(), 10);
        let second = conn.query(&seq).await.unwrap();
        assert_eq!(second[0].get_i64("nextval").unwrap(), 11);

        conn.commit().await.unwrap();
        let row = db.find_row("products", "sku", "a").await.unwrap();
        assert_eq!(row.get_i64("qty").unwrap(), 9);
        assert_eq!(db.row_count("products").await, 1);
        assert_eq!(db.count_statements("delete").await, 1);
    }

    #[tokio::test]
    async fn test_delete_cascades_to_child_rows() {
        let db = MemoryDatabase::new();
        db.create_table("orders", &["order_id"]).await;
        db.create_table("order_lines", &["order_id", "line_no"]).await;
        db.add_cascade("orders", "order_lines", &["order_id"]).await.unwrap();
        let provider = MemoryProvider::new(db.clone());

        let mut conn = provider.acquire().await.unwrap();
        for order in [1i64, 2] {
            let mut stmt = Statement::new("INSERT INTO orders (order_id) VALUES (?)");
            stmt.bind(1, order);
            conn.execute(&stmt).await.unwrap();
            for line in 1..=2i64 {
                let mut stmt =
                    Statement::new("INSERT INTO order_lines (order_id, line_no) VALUES (?, ?)");
                let next = stmt.bind(1, order);
                stmt.bind(next, line);
                conn.execute(&stmt).await.unwrap();
            }
        }
        let mut delete = Statement::new("DELETE FROM orders WHERE order_id = ?");
        delete.bind(1, 1i64);
        assert_eq!(conn.execute(&delete).await.unwrap(), 1);
        conn.commit().await.unwrap();

        assert_eq!(db.row_count("orders").await, 1);
        let lines = db.rows("order_lines").await;
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|row| row.get_i64("order_id").unwrap() == 2));
    }

    #[tokio::test]
    async fn test_released_connection_refuses_work() {
        let (_db, provider) = products().await;
        let mut conn = provider.acquire().await.unwrap();
        conn.release().await.unwrap();
        let error = conn.execute(&insert("a", 1)).await.unwrap_err();
        assert_eq!(error.code.as_deref(), Some(CONNECTION_DOES_NOT_EXIST));
    }
}
