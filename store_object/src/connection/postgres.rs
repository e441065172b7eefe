//! PostgreSQL backend
//!
//! Every acquired connection opens a transaction. Pooled providers share one `PgPool`;
//! unpooled providers open a dedicated single-connection pool per acquire and close it
//! on release.

use crate::connection::{
    BatchExecutionError, Connection, ConnectionProvider, DriverError, Row, StatementOutcome,
};
use async_trait::async_trait;
use config::{BackendKind, DatabaseConfig};
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{PgConnection, Postgres, Transaction};
use std::time::Duration;
use tracing::{debug, warn};
use type_mapping::{pg_type_to_column_kind, ColumnKind, ColumnValue, Statement, Value};

const BATCH_SAVEPOINT: &str = "persisthaus_batch";

/// Rewrite `?` placeholders to `$1, $2, ..`, leaving quoted text alone
pub fn rewrite_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut index = 0;
    let mut in_quotes = false;
    for c in sql.chars() {
        match c {
            '\'' => {
                in_quotes = !in_quotes;
                out.push(c);
            }
            '?' if !in_quotes => {
                index += 1;
                out.push('$');
                out.push_str(&index.to_string());
            }
            _ => out.push(c),
        }
    }
    out
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &Value,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Numeric(n) => query.bind(*n),
        Value::Decimal(d) => query.bind(*d),
        Value::Text(s) => query.bind(s.clone()),
        Value::Date(d) => query.bind(*d),
        Value::Timestamp(t) => query.bind(*t),
        Value::UniqueId(u) => query.bind(*u),
        // Typed NULL so the server can infer the parameter type
        Value::Null(declared) => match declared {
            ColumnKind::Numeric => query.bind(Option::<i64>::None),
            ColumnKind::Decimal => query.bind(Option::<rust_decimal::Decimal>::None),
            ColumnKind::Date => query.bind(Option::<chrono::NaiveDate>::None),
            ColumnKind::Timestamp => query.bind(Option::<chrono::NaiveDateTime>::None),
            ColumnKind::UniqueId => query.bind(Option::<uuid::Uuid>::None),
            ColumnKind::Text | ColumnKind::Null => query.bind(Option::<String>::None),
        },
    }
}

fn decode_row(row: &PgRow) -> Result<Row, DriverError> {
    use sqlx::{Column, Row as _, TypeInfo};

    let mut columns = Vec::with_capacity(row.columns().len());
    for column in row.columns() {
        let name = column.name();
        let type_name = column.type_info().name();
        let kind = pg_type_to_column_kind(type_name).ok_or_else(|| {
            DriverError::other(format!(
                "column '{}' has unsupported type {}",
                name, type_name
            ))
        })?;

        let value: Value = match kind {
            ColumnKind::Numeric => match type_name {
                "INT2" => row.try_get::<Option<i16>, _>(name)?.map(i64::from).into(),
                "INT4" => row.try_get::<Option<i32>, _>(name)?.map(i64::from).into(),
                _ => row.try_get::<Option<i64>, _>(name)?.into(),
            },
            ColumnKind::Decimal => row.try_get::<Option<rust_decimal::Decimal>, _>(name)?.into(),
            ColumnKind::Text => row.try_get::<Option<String>, _>(name)?.into(),
            ColumnKind::Date => row.try_get::<Option<chrono::NaiveDate>, _>(name)?.into(),
            ColumnKind::Timestamp => match type_name {
                "TIMESTAMPTZ" => row
                    .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name)?
                    .map(|t| t.naive_utc())
                    .into(),
                _ => row.try_get::<Option<chrono::NaiveDateTime>, _>(name)?.into(),
            },
            ColumnKind::UniqueId => row.try_get::<Option<uuid::Uuid>, _>(name)?.into(),
            ColumnKind::Null => Value::Null(ColumnKind::Null),
        };

        let column = ColumnValue::new(name, value)
            .map_err(|e| DriverError::other(e.to_string()))?;
        columns.push(column);
    }
    Ok(Row::new(columns))
}

async fn execute_on(conn: &mut PgConnection, statement: &Statement) -> Result<u64, DriverError> {
    let sql = rewrite_placeholders(statement.sql());
    let params = statement
        .parameters()
        .map_err(|e| DriverError::other(e.to_string()))?;
    let mut query = sqlx::query(&sql);
    for value in params {
        query = bind_value(query, value);
    }
    let result = query.execute(conn).await?;
    Ok(result.rows_affected())
}

async fn query_on(conn: &mut PgConnection, statement: &Statement) -> Result<Vec<Row>, DriverError> {
    let sql = rewrite_placeholders(statement.sql());
    let params = statement
        .parameters()
        .map_err(|e| DriverError::other(e.to_string()))?;
    let mut query = sqlx::query(&sql);
    for value in params {
        query = bind_value(query, value);
    }
    let rows = query.fetch_all(conn).await?;
    rows.iter().map(decode_row).collect()
}

fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    let mut pool_options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.idle_timeout_seconds));

    // Set max lifetime if specified
    if config.max_lifetime_seconds > 0 {
        pool_options = pool_options.max_lifetime(Duration::from_secs(config.max_lifetime_seconds));
    }
    pool_options
}

/// PostgreSQL connection provider
#[derive(Debug, Clone)]
pub struct PostgresProvider {
    config: DatabaseConfig,
    pool: Option<PgPool>,
}

impl PostgresProvider {
    /// Pooled provider; the pool is opened eagerly
    pub async fn pooled(config: DatabaseConfig) -> Result<Self, DriverError> {
        let pool = pool_options(&config)
            .connect(&config.connection_string())
            .await?;
        Ok(Self {
            config,
            pool: Some(pool),
        })
    }

    /// Unpooled provider; a connection is opened per acquire
    pub fn unpooled(config: DatabaseConfig) -> Self {
        Self { config, pool: None }
    }

    pub async fn connect(config: DatabaseConfig, pooled: bool) -> Result<Self, DriverError> {
        if pooled {
            Self::pooled(config).await
        } else {
            Ok(Self::unpooled(config))
        }
    }

    pub fn pool(&self) -> Option<&PgPool> {
        self.pool.as_ref()
    }
}

#[async_trait]
impl ConnectionProvider for PostgresProvider {
    fn backend(&self) -> BackendKind {
        BackendKind::Postgres
    }

    async fn acquire(&self) -> Result<Box<dyn Connection>, DriverError> {
        let (pool, owned) = match &self.pool {
            Some(pool) => (pool.clone(), false),
            None => {
                let pool = PgPoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(Duration::from_secs(self.config.connection_timeout_seconds))
                    .connect(&self.config.connection_string())
                    .await?;
                (pool, true)
            }
        };
        let transaction = pool.begin().await?;
        Ok(Box::new(PostgresConnection {
            transaction: Some(transaction),
            owned_pool: owned.then_some(pool),
        }))
    }

    async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}

pub struct PostgresConnection {
    transaction: Option<Transaction<'static, Postgres>>,
    owned_pool: Option<PgPool>,
}

impl PostgresConnection {
    fn transaction(&mut self) -> Result<&mut Transaction<'static, Postgres>, DriverError> {
        self.transaction
            .as_mut()
            .ok_or_else(|| DriverError::other("transaction already finished"))
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    fn backend(&self) -> BackendKind {
        BackendKind::Postgres
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64, DriverError> {
        let tx = self.transaction()?;
        execute_on(&mut **tx, statement).await
    }

    async fn execute_batch(
        &mut self,
        statements: &[Statement],
    ) -> Result<Vec<StatementOutcome>, BatchExecutionError> {
        let mut outcomes = Vec::with_capacity(statements.len());
        let tx = match self.transaction() {
            Ok(tx) => tx,
            Err(source) => return Err(BatchExecutionError { outcomes, source }),
        };

        for statement in statements {
            // A failed statement aborts the transaction unless it ran under a savepoint
            let savepoint = format!("SAVEPOINT {}", BATCH_SAVEPOINT);
            if let Err(e) = sqlx::query(&savepoint).execute(&mut **tx).await {
                return Err(BatchExecutionError {
                    outcomes,
                    source: e.into(),
                });
            }

            let finish = match execute_on(&mut **tx, statement).await {
                Ok(count) => {
                    outcomes.push(StatementOutcome::Affected(count));
                    format!("RELEASE SAVEPOINT {}", BATCH_SAVEPOINT)
                }
                Err(error) => {
                    debug!(sql = statement.sql(), error = %error, "batch statement failed");
                    outcomes.push(StatementOutcome::ExecutionFailed);
                    format!("ROLLBACK TO SAVEPOINT {}", BATCH_SAVEPOINT)
                }
            };
            if let Err(e) = sqlx::query(&finish).execute(&mut **tx).await {
                return Err(BatchExecutionError {
                    outcomes,
                    source: e.into(),
                });
            }
        }
        Ok(outcomes)
    }

    async fn query(&mut self, statement: &Statement) -> Result<Vec<Row>, DriverError> {
        let tx = self.transaction()?;
        query_on(&mut **tx, statement).await
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        match self.transaction.take() {
            Some(tx) => Ok(tx.commit().await?),
            None => Err(DriverError::other("transaction already finished")),
        }
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        match self.transaction.take() {
            Some(tx) => Ok(tx.rollback().await?),
            None => Ok(()),
        }
    }

    async fn release(&mut self) -> Result<(), DriverError> {
        if let Some(tx) = self.transaction.take() {
            if let Err(e) = tx.rollback().await {
                warn!(error = %e, "rollback on release failed");
            }
        }
        if let Some(pool) = self.owned_pool.take() {
            pool.close().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_placeholders() {
        assert_eq!(
            rewrite_placeholders("UPDATE t SET a = ? WHERE b = ? AND c = '?'"),
            "UPDATE t SET a = $1 WHERE b = $2 AND c = '?'"
        );
        assert_eq!(rewrite_placeholders("SELECT 1"), "SELECT 1");
    }
}
