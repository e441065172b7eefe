//! Shared entities and setup for the integration tests
#![allow(dead_code)]

use chrono::NaiveDate;
use persisthaus::prelude::*;
use persisthaus::store_object::{MemoryProvider, Row};
use rust_decimal::Decimal;
use std::sync::Arc;

pub static ORDERS: TableStrategy =
    TableStrategy::new("orders", &["order_id"], &["customer", "placed_on"]);
pub static LINES: TableStrategy = TableStrategy::new(
    "order_lines",
    &["order_id", "line_no"],
    &["sku", "qty", "price"],
);
pub static PRODUCTS: TableStrategy =
    TableStrategy::new("products", &["sku"], &["qty", "attributes"]);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub state: EntityState,
    pub customer: String,
    pub placed_on: NaiveDate,
    pub lines: Vec<OrderLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    pub state: EntityState,
    pub line_no: i64,
    pub sku: String,
    pub qty: i64,
    pub price: Decimal,
    /// Removed by the database when the order row goes
    pub cascade: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub state: EntityState,
    pub sku: String,
    pub qty: i64,
    pub attributes: serde_json::Value,
}

impl Order {
    pub fn new(customer: &str, lines: Vec<OrderLine>) -> Self {
        Self {
            state: EntityState::new(),
            customer: customer.to_string(),
            placed_on: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            lines,
        }
    }

    pub fn total(&self) -> Decimal {
        self.lines
            .iter()
            .map(|l| l.price * Decimal::from(l.qty))
            .sum()
    }

    pub fn order_id(&self) -> Option<i64> {
        self.primary_key()
            .and_then(|k| k.column("order_id"))
            .and_then(ColumnValue::as_i64)
    }
}

impl OrderLine {
    pub fn new(line_no: i64, sku: &str, qty: i64, price: Decimal) -> Self {
        Self {
            state: EntityState::new(),
            line_no,
            sku: sku.to_string(),
            qty,
            price,
            cascade: false,
        }
    }

    pub fn cascading(mut self) -> Self {
        self.cascade = true;
        self
    }

    fn from_row(row: &Row) -> Result<Self, PersistError> {
        let order = PrimaryKey::surrogate_numeric("order_id", row.get_i64("order_id")?)?;
        let line_no = row.get_i64("line_no")?;
        let key = PrimaryKey::composite(order, vec![ColumnValue::numeric("line_no", line_no)?])?;
        Ok(Self {
            state: EntityState::loaded(key),
            line_no,
            sku: row.get_text("sku")?,
            qty: row.get_i64("qty")?,
            price: row.get_decimal("price")?,
            cascade: false,
        })
    }
}

impl Product {
    pub fn new(sku: &str, qty: i64) -> Self {
        let key = PrimaryKey::natural(vec![ColumnValue::text("sku", sku).unwrap()]).unwrap();
        Self {
            state: EntityState::with_key(key),
            sku: sku.to_string(),
            qty,
            attributes: serde_json::json!({ "color": "red" }),
        }
    }

    pub fn key(sku: &str) -> PrimaryKey {
        PrimaryKey::natural(vec![ColumnValue::text("sku", sku).unwrap()]).unwrap()
    }
}

impl Entity for Order {
    fn entity_type(&self) -> &'static str {
        "order"
    }

    fn sql(&self) -> &dyn SqlStrategy {
        &ORDERS
    }

    fn state(&self) -> &EntityState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut EntityState {
        &mut self.state
    }

    fn bind_fields(&self, statement: &mut Statement, index: usize) -> usize {
        let next = statement.bind(index, self.customer.as_str());
        statement.bind(next, self.placed_on)
    }

    fn key_source(&self) -> KeySource {
        KeySource::Sequence {
            column: "order_id",
            sequence: "order_seq",
        }
    }

    fn on_key_assigned(&mut self) -> Result<(), PersistError> {
        let parent = self.require_key(Operation::Insert)?.clone();
        for line in &mut self.lines {
            if line.state.key().is_none() {
                let key = PrimaryKey::composite(
                    parent.clone(),
                    vec![ColumnValue::numeric("line_no", line.line_no)?],
                )?;
                line.state.assign_key(key)?;
            }
        }
        Ok(())
    }

    fn parts(&self) -> Vec<&dyn Entity> {
        self.lines.iter().map(|l| l as &dyn Entity).collect()
    }

    fn parts_mut(&mut self) -> Vec<&mut dyn Entity> {
        self.lines.iter_mut().map(|l| l as &mut dyn Entity).collect()
    }

    fn release_removed_parts(&mut self) {
        self.lines.retain(|l| !l.state.status().is_removal());
    }
}

#[async_trait]
impl Loadable for Order {
    fn type_name() -> &'static str {
        "order"
    }

    fn strategy() -> &'static dyn SqlStrategy {
        &ORDERS
    }

    fn from_row(row: &Row) -> Result<Self, PersistError> {
        let key = PrimaryKey::surrogate_numeric("order_id", row.get_i64("order_id")?)?;
        Ok(Self {
            state: EntityState::loaded(key),
            customer: row.get_text("customer")?,
            placed_on: row.get_date("placed_on")?,
            lines: Vec::new(),
        })
    }

    async fn load_parts(&mut self, uow: &mut UnitOfWork) -> Result<(), PersistError> {
        let key = self.require_key(Operation::Select)?.clone();
        let mut statement = Statement::new(LINES.select_sql(&key.sql_where_expression(None)));
        key.bind_parameters(&mut statement, 1);
        let rows = uow.query(&statement).await?;
        self.lines = rows
            .iter()
            .map(OrderLine::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(())
    }
}

impl Entity for OrderLine {
    fn entity_type(&self) -> &'static str {
        "order_line"
    }

    fn sql(&self) -> &dyn SqlStrategy {
        &LINES
    }

    fn state(&self) -> &EntityState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut EntityState {
        &mut self.state
    }

    fn bind_fields(&self, statement: &mut Statement, index: usize) -> usize {
        let next = statement.bind(index, self.sku.as_str());
        let next = statement.bind(next, self.qty);
        statement.bind(next, self.price)
    }

    fn key_source(&self) -> KeySource {
        KeySource::Inherited
    }

    fn deleted_by_owner_cascade(&self) -> bool {
        self.cascade
    }
}

impl Entity for Product {
    fn entity_type(&self) -> &'static str {
        "product"
    }

    fn sql(&self) -> &dyn SqlStrategy {
        &PRODUCTS
    }

    fn state(&self) -> &EntityState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut EntityState {
        &mut self.state
    }

    fn bind_fields(&self, statement: &mut Statement, index: usize) -> usize {
        let next = statement.bind(index, self.qty);
        statement.bind(next, self.attributes.to_string())
    }
}

impl Loadable for Product {
    fn type_name() -> &'static str {
        "product"
    }

    fn strategy() -> &'static dyn SqlStrategy {
        &PRODUCTS
    }

    fn from_row(row: &Row) -> Result<Self, PersistError> {
        let sku = row.get_text("sku")?;
        let attributes = serde_json::from_str(&row.get_text("attributes")?)
            .map_err(|e| PersistError::invalid(format!("attributes: {}", e)))?;
        Ok(Self {
            state: EntityState::loaded(Product::key(&sku)),
            sku,
            qty: row.get_i64("qty")?,
            attributes,
        })
    }
}

/// Tables, the order sequence, the line cascade and a non-negative stock check
pub async fn memory_database() -> MemoryDatabase {
    let db = MemoryDatabase::new();
    db.create_table("orders", &["order_id"]).await;
    db.create_table("order_lines", &["order_id", "line_no"]).await;
    db.create_table("products", &["sku"]).await;
    db.create_sequence("order_seq", 1).await;
    db.add_cascade("orders", "order_lines", &["order_id"])
        .await
        .unwrap();
    db.add_check("products", "qty_not_negative", |row| {
        row.get("qty").and_then(ColumnValue::as_i64).unwrap_or(0) >= 0
    })
    .await
    .unwrap();
    db
}

/// PersistHaus over one in-memory "main" subsystem
pub fn persisthaus_on(db: &MemoryDatabase, batch_size: usize) -> PersistHaus {
    let defaults = AppConfig::in_memory("main").unit_of_work;
    persisthaus_with_timeout(db, batch_size, defaults.join_timeout_seconds)
}

pub fn persisthaus_with_timeout(
    db: &MemoryDatabase,
    batch_size: usize,
    join_timeout_seconds: u64,
) -> PersistHaus {
    let mut config = AppConfig::in_memory("main");
    config.unit_of_work.batch_size = batch_size;
    config.unit_of_work.join_timeout_seconds = join_timeout_seconds;
    let mut registry = ConnectionRegistry::new();
    registry.register("main", Arc::new(MemoryProvider::new(db.clone())));
    PersistHaus::with_registry(config, registry).unwrap()
}

pub fn price(units: i64, cents: u32) -> Decimal {
    Decimal::new(units * 100 + i64::from(cents), 2)
}
