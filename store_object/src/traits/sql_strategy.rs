//! Statement text per entity type
//!
//! The engine never writes entity-specific SQL. It asks the strategy for statement text
//! around a key's WHERE expression and binds parameters itself: key then fields for
//! insert, fields then key for update, key only for delete and select.

use std::fmt::Debug;

pub trait SqlStrategy: Send + Sync + Debug {
    fn insert_sql(&self) -> String;

    fn update_sql(&self, where_expression: &str) -> String;

    fn delete_sql(&self, where_expression: &str) -> String;

    fn select_sql(&self, where_expression: &str) -> String;
}

/// Plain single-table statements
///
/// ```
/// use store_object::TableStrategy;
///
/// static PRODUCTS: TableStrategy = TableStrategy::new("products", &["sku"], &["name", "qty"]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TableStrategy {
    pub table: &'static str,
    /// Key columns in binding order, parent columns first
    pub key_columns: &'static [&'static str],
    pub fields: &'static [&'static str],
}

impl TableStrategy {
    pub const fn new(
        table: &'static str,
        key_columns: &'static [&'static str],
        fields: &'static [&'static str],
    ) -> Self {
        Self {
            table,
            key_columns,
            fields,
        }
    }
}

impl SqlStrategy for TableStrategy {
    fn insert_sql(&self) -> String {
        let columns: Vec<&str> = self
            .key_columns
            .iter()
            .chain(self.fields.iter())
            .copied()
            .collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            columns.join(", "),
            placeholders
        )
    }

    fn update_sql(&self, where_expression: &str) -> String {
        let assignments = self
            .fields
            .iter()
            .map(|f| format!("{} = ?", f))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "UPDATE {} SET {} WHERE {}",
            self.table, assignments, where_expression
        )
    }

    fn delete_sql(&self, where_expression: &str) -> String {
        format!("DELETE FROM {} WHERE {}", self.table, where_expression)
    }

    fn select_sql(&self, where_expression: &str) -> String {
        format!("SELECT * FROM {} WHERE {}", self.table, where_expression)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static LINES: TableStrategy =
        TableStrategy::new("order_lines", &["order_id", "line_no"], &["sku", "qty"]);

    #[test]
    fn test_table_statements() {
        let condition = "order_id = ? AND line_no = ?";
        assert_eq!(
            LINES.insert_sql(),
            "INSERT INTO order_lines (order_id, line_no, sku, qty) VALUES (?, ?, ?, ?)"
        );
        assert_eq!(
            LINES.update_sql(condition),
            "UPDATE order_lines SET sku = ?, qty = ? WHERE order_id = ? AND line_no = ?"
        );
        assert_eq!(
            LINES.delete_sql(condition),
            "DELETE FROM order_lines WHERE order_id = ? AND line_no = ?"
        );
        assert_eq!(
            LINES.select_sql("order_id = ?"),
            "SELECT * FROM order_lines WHERE order_id = ?"
        );
    }
}
