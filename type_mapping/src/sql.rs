//! SQL type conversion utilities
//!
//! This module maps column kinds to PostgreSQL type names and back.

use crate::types::ColumnKind;

/// PostgreSQL type used to store a column kind (DDL and diagnostics)
pub fn column_kind_to_pg_type(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Numeric => "BIGINT",
        ColumnKind::Decimal => "NUMERIC",
        ColumnKind::Text => "VARCHAR",
        ColumnKind::Date => "DATE",
        ColumnKind::Timestamp => "TIMESTAMP",
        ColumnKind::UniqueId => "UUID",
        ColumnKind::Null => "UNKNOWN",
    }
}

/// Column kind for a PostgreSQL type name as reported by the driver
pub fn pg_type_to_column_kind(pg_type: &str) -> Option<ColumnKind> {
    // Normalize type string for consistent matching
    let normalized = pg_type.trim().to_ascii_uppercase();
    match normalized.as_str() {
        "INT2" | "INT4" | "INT8" | "SMALLINT" | "INTEGER" | "BIGINT" => Some(ColumnKind::Numeric),
        "NUMERIC" | "DECIMAL" => Some(ColumnKind::Decimal),
        "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => Some(ColumnKind::Text),
        "DATE" => Some(ColumnKind::Date),
        "TIMESTAMP" | "TIMESTAMPTZ" => Some(ColumnKind::Timestamp),
        "UUID" => Some(ColumnKind::UniqueId),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_names_map_back() {
        assert_eq!(pg_type_to_column_kind("int8"), Some(ColumnKind::Numeric));
        assert_eq!(pg_type_to_column_kind("TIMESTAMPTZ"), Some(ColumnKind::Timestamp));
        assert_eq!(pg_type_to_column_kind("JSONB"), None);
        for kind in [
            ColumnKind::Numeric,
            ColumnKind::Decimal,
            ColumnKind::Text,
            ColumnKind::Date,
            ColumnKind::Timestamp,
            ColumnKind::UniqueId,
        ] {
            assert_eq!(pg_type_to_column_kind(column_kind_to_pg_type(kind)), Some(kind));
        }
    }
}
