//! Typed column values shared across the persisthaus ecosystem
//!
//! This crate holds the scalar value model used for primary keys and statement
//! parameters, the positional [`Statement`] carrier, the wire encoding used to ship
//! values across process boundaries, and the mapping to PostgreSQL type names.

pub mod errors;
pub mod serialize;
pub mod sql;
pub mod statement;
pub mod types;
pub mod validate;

pub use errors::{DecodeError, TypeError};
pub use serialize::{decode_column, encode_column, WireColumnValue, WIRE_DATETIME_PATTERN};
pub use sql::{column_kind_to_pg_type, pg_type_to_column_kind};
pub use statement::Statement;
pub use types::{ColumnKind, ColumnValue, SqlTyped, Value};
pub use validate::validate_column_name;
