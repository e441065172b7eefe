//! Column value definitions
//!
//! A [`ColumnValue`] is a named, typed scalar. Values of the same name compare by the
//! natural order of their representation; SQL NULL never equals anything, itself included.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

use crate::errors::TypeError;
use crate::serialize::WireColumnValue;
use crate::statement::Statement;
use crate::validate::validate_column_name;

/// Kind of a column value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Decimal,
    Text,
    Date,
    Timestamp,
    UniqueId,
    Null,
}

impl ColumnKind {
    /// Tag used in the wire encoding and in canonical key strings
    pub fn tag(self) -> &'static str {
        match self {
            ColumnKind::Numeric => "numeric",
            ColumnKind::Decimal => "decimal",
            ColumnKind::Text => "text",
            ColumnKind::Date => "date",
            ColumnKind::Timestamp => "timestamp",
            ColumnKind::UniqueId => "unique_id",
            ColumnKind::Null => "null",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "numeric" => Some(ColumnKind::Numeric),
            "decimal" => Some(ColumnKind::Decimal),
            "text" => Some(ColumnKind::Text),
            "date" => Some(ColumnKind::Date),
            "timestamp" => Some(ColumnKind::Timestamp),
            "unique_id" => Some(ColumnKind::UniqueId),
            "null" => Some(ColumnKind::Null),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Raw value of a column
#[derive(Debug, Clone)]
pub enum Value {
    Numeric(i64),
    Decimal(Decimal),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    UniqueId(Uuid),
    /// SQL NULL; carries the declared kind of its column for parameter binding
    Null(ColumnKind),
}

impl Value {
    pub fn kind(&self) -> ColumnKind {
        match self {
            Value::Numeric(_) => ColumnKind::Numeric,
            Value::Decimal(_) => ColumnKind::Decimal,
            Value::Text(_) => ColumnKind::Text,
            Value::Date(_) => ColumnKind::Date,
            Value::Timestamp(_) => ColumnKind::Timestamp,
            Value::UniqueId(_) => ColumnKind::UniqueId,
            Value::Null(_) => ColumnKind::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null(_))
    }

    /// SQL equality: same kind, same value, never NULL
    pub fn sql_eq(&self, other: &Value) -> bool {
        self.sql_cmp(other) == Some(Ordering::Equal)
    }

    /// Natural order between two non-null values of the same kind
    pub fn sql_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Numeric(a), Value::Numeric(b)) => Some(a.cmp(b)),
            (Value::Decimal(a), Value::Decimal(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::UniqueId(a), Value::UniqueId(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        match self {
            Value::Numeric(n) => n.hash(state),
            // 1.50 and 1.5 are equal, so they must hash alike
            Value::Decimal(d) => d.normalize().hash(state),
            Value::Text(s) => s.hash(state),
            Value::Date(d) => d.hash(state),
            Value::Timestamp(t) => t.hash(state),
            Value::UniqueId(u) => u.hash(state),
            Value::Null(declared) => declared.hash(state),
        }
    }
}

/// Rust types with a fixed column kind, used to bind typed NULLs for `Option<T>`
pub trait SqlTyped {
    const KIND: ColumnKind;
}

macro_rules! sql_typed {
    ($($ty:ty => $variant:ident, $kind:ident, $conv:expr;)*) => {
        $(
            impl SqlTyped for $ty {
                const KIND: ColumnKind = ColumnKind::$kind;
            }

            impl From<$ty> for Value {
                fn from(val: $ty) -> Self {
                    let conv: fn($ty) -> _ = $conv;
                    Value::$variant(conv(val))
                }
            }
        )*
    };
}

sql_typed! {
    i64 => Numeric, Numeric, |v| v;
    i32 => Numeric, Numeric, i64::from;
    i16 => Numeric, Numeric, i64::from;
    u32 => Numeric, Numeric, i64::from;
    Decimal => Decimal, Decimal, |v| v;
    String => Text, Text, |v| v;
    NaiveDate => Date, Date, |v| v;
    NaiveDateTime => Timestamp, Timestamp, |v| v;
    Uuid => UniqueId, UniqueId, |v| v;
}

impl SqlTyped for &str {
    const KIND: ColumnKind = ColumnKind::Text;
}

impl From<&str> for Value {
    fn from(val: &str) -> Self {
        Value::Text(val.to_string())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value> + SqlTyped,
{
    fn from(val: Option<T>) -> Self {
        match val {
            Some(v) => v.into(),
            None => Value::Null(T::KIND),
        }
    }
}

/// A named, typed scalar
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "WireColumnValue", try_from = "WireColumnValue")]
pub struct ColumnValue {
    name: String,
    value: Value,
}

impl ColumnValue {
    /// Build a column value; the name must be a plain SQL identifier
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Result<Self, TypeError> {
        let name = name.into();
        validate_column_name(&name)?;
        Ok(Self {
            name,
            value: value.into(),
        })
    }

    pub fn numeric(name: impl Into<String>, value: i64) -> Result<Self, TypeError> {
        Self::new(name, Value::Numeric(value))
    }

    pub fn decimal(name: impl Into<String>, value: Decimal) -> Result<Self, TypeError> {
        Self::new(name, Value::Decimal(value))
    }

    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Result<Self, TypeError> {
        Self::new(name, Value::Text(value.into()))
    }

    pub fn date(name: impl Into<String>, value: NaiveDate) -> Result<Self, TypeError> {
        Self::new(name, Value::Date(value))
    }

    pub fn timestamp(name: impl Into<String>, value: NaiveDateTime) -> Result<Self, TypeError> {
        Self::new(name, Value::Timestamp(value))
    }

    pub fn unique_id(name: impl Into<String>, value: Uuid) -> Result<Self, TypeError> {
        Self::new(name, Value::UniqueId(value))
    }

    /// SQL NULL declared as `declared`
    pub fn null(name: impl Into<String>, declared: ColumnKind) -> Result<Self, TypeError> {
        Self::new(name, Value::Null(declared))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn kind(&self) -> ColumnKind {
        self.value.kind()
    }

    pub fn has_value(&self) -> bool {
        !self.value.is_null()
    }

    /// Same value under another column name
    pub fn renamed(&self, name: impl Into<String>) -> Result<Self, TypeError> {
        Self::new(name, self.value.clone())
    }

    /// Order two values of the same column.
    ///
    /// Different names or different kinds are a programming error. A NULL on either
    /// side has no order and yields `Ok(None)`.
    pub fn compare_to(&self, other: &ColumnValue) -> Result<Option<Ordering>, TypeError> {
        if self.name != other.name {
            return Err(TypeError::incomparable(
                &self.name,
                &other.name,
                "column names differ",
            ));
        }
        if self.value.is_null() || other.value.is_null() {
            return Ok(None);
        }
        if self.kind() != other.kind() {
            return Err(TypeError::incomparable(
                &self.name,
                &other.name,
                format!("{} is not comparable with {}", self.kind(), other.kind()),
            ));
        }
        Ok(self.value.sql_cmp(&other.value))
    }

    /// Same name and same non-null value of the same kind
    pub fn value_equals(&self, other: &ColumnValue) -> bool {
        self.name == other.name && self.value.sql_eq(&other.value)
    }

    /// Write the value at `index` and return the next free index
    pub fn bind_parameter(&self, statement: &mut Statement, index: usize) -> usize {
        statement.bind(index, self.value.clone())
    }

    pub fn as_i64(&self) -> Option<i64> {
        match &self.value {
            Value::Numeric(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match &self.value {
            Value::Decimal(d) => Some(*d),
            Value::Numeric(n) => Some(Decimal::from(*n)),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.value {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match &self.value {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match &self.value {
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match &self.value {
            Value::UniqueId(u) => Some(*u),
            _ => None,
        }
    }
}

impl PartialEq for ColumnValue {
    fn eq(&self, other: &Self) -> bool {
        self.value_equals(other)
    }
}

impl PartialOrd for ColumnValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare_to(other).ok().flatten()
    }
}

impl Hash for ColumnValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.value.hash(state);
    }
}

impl fmt::Display for ColumnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Value::Null(_) => write!(f, "{}=NULL", self.name),
            other => write!(f, "{}={}", self.name, crate::serialize::wire_string(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    fn one_of_each(name: &str) -> Vec<ColumnValue> {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        vec![
            ColumnValue::numeric(name, 42).unwrap(),
            ColumnValue::decimal(name, Decimal::new(1999, 2)).unwrap(),
            ColumnValue::text(name, "Widget").unwrap(),
            ColumnValue::date(name, date).unwrap(),
            ColumnValue::timestamp(name, date.and_hms_milli_opt(13, 4, 5, 120).unwrap()).unwrap(),
            ColumnValue::unique_id(name, Uuid::new_v4()).unwrap(),
            ColumnValue::null(name, ColumnKind::Text).unwrap(),
        ]
    }

    #[test]
    fn test_clone_is_distinct_and_value_equal() {
        for original in one_of_each("col") {
            let copy = original.clone();
            assert!(!std::ptr::eq(&original, &copy));
            assert_eq!(copy.name(), original.name());
            assert_eq!(copy.kind(), original.kind());
            if original.has_value() {
                assert!(copy.value_equals(&original), "{original} should equal its copy");
            }
        }
    }

    #[test]
    fn test_compare_different_names_is_incomparable() {
        for left in one_of_each("left") {
            for right in one_of_each("right") {
                let err = left.compare_to(&right).unwrap_err();
                assert!(matches!(err, TypeError::Incomparable { .. }));
            }
        }
    }

    #[test]
    fn test_compare_different_kinds_is_incomparable() {
        let numeric = ColumnValue::numeric("amount", 10).unwrap();
        let decimal = ColumnValue::decimal("amount", Decimal::new(10, 0)).unwrap();
        assert!(matches!(
            numeric.compare_to(&decimal),
            Err(TypeError::Incomparable { .. })
        ));
        assert!(!numeric.value_equals(&decimal));
    }

    #[test]
    fn test_null_never_equals() {
        let a = ColumnValue::null("x", ColumnKind::Numeric).unwrap();
        let b = ColumnValue::null("x", ColumnKind::Numeric).unwrap();
        assert!(!a.value_equals(&b));
        assert!(!a.value_equals(&a));
        assert_ne!(a, b);
        assert_eq!(a.compare_to(&b).unwrap(), None);

        let present = ColumnValue::numeric("x", 1).unwrap();
        assert_eq!(a.compare_to(&present).unwrap(), None);
        assert_eq!(present.compare_to(&a).unwrap(), None);
    }

    #[test]
    fn test_natural_ordering() {
        let lo = ColumnValue::numeric("n", -5).unwrap();
        let hi = ColumnValue::numeric("n", 7).unwrap();
        assert_eq!(lo.compare_to(&hi).unwrap(), Some(Ordering::Less));

        // Case-sensitive lexicographic order
        let upper = ColumnValue::text("t", "Zebra").unwrap();
        let lower = ColumnValue::text("t", "apple").unwrap();
        assert_eq!(upper.compare_to(&lower).unwrap(), Some(Ordering::Less));

        let d1 = ColumnValue::date("d", NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()).unwrap();
        let d2 = ColumnValue::date("d", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()).unwrap();
        assert!(d1 < d2);

        let a = ColumnValue::unique_id("u", Uuid::from_u128(1)).unwrap();
        let b = ColumnValue::unique_id("u", Uuid::from_u128(2)).unwrap();
        assert_eq!(a.compare_to(&b).unwrap(), Some(Ordering::Less));
    }

    #[test]
    fn test_decimal_compares_numerically() {
        let a = ColumnValue::decimal("price", Decimal::new(150, 2)).unwrap();
        let b = ColumnValue::decimal("price", Decimal::new(15, 1)).unwrap();
        assert!(a.value_equals(&b));
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_hash_follows_value() {
        let a = ColumnValue::text("name", "x").unwrap();
        let b = ColumnValue::text("name", "x").unwrap();
        let c = ColumnValue::text("name", "y").unwrap();
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_ne!(hash_of(&a), hash_of(&c));
    }

    #[test]
    fn test_has_value_is_uniform_across_kinds() {
        // Timestamps used to report the opposite of every other kind; all kinds agree now.
        for value in one_of_each("col") {
            assert_eq!(value.has_value(), value.kind() != ColumnKind::Null, "{value}");
        }
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert!(ColumnValue::timestamp("at", ts).unwrap().has_value());
        assert!(!ColumnValue::null("at", ColumnKind::Timestamp).unwrap().has_value());
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(matches!(
            ColumnValue::numeric("", 1),
            Err(TypeError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_bind_parameter_chains_indexes() {
        let mut stmt = Statement::new("UPDATE t SET a = ?, b = ? WHERE id = ?");
        let a = ColumnValue::numeric("a", 1).unwrap();
        let b = ColumnValue::text("b", "two").unwrap();
        let id = ColumnValue::numeric("id", 3).unwrap();
        let next = a.bind_parameter(&mut stmt, 1);
        let next = b.bind_parameter(&mut stmt, next);
        let next = id.bind_parameter(&mut stmt, next);
        assert_eq!(next, 4);
        let params = stmt.parameters().unwrap();
        assert_eq!(params.len(), 3);
        assert!(params[1].sql_eq(&Value::Text("two".into())));
    }

    #[test]
    fn test_option_binds_typed_null() {
        let value: Value = Option::<i64>::None.into();
        assert!(matches!(value, Value::Null(ColumnKind::Numeric)));
        let value: Value = Some(Decimal::ONE).into();
        assert_eq!(value.kind(), ColumnKind::Decimal);
    }
}
