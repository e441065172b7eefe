//! Wire encoding for column values
//!
//! Each value travels as `{name, kind, value}` where `value` is the string form for
//! its kind. Decoding dispatches on the kind tag and fails with a [`DecodeError`] when
//! the string does not parse.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::{DecodeError, TypeError};
use crate::types::{ColumnKind, ColumnValue, Value};

/// `yyyy-MM-dd HH:mm:ss.SSS`, used for both dates and timestamps
pub const WIRE_DATETIME_PATTERN: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Transport form of a column value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireColumnValue {
    pub name: String,
    pub kind: String,
    /// For NULL this carries the declared kind tag
    pub value: String,
}

/// String form of a value for its kind
pub(crate) fn wire_string(value: &Value) -> String {
    match value {
        Value::Numeric(n) => n.to_string(),
        Value::Decimal(d) => d.to_string(),
        Value::Text(s) => s.clone(),
        Value::Date(d) => d
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.format(WIRE_DATETIME_PATTERN).to_string())
            .unwrap_or_default(),
        Value::Timestamp(t) => t.format(WIRE_DATETIME_PATTERN).to_string(),
        Value::UniqueId(u) => u.hyphenated().to_string(),
        Value::Null(declared) => declared.tag().to_string(),
    }
}

pub fn encode_column(column: &ColumnValue) -> WireColumnValue {
    WireColumnValue {
        name: column.name().to_string(),
        kind: column.kind().tag().to_string(),
        value: wire_string(column.value()),
    }
}

pub fn decode_column(wire: &WireColumnValue) -> Result<ColumnValue, TypeError> {
    let fail = |reason: String| DecodeError {
        name: wire.name.clone(),
        kind: wire.kind.clone(),
        value: wire.value.clone(),
        reason,
    };

    let kind = ColumnKind::from_tag(&wire.kind)
        .ok_or_else(|| fail("unknown kind tag".to_string()))?;

    let value = match kind {
        ColumnKind::Numeric => i64::from_str(&wire.value)
            .map(Value::Numeric)
            .map_err(|e| fail(e.to_string()))?,
        ColumnKind::Decimal => Decimal::from_str(&wire.value)
            .map(Value::Decimal)
            .map_err(|e| fail(e.to_string()))?,
        ColumnKind::Text => Value::Text(wire.value.clone()),
        ColumnKind::Date => parse_datetime(&wire.value)
            .map(|dt| Value::Date(dt.date()))
            .map_err(fail)?,
        ColumnKind::Timestamp => parse_datetime(&wire.value)
            .map(Value::Timestamp)
            .map_err(fail)?,
        ColumnKind::UniqueId => Uuid::parse_str(&wire.value)
            .map(Value::UniqueId)
            .map_err(|e| fail(e.to_string()))?,
        ColumnKind::Null => {
            let declared = ColumnKind::from_tag(&wire.value)
                .ok_or_else(|| fail("unknown declared kind for NULL".to_string()))?;
            Value::Null(declared)
        }
    };

    ColumnValue::new(wire.name.clone(), value)
}

fn parse_datetime(value: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(value, WIRE_DATETIME_PATTERN).map_err(|e| {
        format!("expected pattern yyyy-MM-dd HH:mm:ss.SSS ({e})")
    })
}

impl From<ColumnValue> for WireColumnValue {
    fn from(column: ColumnValue) -> Self {
        encode_column(&column)
    }
}

impl TryFrom<WireColumnValue> for ColumnValue {
    type Error = TypeError;

    fn try_from(wire: WireColumnValue) -> Result<Self, Self::Error> {
        decode_column(&wire)
    }
}

impl WireColumnValue {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn wire(name: &str, kind: &str, value: &str) -> WireColumnValue {
        WireColumnValue {
            name: name.to_string(),
            kind: kind.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_timestamp_uses_millisecond_pattern() {
        let ts = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_milli_opt(23, 59, 58, 7)
            .unwrap();
        let encoded = encode_column(&ColumnValue::timestamp("created", ts).unwrap());
        assert_eq!(encoded.kind, "timestamp");
        assert_eq!(encoded.value, "2024-02-29 23:59:58.007");
    }

    #[test]
    fn test_decode_dispatches_on_kind() {
        let decoded = decode_column(&wire("qty", "numeric", "12")).unwrap();
        assert_eq!(decoded.as_i64(), Some(12));

        let decoded = decode_column(&wire("day", "date", "2024-05-01 00:00:00.000")).unwrap();
        assert_eq!(decoded.as_date(), NaiveDate::from_ymd_opt(2024, 5, 1));

        let decoded = decode_column(&wire("price", "decimal", "10.50")).unwrap();
        assert_eq!(decoded.as_decimal(), Some(Decimal::new(105, 1)));

        let decoded = decode_column(&wire("note", "null", "text")).unwrap();
        assert!(!decoded.has_value());
    }

    #[test]
    fn test_decode_errors_are_structured() {
        let cases = [
            wire("qty", "numeric", "twelve"),
            wire("id", "unique_id", "not-a-uuid"),
            wire("day", "date", "05/01/2024"),
            wire("at", "timestamp", "2024-05-01"),
            wire("x", "blob", "00"),
        ];
        for case in cases {
            match decode_column(&case) {
                Err(TypeError::Decode(err)) => {
                    assert_eq!(err.name, case.name);
                    assert_eq!(err.value, case.value);
                }
                other => panic!("expected decode error for {case:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_column_value_serde_goes_through_wire_form() {
        let id = Uuid::new_v4();
        let column = ColumnValue::unique_id("order_id", id).unwrap();
        let json = serde_json::to_string(&column).unwrap();
        assert!(json.contains("\"kind\":\"unique_id\""));
        let back: ColumnValue = serde_json::from_str(&json).unwrap();
        assert!(back.value_equals(&column));

        let bad = r#"{"name":"order_id","kind":"unique_id","value":"zzz"}"#;
        assert!(serde_json::from_str::<ColumnValue>(bad).is_err());
    }
}
