//! Primary keys
//!
//! A key is an ordered list of non-null column values tagged with how it came to be:
//! supplied by the caller (natural), generated at insert time (surrogate), or derived
//! from an owner's key plus local columns (composite). The kind is part of identity.

use crate::errors::PersistError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use type_mapping::{encode_column, ColumnValue, Statement};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    Natural,
    Surrogate,
    Composite,
}

impl KeyKind {
    fn prefix(self) -> char {
        match self {
            KeyKind::Natural => 'N',
            KeyKind::Surrogate => 'S',
            KeyKind::Composite => 'C',
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::Natural => write!(f, "natural"),
            KeyKind::Surrogate => write!(f, "surrogate"),
            KeyKind::Composite => write!(f, "composite"),
        }
    }
}

/// Typed identity of an entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawPrimaryKey", into = "RawPrimaryKey")]
pub struct PrimaryKey {
    kind: KeyKind,
    parent: Option<Box<PrimaryKey>>,
    columns: Vec<ColumnValue>,
}

#[derive(Serialize, Deserialize)]
struct RawPrimaryKey {
    kind: KeyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<Box<PrimaryKey>>,
    columns: Vec<ColumnValue>,
}

impl From<PrimaryKey> for RawPrimaryKey {
    fn from(key: PrimaryKey) -> Self {
        Self {
            kind: key.kind,
            parent: key.parent,
            columns: key.columns,
        }
    }
}

impl TryFrom<RawPrimaryKey> for PrimaryKey {
    type Error = PersistError;

    fn try_from(raw: RawPrimaryKey) -> Result<Self, Self::Error> {
        match (raw.kind, raw.parent) {
            (KeyKind::Composite, Some(parent)) => Self::composite(*parent, raw.columns),
            (KeyKind::Composite, None) => Err(PersistError::invalid("composite key without parent")),
            (_, Some(_)) => Err(PersistError::invalid(format!(
                "{} key cannot have a parent",
                raw.kind
            ))),
            (KeyKind::Natural, None) => Self::natural(raw.columns),
            (KeyKind::Surrogate, None) => {
                let mut columns = raw.columns;
                if columns.len() != 1 {
                    return Err(PersistError::invalid(
                        "surrogate key must have exactly one column",
                    ));
                }
                Self::surrogate(columns.remove(0))
            }
        }
    }
}

fn check_columns<'a>(
    columns: &[ColumnValue],
    inherited: impl Iterator<Item = &'a ColumnValue>,
) -> Result<(), PersistError> {
    if columns.is_empty() {
        return Err(PersistError::invalid("primary key needs at least one column"));
    }
    let mut names: HashSet<&str> = inherited.map(ColumnValue::name).collect();
    for column in columns {
        if !column.has_value() {
            return Err(PersistError::invalid(format!(
                "primary key column '{}' is NULL",
                column.name()
            )));
        }
        if !names.insert(column.name()) {
            return Err(PersistError::invalid(format!(
                "primary key column '{}' appears twice",
                column.name()
            )));
        }
    }
    Ok(())
}

impl PrimaryKey {
    /// Key from caller-supplied business values
    pub fn natural(columns: Vec<ColumnValue>) -> Result<Self, PersistError> {
        check_columns(&columns, std::iter::empty())?;
        Ok(Self {
            kind: KeyKind::Natural,
            parent: None,
            columns,
        })
    }

    /// Generated single-column key
    pub fn surrogate(column: ColumnValue) -> Result<Self, PersistError> {
        let columns = vec![column];
        check_columns(&columns, std::iter::empty())?;
        Ok(Self {
            kind: KeyKind::Surrogate,
            parent: None,
            columns,
        })
    }

    pub fn surrogate_numeric(name: &str, value: i64) -> Result<Self, PersistError> {
        Self::surrogate(ColumnValue::numeric(name, value)?)
    }

    pub fn surrogate_uuid(name: &str, value: Uuid) -> Result<Self, PersistError> {
        Self::surrogate(ColumnValue::unique_id(name, value)?)
    }

    /// Owner key plus local sub-key columns
    pub fn composite(parent: PrimaryKey, columns: Vec<ColumnValue>) -> Result<Self, PersistError> {
        check_columns(&columns, parent.all_columns().into_iter())?;
        Ok(Self {
            kind: KeyKind::Composite,
            parent: Some(Box::new(parent)),
            columns,
        })
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn parent(&self) -> Option<&PrimaryKey> {
        self.parent.as_deref()
    }

    /// Own columns, without the parent's
    pub fn columns(&self) -> &[ColumnValue] {
        &self.columns
    }

    /// Every column in binding order: parent first
    pub fn all_columns(&self) -> Vec<&ColumnValue> {
        let mut all = self
            .parent
            .as_ref()
            .map(|p| p.all_columns())
            .unwrap_or_default();
        all.extend(self.columns.iter());
        all
    }

    pub fn column(&self, name: &str) -> Option<&ColumnValue> {
        self.all_columns().into_iter().find(|c| c.name() == name)
    }

    /// `a = ? AND b = ?` over the key columns, parent first
    pub fn sql_where_expression(&self, prefix: Option<&str>) -> String {
        let own = self
            .columns
            .iter()
            .map(|c| match prefix {
                Some(p) => format!("{}.{} = ?", p, c.name()),
                None => format!("{} = ?", c.name()),
            })
            .collect::<Vec<_>>()
            .join(" AND ");
        match &self.parent {
            Some(parent) => format!("{} AND {}", parent.sql_where_expression(prefix), own),
            None => own,
        }
    }

    /// Bind the key columns from `start`, parent first; returns the next free index
    pub fn bind_parameters(&self, statement: &mut Statement, start: usize) -> usize {
        let mut index = match &self.parent {
            Some(parent) => parent.bind_parameters(statement, start),
            None => start,
        };
        for column in &self.columns {
            index = column.bind_parameter(statement, index);
        }
        index
    }

    /// Canonical string form.
    ///
    /// Every value is written with its kind tag and length, so no two distinct keys of one
    /// entity type share a string.
    pub fn string_key(&self) -> String {
        let mut out = String::new();
        self.write_string_key(&mut out);
        out
    }

    fn write_string_key(&self, out: &mut String) {
        out.push(self.kind.prefix());
        if let Some(parent) = &self.parent {
            out.push('[');
            parent.write_string_key(out);
            out.push(']');
        }
        out.push('(');
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            let wire = encode_column(column);
            out.push_str(&format!(
                "{}={}:{}:{}",
                wire.name,
                wire.kind,
                wire.value.len(),
                wire.value
            ));
        }
        out.push(')');
    }

    /// Human readable `name=value, ..` list for diagnostics
    pub fn value_list(&self) -> String {
        self.all_columns()
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Order two keys of the same shape: parent first, then columns left to right
    pub fn compare_to(&self, other: &PrimaryKey) -> Result<Ordering, PersistError> {
        if self.kind != other.kind {
            return Err(PersistError::Incomparable {
                left: self.value_list(),
                right: other.value_list(),
                reason: format!("{} key is not comparable with {} key", self.kind, other.kind),
            });
        }
        if self.columns.len() != other.columns.len() {
            return Err(PersistError::Incomparable {
                left: self.value_list(),
                right: other.value_list(),
                reason: "keys have different column counts".to_string(),
            });
        }
        if let (Some(mine), Some(theirs)) = (&self.parent, &other.parent) {
            let parent_order = mine.compare_to(theirs)?;
            if parent_order != Ordering::Equal {
                return Ok(parent_order);
            }
        }
        for (mine, theirs) in self.columns.iter().zip(&other.columns) {
            match mine.compare_to(theirs)? {
                Some(Ordering::Equal) => continue,
                Some(order) => return Ok(order),
                None => {
                    return Err(PersistError::Incomparable {
                        left: mine.to_string(),
                        right: theirs.to_string(),
                        reason: "NULL has no order".to_string(),
                    })
                }
            }
        }
        Ok(Ordering::Equal)
    }
}

impl PartialEq for PrimaryKey {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.parent == other.parent
            && self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.value_equals(b))
    }
}

impl Eq for PrimaryKey {}

impl Hash for PrimaryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.parent.hash(state);
        self.columns.hash(state);
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.value_list())
    }
}
