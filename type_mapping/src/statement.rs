//! Parameterized SQL statement
//!
//! Statement text uses `?` placeholders; parameters are bound positionally starting at 1.
//! Backends translate the placeholders into their own dialect.

use crate::errors::TypeError;
use crate::types::Value;

#[derive(Debug, Clone)]
pub struct Statement {
    sql: String,
    params: Vec<Option<Value>>,
    /// Set once something was bound at position 0
    zero_bound: bool,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            zero_bound: false,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Bind `value` at the 1-based position `index` and return `index + 1`.
    ///
    /// Rebinding a position overwrites it. Position 0 does not exist; binding there
    /// is remembered and reported by [`Statement::parameters`].
    pub fn bind(&mut self, index: usize, value: impl Into<Value>) -> usize {
        if index == 0 {
            self.zero_bound = true;
            return 1;
        }
        if self.params.len() < index {
            self.params.resize(index, None);
        }
        self.params[index - 1] = Some(value.into());
        index + 1
    }

    /// Number of placeholders in the statement text
    pub fn placeholder_count(&self) -> usize {
        let mut count = 0;
        let mut in_quotes = false;
        for c in self.sql.chars() {
            match c {
                '\'' => in_quotes = !in_quotes,
                '?' if !in_quotes => count += 1,
                _ => {}
            }
        }
        count
    }

    /// Bound parameters in position order; fails on a gap
    pub fn parameters(&self) -> Result<Vec<&Value>, TypeError> {
        if self.zero_bound {
            return Err(TypeError::invalid(format!(
                "parameters of '{}' are numbered from 1, but one was bound at 0",
                self.sql
            )));
        }
        self.params
            .iter()
            .enumerate()
            .map(|(i, p)| {
                p.as_ref().ok_or_else(|| {
                    TypeError::invalid(format!(
                        "parameter {} of '{}' was never bound",
                        i + 1,
                        self.sql
                    ))
                })
            })
            .collect()
    }

    /// Check that every placeholder has exactly one bound value
    pub fn check_bound(&self) -> Result<(), TypeError> {
        let bound = self.parameters()?.len();
        let expected = self.placeholder_count();
        if bound != expected {
            return Err(TypeError::invalid(format!(
                "'{}' has {} placeholders but {} parameters were bound",
                self.sql, expected, bound
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_returns_next_index() {
        let mut stmt = Statement::new("INSERT INTO t (a, b) VALUES (?, ?)");
        let next = stmt.bind(1, 10i64);
        assert_eq!(next, 2);
        assert_eq!(stmt.bind(next, "x"), 3);
        assert!(stmt.check_bound().is_ok());
    }

    #[test]
    fn test_gap_is_reported() {
        let mut stmt = Statement::new("SELECT * FROM t WHERE a = ? AND b = ?");
        stmt.bind(2, 1i64);
        assert!(stmt.parameters().is_err());
    }

    #[test]
    fn test_index_zero_is_reported() {
        let mut stmt = Statement::new("UPDATE t SET a = ? WHERE b = ?");
        let next = stmt.bind(0, 1i64);
        assert_eq!(next, 1);
        stmt.bind(next, 2i64);
        stmt.bind(2, 3i64);
        assert!(stmt.parameters().is_err());
        assert!(stmt.check_bound().is_err());
    }

    #[test]
    fn test_placeholders_inside_quotes_are_ignored() {
        let stmt = Statement::new("SELECT * FROM t WHERE a = '?' AND b = ?");
        assert_eq!(stmt.placeholder_count(), 1);
    }

    #[test]
    fn test_count_mismatch() {
        let mut stmt = Statement::new("DELETE FROM t WHERE a = ?");
        stmt.bind(1, 1i64);
        stmt.bind(2, 2i64);
        assert!(stmt.check_bound().is_err());
    }
}
