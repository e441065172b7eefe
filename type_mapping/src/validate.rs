//! Validation utilities for column names
//!
//! Column names end up in generated WHERE expressions, so only plain SQL
//! identifiers are accepted.

use crate::errors::TypeError;

/// PostgreSQL identifier length limit
const MAX_LENGTH: usize = 63;

/// Check that a column name is a non-empty SQL identifier
pub fn validate_column_name(name: &str) -> Result<(), TypeError> {
    if name.is_empty() {
        return Err(TypeError::invalid("column name cannot be empty"));
    }

    if name.len() > MAX_LENGTH {
        return Err(TypeError::invalid(format!(
            "column name '{}' is too long: {} characters (max {})",
            name,
            name.len(),
            MAX_LENGTH
        )));
    }

    let first_char = name.chars().next().ok_or_else(|| TypeError::invalid("column name cannot be empty"))?;
    if !first_char.is_ascii_alphabetic() && first_char != '_' {
        return Err(TypeError::invalid(format!(
            "column name '{}' must start with a letter or underscore",
            name
        )));
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(TypeError::invalid(format!(
            "invalid characters in column name '{}': only alphanumeric characters and underscores are allowed",
            name
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_identifiers() {
        assert!(validate_column_name("order_id").is_ok());
        assert!(validate_column_name("_hidden").is_ok());
        assert!(validate_column_name("line2").is_ok());
    }

    #[test]
    fn test_rejects_bad_names() {
        assert!(validate_column_name("").is_err());
        assert!(validate_column_name("2fast").is_err());
        assert!(validate_column_name("name; DROP TABLE x").is_err());
        assert!(validate_column_name(&"a".repeat(64)).is_err());
    }
}
