//! Error types for column values and their wire encoding

use thiserror::Error;

/// Errors raised while building, comparing or decoding column values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypeError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Cannot compare column '{left}' with column '{right}': {reason}")]
    Incomparable {
        left: String,
        right: String,
        reason: String,
    },

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// A wire value that does not parse into its declared kind
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Cannot decode column '{name}' as {kind}: {reason} (value '{value}')")]
pub struct DecodeError {
    pub name: String,
    pub kind: String,
    pub value: String,
    pub reason: String,
}

impl TypeError {
    pub fn invalid(message: impl Into<String>) -> Self {
        TypeError::InvalidParameters(message.into())
    }

    pub fn incomparable(left: &str, right: &str, reason: impl Into<String>) -> Self {
        TypeError::Incomparable {
            left: left.to_string(),
            right: right.to_string(),
            reason: reason.into(),
        }
    }
}
