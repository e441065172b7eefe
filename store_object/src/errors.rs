//! Error types for the persistence engine
//!
//! Every error carries a stable message key plus positional arguments so callers can
//! render it in their own language. Driver text is only ever attached as the source.

use crate::connection::DriverError;
use crate::primary_key::PrimaryKey;
use crate::status::Operation;
use cache_system::CacheError;
use thiserror::Error;
use type_mapping::{DecodeError, TypeError};

/// An entity a batch could not persist, with its index in the batch input
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub position: usize,
    pub key: Option<PrimaryKey>,
}

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Cannot compare {left} with {right}: {reason}")]
    Incomparable {
        left: String,
        right: String,
        reason: String,
    },

    #[error("{entity_type} has no primary key for {operation}")]
    NoPrimaryKey {
        entity_type: String,
        operation: Operation,
    },

    #[error("{operation} of {entity_type} {key} failed")]
    Execution {
        entity_type: String,
        key: String,
        operation: Operation,
        #[source]
        source: DriverError,
    },

    #[error("{} of {submitted} {operation} statements for {entity_type} failed", failures.len())]
    BatchPartialFailure {
        entity_type: String,
        operation: Operation,
        submitted: usize,
        failures: Vec<BatchFailure>,
        not_executed: usize,
        #[source]
        source: Option<DriverError>,
    },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("{entity_type} {key} violates '{rule}'")]
    ConstraintViolation {
        entity_type: String,
        key: String,
        rule: String,
    },

    #[error("Unknown subsystem: {0}")]
    UnknownSubsystem(String),

    #[error("Connection to subsystem {subsystem} failed")]
    Connection {
        subsystem: String,
        #[source]
        source: DriverError,
    },

    #[error("Cache {operation} failed")]
    Cache {
        operation: String,
        #[source]
        source: CacheError,
    },

    #[error("Could not evict {entity_type} {key} from cache")]
    CacheInvalidation {
        entity_type: String,
        key: String,
        #[source]
        source: CacheError,
    },

    #[error("Unit of work on {subsystem} did not finish within {seconds}s; outcome unknown")]
    Timeout { subsystem: String, seconds: u64 },

    #[error("Unit of work worker failed: {0}")]
    Worker(String),
}

impl From<TypeError> for PersistError {
    fn from(error: TypeError) -> Self {
        match error {
            TypeError::InvalidParameters(message) => PersistError::InvalidParameters(message),
            TypeError::Incomparable {
                left,
                right,
                reason,
            } => PersistError::Incomparable {
                left,
                right,
                reason,
            },
            TypeError::Decode(decode) => PersistError::Decode(decode),
        }
    }
}

impl PersistError {
    pub fn invalid(message: impl Into<String>) -> Self {
        PersistError::InvalidParameters(message.into())
    }

    pub fn no_primary_key(entity_type: &str, operation: Operation) -> Self {
        PersistError::NoPrimaryKey {
            entity_type: entity_type.to_string(),
            operation,
        }
    }

    pub fn execution(
        entity_type: &str,
        key: Option<&PrimaryKey>,
        operation: Operation,
        source: DriverError,
    ) -> Self {
        PersistError::Execution {
            entity_type: entity_type.to_string(),
            key: key.map(PrimaryKey::value_list).unwrap_or_default(),
            operation,
            source,
        }
    }

    pub fn constraint(entity_type: &str, key: Option<&PrimaryKey>, rule: impl Into<String>) -> Self {
        PersistError::ConstraintViolation {
            entity_type: entity_type.to_string(),
            key: key.map(PrimaryKey::value_list).unwrap_or_default(),
            rule: rule.into(),
        }
    }

    pub fn cache(operation: &str, source: CacheError) -> Self {
        PersistError::Cache {
            operation: operation.to_string(),
            source,
        }
    }

    /// Validation errors abort before the connection is touched
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PersistError::InvalidParameters(_)
                | PersistError::Incomparable { .. }
                | PersistError::NoPrimaryKey { .. }
                | PersistError::ConstraintViolation { .. }
        )
    }

    /// Stable key for localized rendering
    pub fn message_key(&self) -> &'static str {
        match self {
            PersistError::InvalidParameters(_) => "persist.invalid_parameters",
            PersistError::Incomparable { .. } => "persist.incomparable",
            PersistError::NoPrimaryKey { .. } => "persist.no_primary_key",
            PersistError::Execution { .. } => "persist.execution_failed",
            PersistError::BatchPartialFailure { .. } => "persist.batch_partial_failure",
            PersistError::Decode(_) => "persist.decode_failed",
            PersistError::ConstraintViolation { .. } => "persist.constraint_violation",
            PersistError::UnknownSubsystem(_) => "persist.unknown_subsystem",
            PersistError::Connection { .. } => "persist.connection_failed",
            PersistError::Cache { .. } => "persist.cache_failed",
            PersistError::CacheInvalidation { .. } => "persist.cache_invalidation_failed",
            PersistError::Timeout { .. } => "persist.timeout",
            PersistError::Worker(_) => "persist.worker_failed",
        }
    }

    /// Positional arguments for the message key
    pub fn message_args(&self) -> Vec<String> {
        match self {
            PersistError::InvalidParameters(message) => vec![message.clone()],
            PersistError::Incomparable {
                left,
                right,
                reason,
            } => vec![left.clone(), right.clone(), reason.clone()],
            PersistError::NoPrimaryKey {
                entity_type,
                operation,
            } => vec![entity_type.clone(), operation.to_string()],
            PersistError::Execution {
                entity_type,
                key,
                operation,
                ..
            } => vec![entity_type.clone(), key.clone(), operation.to_string()],
            PersistError::BatchPartialFailure {
                entity_type,
                operation,
                submitted,
                failures,
                ..
            } => {
                let keys = failures
                    .iter()
                    .filter_map(|f| f.key.as_ref().map(PrimaryKey::value_list))
                    .collect::<Vec<_>>()
                    .join("; ");
                vec![
                    entity_type.clone(),
                    operation.to_string(),
                    failures.len().to_string(),
                    submitted.to_string(),
                    keys,
                ]
            }
            PersistError::Decode(decode) => {
                vec![decode.name.clone(), decode.kind.clone(), decode.value.clone()]
            }
            PersistError::ConstraintViolation {
                entity_type,
                key,
                rule,
            } => vec![entity_type.clone(), key.clone(), rule.clone()],
            PersistError::UnknownSubsystem(subsystem) => vec![subsystem.clone()],
            PersistError::Connection { subsystem, .. } => vec![subsystem.clone()],
            PersistError::Cache { operation, .. } => vec![operation.clone()],
            PersistError::CacheInvalidation {
                entity_type, key, ..
            } => vec![entity_type.clone(), key.clone()],
            PersistError::Timeout { subsystem, seconds } => {
                vec![subsystem.clone(), seconds.to_string()]
            }
            PersistError::Worker(message) => vec![message.clone()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use type_mapping::ColumnValue;

    #[test]
    fn test_driver_text_is_not_the_message() {
        let key = PrimaryKey::natural(vec![ColumnValue::text("sku", "A-1").unwrap()]).unwrap();
        let error = PersistError::execution(
            "product",
            Some(&key),
            Operation::Update,
            DriverError::new(Some("23514".into()), "check constraint qty_positive violated"),
        );

        assert_eq!(error.message_key(), "persist.execution_failed");
        assert_eq!(error.message_args(), vec!["product", "sku=A-1", "update"]);
        assert!(!error.to_string().contains("qty_positive"));
        let source = std::error::Error::source(&error).unwrap();
        assert!(source.to_string().contains("qty_positive"));
    }

    #[test]
    fn test_type_errors_map_onto_taxonomy() {
        let left = ColumnValue::numeric("a", 1).unwrap();
        let right = ColumnValue::numeric("b", 1).unwrap();
        let error: PersistError = left.compare_to(&right).unwrap_err().into();
        assert_eq!(error.message_key(), "persist.incomparable");
        assert!(error.is_validation());
    }
}
