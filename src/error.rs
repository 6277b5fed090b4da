//! Error definitions.
//!
//! Expected denials (rate limited, bad token, invalid input) are never
//! errors; they are returned as decision values. The types here cover the
//! two real failure classes: the store being unreachable and configuration
//! that cannot be accepted.

use thiserror::Error;

/// Errors raised by a [`SecurityStore`](crate::store::SecurityStore) backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The backend could not be reached or refused the operation.
    #[error("security store unavailable: {0}")]
    Unavailable(String),

    /// The backend answered but the stored value could not be decoded.
    #[error("corrupt store entry for {key}: {detail}")]
    Corrupt { key: String, detail: String },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A single semantic configuration problem.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending setting, e.g. `rate_limit.threshold`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Error type for configuration loading and policy construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("Invalid schema: {0}")]
    Schema(#[from] SchemaError),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Problems found while compiling a declarative input schema.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("schema {schema}: duplicate field {field}")]
    DuplicateField { schema: String, field: String },

    #[error("schema {schema}: field {field} has min {min} greater than max {max}")]
    InvertedRange {
        schema: String,
        field: String,
        min: String,
        max: String,
    },

    #[error("schema {schema}: field {field} has invalid pattern: {detail}")]
    InvalidPattern {
        schema: String,
        field: String,
        detail: String,
    },

    #[error("schema {schema}: field {field} has invalid date bound {value}")]
    InvalidDate {
        schema: String,
        field: String,
        value: String,
    },

    #[error("schema {schema}: field name must not be empty")]
    EmptyFieldName { schema: String },
}
