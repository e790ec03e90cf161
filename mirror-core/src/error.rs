//! Error types for mirror operations

use thiserror::Error;

/// Errors raised while retrieving a batch from the remote source.
///
/// These are transient: the refresh cycle that hit them is abandoned, the
/// previous snapshot stays in place and the next tick retries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Source {source_name} unavailable: {reason}")]
    Unavailable { source_name: String, reason: String },

    #[error("Query failed: {reason}")]
    Query { reason: String },

    #[error("Failed to decode records: {reason}")]
    Decode { reason: String },
}

impl FetchError {
    pub fn unavailable(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    pub fn query(reason: impl Into<String>) -> Self {
        Self::Query {
            reason: reason.into(),
        }
    }

    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }
}

/// Setup mistakes. Retrying cannot fix these.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Field cannot be resolved on record: {field}")]
    UnresolvableField { field: String },

    #[error("Identifier field {field} yielded {count} values, expected exactly one")]
    MultiValuedId { field: String, count: usize },

    #[error("Field name must not be empty")]
    EmptyFieldName,

    #[error("Refresh interval must be greater than zero")]
    InvalidInterval,

    #[error("Invalid value for {var}: {value} - {reason}")]
    InvalidEnv {
        var: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all mirror errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MirrorError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl MirrorError {
    /// Configuration errors stop the refresh loop; fetch errors do not.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Result type alias for mirror operations.
pub type MirrorResult<T> = Result<T, MirrorError>;
