//! Error types for the data access layer
//!
//! Every failure an engine operation can produce is one of the variants
//! below. Mapping, configuration, validation, and query-construction
//! errors are raised before any statement executes; backend errors are
//! passed through from the underlying driver unmodified.

use thiserror::Error;

/// Result type alias for data access operations
pub type DataResult<T> = Result<T, DataError>;

/// Error taxonomy for the data access engine
#[derive(Debug, Clone, Error)]
pub enum DataError {
    /// Backend selection could not be resolved from the configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Model metadata problem: missing id field, id type mismatch,
    /// duplicate add-on registration, unserializable model
    #[error("mapping error: {0}")]
    Mapping(String),

    /// Payload failed to deserialize into the target model type
    #[error("validation error: {0}")]
    Validation(String),

    /// A mutating bulk operation was requested with zero conditions
    /// under the fail-fast policy
    #[error("query construction error: {0}")]
    QueryConstruction(String),

    /// The value binder saw a runtime kind with no registered conversion
    #[error("unsupported value type: {0}")]
    UnsupportedType(String),

    /// Opaque failure from the underlying connection or driver
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for DataError {
    fn from(err: sqlx::Error) -> Self {
        DataError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::Validation(err.to_string())
    }
}
