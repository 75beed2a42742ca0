//! Error types for directory operations.
//!
//! A single error enum covers every failure the client can surface. Transport errors are
//! classified by the operation that produced them (connect/bind, search, modify) so callers can
//! react without inspecting LDAP result codes themselves.

use thiserror::Error;

/// Main error type for directory operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The directory was unreachable or rejected the bind
    #[error("Connection failed: {0}")]
    ConnectionError(String),

    /// Malformed filter or transport-level search failure
    #[error("Query failed: {0}")]
    QueryError(String),

    /// No matching account or entry for a single-result lookup
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unparseable name or attribute value
    #[error("Invalid format: {0}")]
    FormatError(String),

    /// Directory-side write was rejected
    #[error("Directory operation failed: {0}")]
    OperationError(String),

    /// Operation timed out
    #[error("Timeout waiting for directory: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid request (caller error)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Specialized result type for directory operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConnectionError(_) => "CONNECTION_ERROR",
            Self::QueryError(_) => "QUERY_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::FormatError(_) => "FORMAT_ERROR",
            Self::OperationError(_) => "OPERATION_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::ValidationError(_) => "VALIDATION_ERROR",
        }
    }

    /// Returns true if this error should be logged as a serious error.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::ConnectionError(_)
                | Self::QueryError(_)
                | Self::OperationError(_)
                | Self::Timeout(_)
                | Self::ConfigError(_)
        )
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::ConfigError(format!("invalid directory URL: {err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ValidationError(err.to_string())
    }
}
