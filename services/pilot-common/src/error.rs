//! Error types for the Pilot services.

use thiserror::Error;

/// Result type alias using the Pilot error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for Pilot services.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Investment policy could not be loaded (pre-flight)
    #[error("Policy load error: {0}")]
    PolicyLoad(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input or request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// External service error
    #[error("External service error: {0}")]
    External(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,
}

impl Error {
    /// Get HTTP status code for this error.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::InvalidInput(_) => 400,
            Self::Timeout => 408,
            _ => 500,
        }
    }

    /// Check if this is a pre-flight policy failure.
    pub const fn is_policy_load(&self) -> bool {
        matches!(self, Self::PolicyLoad(_))
    }
}
