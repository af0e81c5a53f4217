//! Error types for patent-upload.

use thiserror::Error;

/// Result type alias using patent-upload's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for patent-upload operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Bulk insert into a named table failed; the enclosing transaction is rolled back
    #[error("Insert into {table} failed: {source}")]
    Persist {
        table: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// Provider answered with a non-success status
    #[error("Provider error: {0}")]
    Provider(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Provider response did not have the expected JSON shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Message broker operation failed
    #[error("Broker error: {0}")]
    Broker(String),

    /// Run was cancelled by shutdown or timeout
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the error came from the network or the provider and may
    /// succeed when the same request is sent again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Request(_) | Error::Provider(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
