//! Unified error types for routecache.
//!
//! The display prefix carries a stable code so log lines can be grepped
//! without parsing the message.

use tokio_rusqlite::rusqlite;

use crate::config::ConfigError;

/// Unified error type shared by the store, the fetcher and the controller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bulk population of a generation failed.
    #[error("INSTALL_FAILED: {0}")]
    Install(String),

    /// Transport-level fetch failure (DNS, connect, reset, body read).
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// Fetch did not complete in time.
    #[error("FETCH_TIMEOUT: {0}")]
    Timeout(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Partial responses are never stored.
    #[error("PARTIAL_CONTENT: {0}")]
    PartialContent(String),

    /// Response could not be converted into a snapshot.
    #[error("INVALID_RESPONSE: {0}")]
    InvalidResponse(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A background refresh task panicked or was cancelled.
    #[error("TASK_FAILED: {0}")]
    TaskFailed(String),

    /// Configuration could not be loaded or is invalid.
    #[error("CONFIG_ERROR: {0}")]
    Config(#[from] ConfigError),

    /// Stored headers could not be encoded or decoded.
    #[error("CACHE_ERROR: corrupt headers: {0}")]
    CorruptHeaders(#[from] serde_json::Error),
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl Error {
    /// Whether the error came from the network primitive rather than the store.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Timeout(_))
    }
}
