//! Error types for logship operations.
//!
//! This module defines [`Error`], the error type returned by the shipper's
//! public API, along with a convenient [`Result`] type alias.

use common::StorageError;

/// Error type for logship operations.
///
/// Remote failures inside the batching pipeline are logged rather than
/// returned, so producers only ever see [`Config`](Error::Config) at
/// construction time and [`Shutdown`](Error::Shutdown) after close. The
/// remaining variants surface from explicit flushes and from the writer and
/// retention APIs used directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The remote store rejected or failed a request.
    Storage(String),

    /// A remote object that was expected to exist is missing.
    NotFound(String),

    /// Invalid input or parameter errors.
    InvalidInput(String),

    /// The configuration cannot be used to start a shipper.
    Config(String),

    /// Internal errors indicating bugs or invariant violations.
    Internal(String),

    /// The shipper has been closed and no longer accepts work.
    Shutdown,
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Storage(msg) => write!(f, "Storage error: {}", msg),
            Error::NotFound(name) => write!(f, "Object not found: {}", name),
            Error::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
            Error::Shutdown => write!(f, "Shipper is shut down"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Storage(msg) => Error::Storage(msg),
            StorageError::NotFound(name) => Error::NotFound(name),
            StorageError::Internal(msg) => Error::Internal(msg),
        }
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::InvalidInput(msg.to_string())
    }
}

/// Result type alias for logship operations.
pub type Result<T> = std::result::Result<T, Error>;
