//! Remote append-only object storage.
//!
//! [`AppendStore`] is the narrow surface the log shipper needs from a remote
//! store: create an object, append a block to it, list names under a prefix
//! one page at a time, and delete by name.

pub mod config;
pub mod factory;
pub mod in_memory;
pub mod object;

use async_trait::async_trait;
use bytes::Bytes;

/// Error type for storage operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The remote store rejected or failed the request.
    Storage(String),

    /// The named object does not exist.
    NotFound(String),

    /// Unexpected internal failure.
    Internal(String),
}

impl StorageError {
    /// Returns true when the error reports a missing object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

impl std::error::Error for StorageError {}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Storage(msg) => write!(f, "Storage error: {}", msg),
            StorageError::NotFound(name) => write!(f, "Object not found: {}", name),
            StorageError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl From<object_store::Error> for StorageError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => StorageError::NotFound(path),
            other => StorageError::Storage(other.to_string()),
        }
    }
}

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// One page of a prefix listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Object names on this page, in the store's listing order.
    pub names: Vec<String>,

    /// Token for the next page, or `None` when the listing is complete.
    pub continuation: Option<String>,
}

/// A remote store of append-only objects addressed by name.
///
/// Implementations must tolerate concurrent independent calls. Callers are
/// responsible for serializing appends to the same object.
#[async_trait]
pub trait AppendStore: Send + Sync + 'static {
    /// Creates an empty object named `name` unless it already exists.
    async fn create_if_absent(&self, name: &str) -> StorageResult<()>;

    /// Appends `block` to the end of the object `name`.
    ///
    /// Fails with [`StorageError::NotFound`] if the object does not exist.
    async fn append_block(&self, name: &str, block: Bytes) -> StorageResult<()>;

    /// Lists object names starting with `prefix`.
    ///
    /// Pass `None` to fetch the first page, then the previous page's
    /// continuation until it comes back `None`.
    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<String>,
    ) -> StorageResult<ListPage>;

    /// Deletes the object `name`.
    ///
    /// Fails with [`StorageError::NotFound`] if the object does not exist.
    async fn delete(&self, name: &str) -> StorageResult<()>;
}
