//! [`AppendStore`] over any [`object_store::ObjectStore`].

use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::TryStreamExt;
use object_store::path::Path;
use object_store::{ObjectStore, PutMode, PutPayload};

use super::{AppendStore, ListPage, StorageError, StorageResult};

/// Adapts a generic object store to append-only semantics.
///
/// Object stores have no append primitive, so each append reads the current
/// object, concatenates the block and writes the result back. This is only
/// correct while a single process writes each object, which is the shipper's
/// operating assumption.
///
/// Listings are returned as a single page sorted by name.
#[derive(Debug, Clone)]
pub struct ObjectAppendStore {
    store: Arc<dyn ObjectStore>,
}

impl ObjectAppendStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Returns the underlying object store.
    pub fn inner(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }
}

/// Directory part of a name prefix, used to narrow the object store listing.
fn list_root(prefix: &str) -> Option<Path> {
    prefix.rfind('/').map(|idx| Path::from(&prefix[..idx]))
}

#[async_trait]
impl AppendStore for ObjectAppendStore {
    async fn create_if_absent(&self, name: &str) -> StorageResult<()> {
        let path = Path::from(name);
        match self
            .store
            .put_opts(&path, PutPayload::new(), PutMode::Create.into())
            .await
        {
            Ok(_) => Ok(()),
            Err(object_store::Error::AlreadyExists { .. }) => Ok(()),
            Err(object_store::Error::NotImplemented) => {
                tracing::debug!(
                    "conditional put not supported, checking {} before creating",
                    name
                );
                match self.store.head(&path).await {
                    Ok(_) => Ok(()),
                    Err(object_store::Error::NotFound { .. }) => {
                        self.store.put(&path, PutPayload::new()).await?;
                        Ok(())
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn append_block(&self, name: &str, block: Bytes) -> StorageResult<()> {
        let path = Path::from(name);
        let existing = match self.store.get(&path).await {
            Ok(result) => result.bytes().await?,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::NotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut combined = BytesMut::with_capacity(existing.len() + block.len());
        combined.extend_from_slice(&existing);
        combined.extend_from_slice(&block);
        self.store
            .put(&path, PutPayload::from(combined.freeze()))
            .await?;
        Ok(())
    }

    async fn list_page(
        &self,
        prefix: &str,
        _continuation: Option<String>,
    ) -> StorageResult<ListPage> {
        let root = list_root(prefix);
        let objects: Vec<_> = self.store.list(root.as_ref()).try_collect().await?;

        let mut names: Vec<String> = objects
            .into_iter()
            .map(|meta| meta.location.to_string())
            .filter(|name| name.starts_with(prefix))
            .collect();
        names.sort();
        Ok(ListPage {
            names,
            continuation: None,
        })
    }

    async fn delete(&self, name: &str) -> StorageResult<()> {
        let path = Path::from(name);
        // Some backends treat deleting a missing object as success.
        match self.store.head(&path).await {
            Ok(_) => {}
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::NotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        }
        match self.store.delete(&path).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
