//! In-memory append store.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bytes::Bytes;

use super::{AppendStore, ListPage, StorageError, StorageResult};

/// Default number of names returned per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// An [`AppendStore`] that keeps every object in process memory.
///
/// Objects are kept in name order, so listings are lexicographic and the
/// continuation token is simply the last name returned.
#[derive(Debug)]
pub struct InMemoryAppendStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
    page_size: usize,
}

impl Default for InMemoryAppendStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAppendStore {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Limits listing pages to `page_size` names (at least one).
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Returns the full contents of `name`, if it exists.
    pub fn contents(&self, name: &str) -> Option<Bytes> {
        self.read().get(name).map(|data| Bytes::copy_from_slice(data))
    }

    /// Returns every object name, in order.
    pub fn names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Stores `data` under `name`, replacing any existing object.
    pub fn insert(&self, name: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.write().insert(name.into(), data.into());
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.objects.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.objects.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AppendStore for InMemoryAppendStore {
    async fn create_if_absent(&self, name: &str) -> StorageResult<()> {
        self.write().entry(name.to_string()).or_default();
        Ok(())
    }

    async fn append_block(&self, name: &str, block: Bytes) -> StorageResult<()> {
        let mut objects = self.write();
        let object = objects
            .get_mut(name)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
        object.extend_from_slice(&block);
        Ok(())
    }

    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<String>,
    ) -> StorageResult<ListPage> {
        let objects = self.read();
        let start = match continuation.as_deref() {
            Some(token) => Bound::Excluded(token),
            None => Bound::Included(prefix),
        };
        let mut matching = objects
            .range::<str, _>((start, Bound::Unbounded))
            .map(|(name, _)| name)
            .take_while(|name| name.starts_with(prefix));

        let names: Vec<String> = matching.by_ref().take(self.page_size).cloned().collect();
        let continuation = match matching.next() {
            Some(_) => names.last().cloned(),
            None => None,
        };
        Ok(ListPage {
            names,
            continuation,
        })
    }

    async fn delete(&self, name: &str) -> StorageResult<()> {
        self.write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }
}
