//! Store doubles shared by the unit tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use common::storage::in_memory::InMemoryAppendStore;
use common::{AppendStore, ListPage, StorageError, StorageResult};

/// An in-memory store that records every call and can be told to fail.
#[derive(Default)]
pub(crate) struct RecordingStore {
    inner: InMemoryAppendStore,
    appends: Mutex<Vec<(String, Bytes)>>,
    creates: AtomicUsize,
    lists: AtomicUsize,
    deletes: Mutex<Vec<String>>,
    fail_appends: AtomicBool,
    fail_creates: AtomicBool,
    fail_lists: AtomicBool,
    failing_deletes: Mutex<HashSet<String>>,
    append_delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_page_size(page_size: usize) -> Self {
        Self {
            inner: InMemoryAppendStore::new().with_page_size(page_size),
            ..Self::default()
        }
    }

    /// Every successful append, in call order.
    pub(crate) fn appends(&self) -> Vec<(String, Bytes)> {
        self.appends.lock().unwrap().clone()
    }

    pub(crate) fn append_sizes(&self) -> Vec<usize> {
        self.appends().iter().map(|(_, block)| block.len()).collect()
    }

    pub(crate) fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub(crate) fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    /// Every delete call, successful or not, in call order.
    pub(crate) fn deletes(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }

    pub(crate) fn contents(&self, name: &str) -> Option<Bytes> {
        self.inner.contents(name)
    }

    pub(crate) fn contents_str(&self, name: &str) -> String {
        let data = self.contents(name).unwrap_or_default();
        String::from_utf8(data.to_vec()).unwrap()
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.inner.names()
    }

    pub(crate) fn insert(&self, name: &str, data: &str) {
        self.inner.insert(name, data);
    }

    /// Removes an object behind the writer's back.
    pub(crate) fn remove(&self, name: &str) {
        let _ = futures::executor::block_on(self.inner.delete(name));
    }

    pub(crate) fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_delete(&self, name: &str) {
        self.failing_deletes.lock().unwrap().insert(name.to_string());
    }

    pub(crate) fn set_append_delay(&self, delay: Duration) {
        *self.append_delay.lock().unwrap() = Some(delay);
    }

    /// Highest number of appends observed running at once.
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AppendStore for RecordingStore {
    async fn create_if_absent(&self, name: &str) -> StorageResult<()> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(StorageError::Storage("injected create failure".into()));
        }
        self.inner.create_if_absent(name).await
    }

    async fn append_block(&self, name: &str, block: Bytes) -> StorageResult<()> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = *self.append_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = if self.fail_appends.load(Ordering::SeqCst) {
            Err(StorageError::Storage("injected append failure".into()))
        } else {
            self.inner.append_block(name, block.clone()).await
        };
        if result.is_ok() {
            self.appends.lock().unwrap().push((name.to_string(), block));
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<String>,
    ) -> StorageResult<ListPage> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(StorageError::Storage("injected list failure".into()));
        }
        self.inner.list_page(prefix, continuation).await
    }

    async fn delete(&self, name: &str) -> StorageResult<()> {
        self.deletes.lock().unwrap().push(name.to_string());
        if self.failing_deletes.lock().unwrap().contains(name) {
            return Err(StorageError::Storage("injected delete failure".into()));
        }
        self.inner.delete(name).await
    }
}
