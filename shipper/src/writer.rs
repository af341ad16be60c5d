//! Buffered writer over a single remote append-only object.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use common::AppendStore;
use tracing::{debug, error, warn};

use crate::error::Result;

/// Accumulates encoded log text in a fixed-size buffer and ships it to one
/// remote object in full-capacity blocks.
///
/// Small writes are copied into the buffer without touching the network.
/// A write that would fill the buffer tops it off, sends it as one block,
/// sends any further full-capacity slices straight from the input, and keeps
/// the remainder. After `N` bytes have been written with capacity `C`,
/// exactly `N / C` full blocks have been handed to the store and `N % C`
/// bytes sit in the buffer until [`flush`](Self::flush).
///
/// Blocks the store fails to accept are kept, in order, and re-sent before
/// anything newer on the next `append` or `flush`. The writer never retries
/// on its own. At most [`max_backlog`](Self::with_max_backlog) such blocks
/// are kept; past that the oldest are dropped and counted in
/// [`dropped_bytes`](Self::dropped_bytes).
///
/// The writer is not synchronized; callers must serialize access.
pub struct BufferedAppendWriter {
    store: Arc<dyn AppendStore>,
    name: String,
    capacity: usize,
    buffer: BytesMut,
    /// Full blocks not yet accepted by the store, oldest first.
    backlog: VecDeque<Bytes>,
    max_backlog: usize,
    dropped_bytes: u64,
    is_open: bool,
    total_written: u64,
    trace: bool,
}

impl BufferedAppendWriter {
    pub fn new(store: Arc<dyn AppendStore>, name: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            store,
            name: name.into(),
            capacity,
            buffer: BytesMut::with_capacity(capacity),
            backlog: VecDeque::new(),
            max_backlog: usize::MAX,
            dropped_bytes: 0,
            is_open: false,
            total_written: 0,
            trace: false,
        }
    }

    /// Emits a debug event for every block sent.
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Limits the number of undelivered full blocks kept for re-sending.
    pub fn with_max_backlog(mut self, blocks: usize) -> Self {
        self.max_backlog = blocks.max(1);
        self
    }

    /// Name of the remote object this writer appends to.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently held in the buffer.
    pub fn used(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes accepted by `append` but not yet delivered.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len() + self.backlog.iter().map(Bytes::len).sum::<usize>()
    }

    /// Bytes the store has accepted from this writer.
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Bytes discarded because the backlog limit was exceeded.
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped_bytes
    }

    /// Whether the remote object has been created.
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Appends `text`, sending every block that became full.
    ///
    /// The first call creates the remote object if it does not exist. On
    /// error the text is still held by the writer and will be delivered by a
    /// later `append` or `flush`.
    pub async fn append(&mut self, text: &str) -> Result<()> {
        self.stage(text.as_bytes());
        self.ensure_open().await?;
        self.drain_backlog().await
    }

    /// Sends everything held by the writer.
    ///
    /// A partial buffer goes out as one block of exactly its size. Does
    /// nothing when the writer holds no bytes.
    pub async fn flush(&mut self) -> Result<()> {
        if self.pending_bytes() == 0 {
            return Ok(());
        }
        self.ensure_open().await?;
        self.drain_backlog().await?;
        if !self.buffer.is_empty() {
            let block = Bytes::copy_from_slice(&self.buffer);
            self.send(block).await?;
            self.buffer.clear();
        }
        Ok(())
    }

    fn stage(&mut self, mut input: &[u8]) {
        let free = self.capacity - self.buffer.len();
        if input.len() < free {
            self.buffer.extend_from_slice(input);
            return;
        }

        if !self.buffer.is_empty() {
            self.buffer.extend_from_slice(&input[..free]);
            input = &input[free..];
            self.backlog
                .push_back(Bytes::copy_from_slice(&self.buffer));
            self.buffer.clear();
        }
        while input.len() >= self.capacity {
            let (block, rest) = input.split_at(self.capacity);
            self.backlog.push_back(Bytes::copy_from_slice(block));
            input = rest;
        }
        self.buffer.extend_from_slice(input);
        self.trim_backlog();
    }

    fn trim_backlog(&mut self) {
        let excess = self.backlog.len().saturating_sub(self.max_backlog);
        if excess == 0 {
            return;
        }
        let lost: usize = self.backlog.drain(..excess).map(|block| block.len()).sum();
        self.dropped_bytes += lost as u64;
        error!(
            name = %self.name,
            lost_bytes = lost,
            dropped_blocks = excess,
            max_backlog = self.max_backlog,
            "undelivered block limit reached, dropping oldest log data"
        );
    }

    async fn ensure_open(&mut self) -> Result<()> {
        if !self.is_open {
            self.store.create_if_absent(&self.name).await?;
            self.is_open = true;
            if self.trace {
                debug!(name = %self.name, "opened remote object");
            }
        }
        Ok(())
    }

    async fn drain_backlog(&mut self) -> Result<()> {
        while let Some(block) = self.backlog.front().cloned() {
            self.send(block).await?;
            self.backlog.pop_front();
        }
        Ok(())
    }

    async fn send(&mut self, block: Bytes) -> Result<()> {
        let len = block.len();
        match self.store.append_block(&self.name, block.clone()).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                warn!(name = %self.name, "remote object disappeared, recreating it");
                self.store.create_if_absent(&self.name).await?;
                self.store.append_block(&self.name, block).await?;
            }
            Err(err) => return Err(err.into()),
        }
        self.total_written += len as u64;
        if self.trace {
            debug!(name = %self.name, bytes = len, "appended block");
        }
        Ok(())
    }
}

impl std::fmt::Debug for BufferedAppendWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedAppendWriter")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("used", &self.buffer.len())
            .field("backlog_blocks", &self.backlog.len())
            .field("dropped_bytes", &self.dropped_bytes)
            .field("is_open", &self.is_open)
            .field("total_written", &self.total_written)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::test_utils::RecordingStore;

    fn writer(store: &Arc<RecordingStore>, capacity: usize) -> BufferedAppendWriter {
        BufferedAppendWriter::new(store.clone(), "app/node.log", capacity)
    }

    #[tokio::test]
    async fn should_buffer_small_appends_without_network_calls() {
        // given
        let store = Arc::new(RecordingStore::new());
        let mut writer = writer(&store, 16);

        // when
        writer.append("hello\n").await.unwrap();
        writer.append("world\n").await.unwrap();

        // then
        assert!(store.appends().is_empty());
        assert_eq!(store.creates(), 1);
        assert_eq!(writer.used(), 12);
        assert!(writer.is_open());
    }

    #[tokio::test]
    async fn should_send_buffer_when_input_exactly_fills_it() {
        // given
        let store = Arc::new(RecordingStore::new());
        let mut writer = writer(&store, 8);
        writer.append("abc").await.unwrap();

        // when
        writer.append("defgh").await.unwrap();

        // then
        assert_eq!(store.append_sizes(), vec![8]);
        assert_eq!(writer.used(), 0);
        assert_eq!(store.contents_str("app/node.log"), "abcdefgh");
    }

    #[tokio::test]
    async fn should_split_large_input_into_full_blocks() {
        // given
        let store = Arc::new(RecordingStore::new());
        let mut writer = writer(&store, 4);
        writer.append("ab").await.unwrap();

        // when
        writer.append("cdefghijk").await.unwrap();

        // then
        assert_eq!(store.append_sizes(), vec![4, 4]);
        assert_eq!(writer.used(), 3);
        assert_eq!(store.contents_str("app/node.log"), "abcdefgh");
        assert_eq!(writer.total_written(), 8);
    }

    #[tokio::test]
    async fn should_keep_block_count_invariant() {
        // given
        let store = Arc::new(RecordingStore::new());
        let capacity = 7;
        let mut writer = writer(&store, capacity);
        let inputs = ["a", "bcdefghijklmno", "pq", "rstuvw", "x", "yz0123456789"];

        // when
        let mut total = 0;
        for input in inputs {
            writer.append(input).await.unwrap();
            total += input.len();
        }

        // then
        assert_eq!(store.appends().len(), total / capacity);
        assert!(store.append_sizes().iter().all(|size| *size == capacity));
        assert_eq!(writer.used(), total % capacity);
    }

    #[tokio::test]
    async fn should_flush_partial_buffer_as_one_block() {
        // given
        let store = Arc::new(RecordingStore::new());
        let mut writer = writer(&store, 64);
        writer.append("one\ntwo\n").await.unwrap();

        // when
        writer.flush().await.unwrap();
        writer.flush().await.unwrap();

        // then
        assert_eq!(store.append_sizes(), vec![8]);
        assert_eq!(writer.used(), 0);
        assert_eq!(store.contents_str("app/node.log"), "one\ntwo\n");
    }

    #[tokio::test]
    async fn should_not_touch_store_when_flushing_empty_writer() {
        // given
        let store = Arc::new(RecordingStore::new());
        let mut writer = writer(&store, 64);

        // when
        writer.flush().await.unwrap();

        // then
        assert_eq!(store.creates(), 0);
        assert!(store.appends().is_empty());
        assert!(!writer.is_open());
    }

    #[tokio::test]
    async fn should_keep_undelivered_bytes_after_failed_append() {
        // given
        let store = Arc::new(RecordingStore::new());
        let mut writer = writer(&store, 4);
        store.set_fail_appends(true);

        // when
        let result = writer.append("abcdef").await;
        store.set_fail_appends(false);
        writer.append("gh").await.unwrap();

        // then
        assert!(matches!(result, Err(Error::Storage(_))));
        assert_eq!(store.append_sizes(), vec![4, 4]);
        assert_eq!(store.contents_str("app/node.log"), "abcdefgh");
        assert_eq!(writer.pending_bytes(), 0);
    }

    #[tokio::test]
    async fn should_deliver_old_and_new_bytes_in_order_after_failed_flush() {
        // given
        let store = Arc::new(RecordingStore::new());
        let mut writer = writer(&store, 64);
        writer.append("first\n").await.unwrap();
        store.set_fail_appends(true);
        assert!(writer.flush().await.is_err());
        store.set_fail_appends(false);

        // when
        writer.append("second\n").await.unwrap();
        writer.flush().await.unwrap();

        // then
        assert_eq!(store.contents_str("app/node.log"), "first\nsecond\n");
    }

    #[tokio::test]
    async fn should_retry_open_after_failed_create() {
        // given
        let store = Arc::new(RecordingStore::new());
        let mut writer = writer(&store, 64);
        store.set_fail_creates(true);

        // when
        let first = writer.append("kept\n").await;
        store.set_fail_creates(false);
        writer.flush().await.unwrap();

        // then
        assert!(first.is_err());
        assert_eq!(store.creates(), 2);
        assert_eq!(store.contents_str("app/node.log"), "kept\n");
    }

    #[tokio::test]
    async fn should_recreate_object_deleted_underneath() {
        // given
        let store = Arc::new(RecordingStore::new());
        let mut writer = writer(&store, 64);
        writer.append("before\n").await.unwrap();
        writer.flush().await.unwrap();
        store.remove("app/node.log");

        // when
        writer.append("after\n").await.unwrap();
        writer.flush().await.unwrap();

        // then
        assert_eq!(store.creates(), 2);
        assert_eq!(store.contents_str("app/node.log"), "after\n");
        assert_eq!(writer.total_written(), 13);
    }

    #[tokio::test]
    async fn should_count_utf8_bytes_not_characters() {
        // given
        let store = Arc::new(RecordingStore::new());
        let mut writer = writer(&store, 4);

        // when
        writer.append("héé").await.unwrap();

        // then
        assert_eq!(store.append_sizes(), vec![4]);
        assert_eq!(writer.used(), 1);
    }

    #[tokio::test]
    async fn should_drop_oldest_blocks_past_backlog_limit() {
        // given
        let store = Arc::new(RecordingStore::new());
        let mut writer = writer(&store, 4).with_max_backlog(2);
        store.set_fail_appends(true);

        // when
        for _ in 0..1000 {
            assert!(writer.append("abcdefgh").await.is_err());
        }
        writer.append("wxyz").await.unwrap_err();
        store.set_fail_appends(false);
        writer.flush().await.unwrap();

        // then
        assert_eq!(writer.pending_bytes(), 0);
        assert_eq!(writer.dropped_bytes(), 1000 * 8 + 4 - 8);
        assert_eq!(store.contents_str("app/node.log"), "efghwxyz");
    }

    #[tokio::test]
    async fn should_keep_backlog_bounded_while_store_fails() {
        // given
        let store = Arc::new(RecordingStore::new());
        let mut writer = writer(&store, 4).with_max_backlog(3);
        store.set_fail_appends(true);

        // when
        for _ in 0..100 {
            let _ = writer.append("abcdefgh").await;
        }

        // then
        assert_eq!(writer.pending_bytes(), 3 * 4);
        assert_eq!(writer.dropped_bytes(), 100 * 8 - 3 * 4);
        assert!(store.appends().is_empty());
    }
}
