//! The batching pipeline.
//!
//! Producers push records through a [`ShipperHandle`] onto an unbounded
//! queue. A single batcher task drains the queue, groups everything queued
//! since its last dispatch into one batch, and writes it through the active
//! [`BufferedAppendWriter`] while holding the writer gate. The idle-flush
//! timer and explicit flushes take the same gate, so at most one remote
//! operation on the active writer is ever in flight.

use std::sync::Arc;
use std::time::Duration;

use common::{AppendStore, Clock, Gate, SystemClock, create_append_store};
use futures::FutureExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::metrics::{Metrics, Operation};
use crate::model::{LogRecord, ShipperEvent};
use crate::name_pattern::NameTemplate;
use crate::retention::RetentionSweep;
use crate::writer::BufferedAppendWriter;

/// Capacity of the lifecycle event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

pub(crate) enum Command {
    Record(LogRecord),
    Flush(oneshot::Sender<Result<()>>),
}

/// Everything guarded by the writer gate.
pub(crate) struct WriterSlot {
    store: Arc<dyn AppendStore>,
    template: NameTemplate,
    clock: Arc<dyn Clock>,
    capacity: usize,
    max_pending_blocks: usize,
    trace: bool,
    active: Option<BufferedAppendWriter>,
    metrics: Arc<Metrics>,
    events: broadcast::Sender<ShipperEvent>,
}

impl WriterSlot {
    /// Writes one batch to the writer for the current time bucket.
    ///
    /// Remote failures are logged and counted. Every record's completion
    /// fires afterwards, in submission order, whatever the outcome.
    async fn write_batch(&mut self, batch: Vec<LogRecord>) {
        let target = self.template.format(&self.clock.now());
        let bound = self.active.as_ref().map(BufferedAppendWriter::name);
        if bound != Some(target.as_str()) {
            self.rotate(target).await;
        }

        let size = batch.iter().map(LogRecord::encoded_len).sum();
        let mut text = String::with_capacity(size);
        for record in &batch {
            text.push_str(&record.line);
            text.push('\n');
        }

        if let Some(writer) = self.active.as_mut() {
            if self.trace {
                debug!(
                    name = writer.name(),
                    records = batch.len(),
                    bytes = size,
                    "writing batch"
                );
            }
            let dropped_before = writer.dropped_bytes();
            if let Err(e) = writer.append(&text).await {
                self.metrics.record_failure(Operation::Append);
                error!(
                    name = writer.name(),
                    pending = writer.pending_bytes(),
                    "appending log batch failed: {}",
                    e
                );
            }
            let dropped = writer.dropped_bytes() - dropped_before;
            if dropped > 0 {
                self.metrics.record_failure(Operation::Overflow);
                self.metrics.bytes_dropped_total.inc_by(dropped);
            }
        }

        self.metrics.batches_written_total.inc();
        self.metrics.bytes_appended_total.inc_by(size as u64);
        let _ = self.events.send(ShipperEvent::Logged {
            records: batch.len(),
            bytes: size,
        });
        for record in batch {
            record.complete();
        }
    }

    /// Retires the active writer and binds a new one to `target`.
    async fn rotate(&mut self, target: String) {
        if let Some(mut previous) = self.active.take() {
            if previous.pending_bytes() > 0 {
                match previous.flush().await {
                    Ok(()) => self.flushed(previous.name()),
                    Err(e) => {
                        // The writer is discarded either way; its bytes are gone.
                        self.metrics.record_failure(Operation::Rotate);
                        error!(
                            name = previous.name(),
                            lost_bytes = previous.pending_bytes(),
                            "flushing log object before rotation failed: {}",
                            e
                        );
                    }
                }
            }
        }
        if self.trace {
            debug!(name = %target, "rotating to new log object");
        }
        self.active = Some(
            BufferedAppendWriter::new(self.store.clone(), target, self.capacity)
                .with_max_backlog(self.max_pending_blocks)
                .with_trace(self.trace),
        );
    }

    /// Flushes the active writer, if it holds anything.
    async fn flush_active(&mut self) -> Result<()> {
        let Some(writer) = self.active.as_mut() else {
            return Ok(());
        };
        if writer.pending_bytes() == 0 {
            return Ok(());
        }
        match writer.flush().await {
            Ok(()) => {
                let name = writer.name().to_string();
                self.flushed(&name);
                Ok(())
            }
            Err(e) => {
                self.metrics.record_failure(Operation::Flush);
                warn!(
                    name = writer.name(),
                    pending = writer.pending_bytes(),
                    "flushing log object failed: {}",
                    e
                );
                Err(e)
            }
        }
    }

    /// Final flush; the writer is released whatever the outcome.
    async fn close(&mut self) -> Result<()> {
        let result = self.flush_active().await;
        if let Some(writer) = self.active.take() {
            if writer.pending_bytes() > 0 {
                error!(
                    name = writer.name(),
                    lost_bytes = writer.pending_bytes(),
                    "dropping unflushed log data at shutdown"
                );
            }
        }
        result
    }

    fn flushed(&self, name: &str) {
        self.metrics.flushes_total.inc();
        let _ = self.events.send(ShipperEvent::Flushed {
            name: name.to_string(),
        });
    }
}

/// Cloneable producer-side handle to a running [`Shipper`].
#[derive(Clone)]
pub struct ShipperHandle {
    tx: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<ShipperEvent>,
    metrics: Arc<Metrics>,
}

impl ShipperHandle {
    pub(crate) fn new(
        tx: mpsc::UnboundedSender<Command>,
        events: broadcast::Sender<ShipperEvent>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            tx,
            events,
            metrics,
        }
    }

    /// Queues `record` for shipping.
    ///
    /// Never waits and never reports remote failures; fails only with
    /// [`Error::Shutdown`] once the shipper is closed.
    pub fn submit(&self, record: LogRecord) -> Result<()> {
        self.tx
            .send(Command::Record(record))
            .map_err(|_| Error::Shutdown)?;
        self.metrics.records_submitted_total.inc();
        Ok(())
    }

    /// Queues a plain line.
    pub fn log(&self, line: impl Into<String>) -> Result<()> {
        self.submit(LogRecord::new(line))
    }

    /// Queues a line and returns a receiver resolved once it has been
    /// handed to the writer.
    pub fn log_with_ack(&self, line: impl Into<String>) -> Result<oneshot::Receiver<()>> {
        let (record, ack) = LogRecord::with_ack(line);
        self.submit(record)?;
        Ok(ack)
    }

    /// Flushes the active writer after every previously queued record has
    /// been written, and returns the outcome of that flush.
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(tx))
            .map_err(|_| Error::Shutdown)?;
        rx.await.map_err(|_| Error::Shutdown)?
    }

    /// Ships every line read from `reader` until it is exhausted and returns
    /// how many were shipped.
    ///
    /// Lines end at `\n`, with a trailing `\r` removed. Blank lines are
    /// shipped as empty records. Bytes that are not valid UTF-8 are replaced
    /// with U+FFFD rather than ending the stream.
    pub async fn forward_lines<R>(&self, mut reader: R) -> Result<usize>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut buf = Vec::new();
        let mut shipped = 0;
        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .await
                .map_err(|e| Error::Internal(format!("reading log input failed: {}", e)))?;
            if read == 0 {
                return Ok(shipped);
            }
            let line = buf.strip_suffix(b"\n").unwrap_or(&buf[..]);
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            self.log(String::from_utf8_lossy(line))?;
            shipped += 1;
        }
    }

    /// Subscribes to lifecycle events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ShipperEvent> {
        self.events.subscribe()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Whether the shipper still accepts records.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

impl std::fmt::Debug for ShipperHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShipperHandle")
            .field("is_open", &self.is_open())
            .finish()
    }
}

/// A running log shipper.
///
/// Owns the batcher task, the idle-flush timer and, when retention is
/// enabled, the retention sweep. Dropping a `Shipper` cancels its tasks
/// without the final flush; call [`close`](Self::close) to deliver what is
/// still buffered.
pub struct Shipper {
    handle: ShipperHandle,
    gate: Arc<Gate<WriterSlot>>,
    events: broadcast::Sender<ShipperEvent>,
    cancel: CancellationToken,
    batcher: Option<JoinHandle<()>>,
    timers: Vec<JoinHandle<()>>,
}

impl Shipper {
    /// Starts a shipper writing to the store described by `config.storage`.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let store = create_append_store(&config.storage)?;
        Self::with_store(config, store, Arc::new(SystemClock))
    }

    /// Starts a shipper over an existing store and clock.
    ///
    /// Spawns the batcher and timer tasks, so it must be called from within a
    /// Tokio runtime.
    pub fn with_store(
        config: Config,
        store: Arc<dyn AppendStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let template = config.template()?;
        let metrics = Arc::new(Metrics::new());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let slot = WriterSlot {
            store: store.clone(),
            template: template.clone(),
            clock: clock.clone(),
            capacity: config.buffer_capacity,
            max_pending_blocks: config.max_pending_blocks,
            trace: config.trace,
            active: None,
            metrics: metrics.clone(),
            events: events.clone(),
        };
        let gate = Arc::new(Gate::new(slot));

        let batcher = tokio::spawn(run_batcher(
            rx,
            gate.clone(),
            cancel.clone(),
            config.max_batch_records,
        ));

        let mut timers = vec![tokio::spawn(run_idle_flush(
            gate.clone(),
            config.flush_interval,
            cancel.clone(),
        ))];

        match RetentionSweep::new(
            store,
            template.clone(),
            config.retention(),
            clock,
            metrics.clone(),
        ) {
            Some(sweep) => {
                info!(
                    prefix = sweep.prefix(),
                    retention_days = sweep.retention_days(),
                    "retention enabled"
                );
                timers.push(tokio::spawn(
                    sweep.with_trace(config.trace).run(cancel.clone()),
                ));
            }
            None => debug!("retention disabled"),
        }

        info!(template = %template, "log shipper started");
        Ok(Self {
            handle: ShipperHandle::new(tx, events.clone(), metrics),
            gate,
            events,
            cancel,
            batcher: Some(batcher),
            timers,
        })
    }

    /// Returns a producer handle.
    pub fn handle(&self) -> ShipperHandle {
        self.handle.clone()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        self.handle.metrics()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShipperEvent> {
        self.handle.subscribe()
    }

    /// Stops the shipper.
    ///
    /// Cancels the timers, stops accepting records, writes everything still
    /// queued, then performs one final flush and emits
    /// [`ShipperEvent::Closed`]. Returns the outcome of the final flush.
    pub async fn close(mut self) -> Result<()> {
        self.cancel.cancel();
        for timer in self.timers.drain(..) {
            if let Err(e) = timer.await {
                warn!("background task failed: {}", e);
            }
        }
        if let Some(batcher) = self.batcher.take() {
            if let Err(e) = batcher.await {
                error!("batcher task failed: {}", e);
            }
        }

        let result = self.gate.run_locked(|slot| slot.close().boxed()).await;
        let _ = self.events.send(ShipperEvent::Closed);
        info!("log shipper closed");
        result
    }
}

impl Drop for Shipper {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_batcher(
    mut rx: mpsc::UnboundedReceiver<Command>,
    gate: Arc<Gate<WriterSlot>>,
    cancel: CancellationToken,
    max_batch: Option<usize>,
) {
    loop {
        let first = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            cmd = rx.recv() => match cmd {
                Some(cmd) => cmd,
                None => break,
            },
        };
        dispatch(first, &mut rx, &gate, max_batch).await;
    }

    // Refuse new records, then write whatever was queued before the close.
    rx.close();
    while let Ok(first) = rx.try_recv() {
        dispatch(first, &mut rx, &gate, max_batch).await;
    }
}

/// Collects one batch starting with `first` and writes it.
///
/// A flush request ends the batch, so it runs after every record queued
/// ahead of it.
async fn dispatch(
    first: Command,
    rx: &mut mpsc::UnboundedReceiver<Command>,
    gate: &Gate<WriterSlot>,
    max_batch: Option<usize>,
) {
    let mut batch = Vec::new();
    let mut flush = None;
    match first {
        Command::Record(record) => batch.push(record),
        Command::Flush(done) => flush = Some(done),
    }
    while flush.is_none() && max_batch.is_none_or(|max| batch.len() < max) {
        match rx.try_recv() {
            Ok(Command::Record(record)) => batch.push(record),
            Ok(Command::Flush(done)) => flush = Some(done),
            Err(_) => break,
        }
    }

    if !batch.is_empty() {
        gate.run_locked(move |slot| slot.write_batch(batch).boxed())
            .await;
    }
    if let Some(done) = flush {
        let result = gate.run_locked(|slot| slot.flush_active().boxed()).await;
        let _ = done.send(result);
    }
}

async fn run_idle_flush(gate: Arc<Gate<WriterSlot>>, period: Duration, cancel: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                // Failures are logged and counted by the slot.
                let _ = gate.run_locked(|slot| slot.flush_active().boxed()).await;
            }
        }
    }
}
