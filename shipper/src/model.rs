//! Core data types for logship.

use tokio::sync::oneshot;

/// Callback fired once a record has been handed to the writer.
pub type Completion = Box<dyn FnOnce() + Send + 'static>;

/// A single log line waiting to be shipped.
///
/// The line is stored without its terminator; the pipeline appends `\n`.
/// The optional completion fires exactly once, after the batch containing the
/// record was attempted, whether or not the remote write succeeded.
pub struct LogRecord {
    pub line: String,
    completion: Option<Completion>,
}

impl LogRecord {
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            completion: None,
        }
    }

    /// Attaches a callback fired once the record has been written.
    pub fn with_completion(mut self, completion: impl FnOnce() + Send + 'static) -> Self {
        self.completion = Some(Box::new(completion));
        self
    }

    /// Creates a record together with a receiver that resolves when its
    /// completion fires.
    pub fn with_ack(line: impl Into<String>) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let record = LogRecord::new(line).with_completion(move || {
            let _ = tx.send(());
        });
        (record, rx)
    }

    /// Fires the completion, if any.
    pub(crate) fn complete(self) {
        if let Some(completion) = self.completion {
            completion();
        }
    }

    /// Encoded size including the line terminator.
    pub(crate) fn encoded_len(&self) -> usize {
        self.line.len() + 1
    }
}

impl std::fmt::Debug for LogRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogRecord")
            .field("line", &self.line)
            .field("has_completion", &self.completion.is_some())
            .finish()
    }
}

impl From<String> for LogRecord {
    fn from(line: String) -> Self {
        LogRecord::new(line)
    }
}

impl From<&str> for LogRecord {
    fn from(line: &str) -> Self {
        LogRecord::new(line)
    }
}

/// Lifecycle notifications broadcast by a running shipper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShipperEvent {
    /// A batch was handed to the active writer.
    Logged { records: usize, bytes: usize },
    /// The writer for `name` delivered all of its buffered bytes.
    Flushed { name: String },
    /// The shipper finished its final flush and stopped.
    Closed,
}
