//! Ship log lines to append-only object storage.
//!
//! Records submitted through a [`ShipperHandle`] are batched, buffered and
//! appended to objects whose names are derived from the wall clock by a
//! [`NameTemplate`]. A new object is started whenever the formatted name
//! changes, idle buffers are flushed on a fixed interval, and an optional
//! [`RetentionSweep`] deletes objects older than the configured number of
//! days.

mod config;
mod error;
mod layer;
mod metrics;
mod model;
mod name_pattern;
mod pipeline;
mod retention;
pub mod server;
#[cfg(test)]
mod test_utils;
mod writer;

pub use config::{
    Config, DEFAULT_BUFFER_CAPACITY, DEFAULT_FLUSH_INTERVAL, DEFAULT_MAX_PENDING_BLOCKS,
    DEFAULT_NAME_TEMPLATE, site_template,
};
pub use error::{Error, Result};
pub use layer::ShipperLayer;
pub use metrics::{Metrics, Operation};
pub use model::{LogRecord, ShipperEvent};
pub use name_pattern::NameTemplate;
pub use pipeline::{Shipper, ShipperHandle};
pub use retention::{RetentionSweep, SweepReport, next_midnight};
pub use writer::BufferedAppendWriter;
