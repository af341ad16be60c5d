//! Configuration for a [`Shipper`](crate::Shipper).

use std::time::Duration;

use common::ObjectStoreConfig;

use crate::error::{Error, Result};
use crate::name_pattern::NameTemplate;

/// Template used when none is configured: one object per hour.
pub const DEFAULT_NAME_TEMPLATE: &str = "{yyyy}/{MM}/{dd}/{hh}/node.log";

/// Idle-flush period used when none is configured.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Writer buffer size, matching the largest block an append blob accepts.
pub const DEFAULT_BUFFER_CAPACITY: usize = 4 * 1024 * 1024;

/// Undelivered full blocks a writer keeps during a store outage; with the
/// default buffer this bounds pending data to 64 MiB plus the buffer.
pub const DEFAULT_MAX_PENDING_BLOCKS: usize = 16;

/// Returns the default template prefixed with a site directory.
pub fn site_template(site: &str) -> String {
    format!("{}/{}", site.trim_end_matches('/'), DEFAULT_NAME_TEMPLATE)
}

/// Shipper configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Remote store the log objects are written to.
    pub storage: ObjectStoreConfig,
    /// Template naming the object for each time bucket.
    pub name_template: String,
    /// Days to keep objects. `None` or `Some(0)` disables retention.
    pub retention_days: Option<u32>,
    /// Period of the idle flush.
    pub flush_interval: Duration,
    /// Size of the writer's memory buffer in bytes.
    pub buffer_capacity: usize,
    /// Full blocks kept for re-sending while the store rejects appends.
    /// Beyond this the oldest are dropped.
    pub max_pending_blocks: usize,
    /// Upper bound on records per batch; `None` takes everything queued.
    pub max_batch_records: Option<usize>,
    /// Emit per-batch and per-block debug events.
    pub trace: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: ObjectStoreConfig::InMemory,
            name_template: DEFAULT_NAME_TEMPLATE.to_string(),
            retention_days: None,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            max_pending_blocks: DEFAULT_MAX_PENDING_BLOCKS,
            max_batch_records: None,
            trace: false,
        }
    }
}

impl Config {
    pub fn with_storage(mut self, storage: ObjectStoreConfig) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_name_template(mut self, template: impl Into<String>) -> Self {
        self.name_template = template.into();
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = Some(days);
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn with_max_pending_blocks(mut self, blocks: usize) -> Self {
        self.max_pending_blocks = blocks;
        self
    }

    pub fn with_max_batch_records(mut self, max: usize) -> Self {
        self.max_batch_records = Some(max);
        self
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Parses the configured name template.
    pub fn template(&self) -> Result<NameTemplate> {
        NameTemplate::new(self.name_template.as_str())
    }

    /// Retention window in days, if retention is enabled.
    pub fn retention(&self) -> Option<u32> {
        self.retention_days.filter(|days| *days > 0)
    }

    /// Checks that a shipper can be started with this configuration.
    pub fn validate(&self) -> Result<()> {
        self.template()?;
        if self.buffer_capacity == 0 {
            return Err(Error::Config("buffer capacity must be positive".into()));
        }
        if self.max_pending_blocks == 0 {
            return Err(Error::Config("max pending blocks must be positive".into()));
        }
        if self.flush_interval.is_zero() {
            return Err(Error::Config("flush interval must be positive".into()));
        }
        if self.max_batch_records == Some(0) {
            return Err(Error::Config("max batch records must be positive".into()));
        }
        Ok(())
    }
}
