//! `tracing` integration: ship an application's events as log lines.

use std::fmt::{self, Write as _};

use chrono::{Local, SecondsFormat};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::pipeline::ShipperHandle;

/// Targets whose events are never shipped, so the shipper's own diagnostics
/// and those of the storage stack below it cannot feed back into the stream.
const IGNORED_TARGETS: &[&str] = &[
    "logship", "common", "object_store", "hyper", "hyper_util", "reqwest", "h2", "rustls",
];

/// A [`Layer`] that renders every event to one line and submits it to a
/// shipper.
///
/// Lines look like
/// `2024-05-14T09:15:00.123+02:00 INFO app::db: connected pool=4`.
///
/// ```no_run
/// use tracing_subscriber::prelude::*;
///
/// # async fn run() -> logship::Result<()> {
/// let shipper = logship::Shipper::open(logship::Config::default()).await?;
/// tracing_subscriber::registry()
///     .with(logship::ShipperLayer::new(shipper.handle()))
///     .init();
/// # Ok(())
/// # }
/// ```
pub struct ShipperLayer {
    handle: ShipperHandle,
    ignored: Vec<String>,
}

impl ShipperLayer {
    pub fn new(handle: ShipperHandle) -> Self {
        Self {
            handle,
            ignored: IGNORED_TARGETS.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Also drops events from `target` and its submodules.
    pub fn with_ignored_target(mut self, target: impl Into<String>) -> Self {
        self.ignored.push(target.into());
        self
    }

    fn is_ignored(&self, target: &str) -> bool {
        self.ignored.iter().any(|ignored| {
            target
                .strip_prefix(ignored.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
        })
    }
}

impl<S: Subscriber> Layer<S> for ShipperLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if self.is_ignored(metadata.target()) {
            return;
        }

        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        let mut line = format!(
            "{} {} {}: {}",
            Local::now().to_rfc3339_opts(SecondsFormat::Millis, false),
            metadata.level(),
            metadata.target(),
            visitor.message
        );
        line.push_str(&visitor.fields);

        // After shutdown there is nowhere left to send the line.
        let _ = self.handle.log(line);
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}
