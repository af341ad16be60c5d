//! Deletion of log objects older than the retention window.
//!
//! Once at startup and then at every local midnight, the sweep lists the
//! objects under the template's literal prefix, recovers each one's bucket
//! start from its name and deletes those whose bucket start plus the
//! retention window lies in the past.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta, TimeZone};
use common::{AppendStore, Clock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::metrics::{Metrics, Operation};
use crate::name_pattern::NameTemplate;

/// Outcome of a single sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Names returned by the listing.
    pub listed: usize,
    /// Names found past the retention window.
    pub expired: usize,
    /// Expired objects removed, including ones that were already gone.
    pub deleted: usize,
    /// Expired objects whose deletion failed.
    pub failed: usize,
}

/// Periodic removal of expired log objects.
pub struct RetentionSweep {
    store: Arc<dyn AppendStore>,
    template: NameTemplate,
    days: u32,
    window: TimeDelta,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
    trace: bool,
}

impl RetentionSweep {
    /// Returns `None` when retention is disabled: no window, a zero window,
    /// or a template that starts with a field, which would leave the sweep
    /// listing the entire store.
    pub fn new(
        store: Arc<dyn AppendStore>,
        template: NameTemplate,
        retention_days: Option<u32>,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
    ) -> Option<Self> {
        let days = retention_days.filter(|days| *days > 0)?;
        if template.literal_prefix().is_empty() {
            warn!(
                template = %template,
                "name template has no literal prefix, retention is disabled"
            );
            return None;
        }
        let window = TimeDelta::try_days(i64::from(days))?;
        Some(Self {
            store,
            template,
            days,
            window,
            clock,
            metrics,
            trace: false,
        })
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Prefix every listing is restricted to.
    pub fn prefix(&self) -> &str {
        self.template.literal_prefix()
    }

    pub fn retention_days(&self) -> u32 {
        self.days
    }

    /// Runs one listing and deletion pass.
    ///
    /// A listing failure aborts the pass before anything is deleted. A
    /// failed delete is logged and counted, and the pass moves on. The
    /// object for the current bucket is never deleted.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let current = self.template.format(&now);
        let prefix = self.prefix();
        let mut report = SweepReport::default();
        let mut expired = Vec::new();
        let mut continuation = None;

        loop {
            let page = match self.store.list_page(prefix, continuation.take()).await {
                Ok(page) => page,
                Err(e) => {
                    error!(prefix, "listing log objects failed: {}", e);
                    self.metrics.record_failure(Operation::List);
                    return Err(e.into());
                }
            };
            report.listed += page.names.len();

            for name in page.names {
                if name == current {
                    continue;
                }
                let Some(bucket_start) = self.template.parse(&name) else {
                    if self.trace {
                        debug!(name = %name, template = %self.template, "name does not match template");
                    }
                    continue;
                };
                let is_expired = bucket_start
                    .checked_add_signed(self.window)
                    .is_some_and(|expires| expires < now);
                if is_expired {
                    if self.trace {
                        debug!(name = %name, %bucket_start, "object is past retention");
                    }
                    expired.push(name);
                }
            }

            match page.continuation {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        report.expired = expired.len();
        for name in expired {
            match self.store.delete(&name).await {
                Ok(()) => {
                    report.deleted += 1;
                    self.metrics.objects_deleted_total.inc();
                    if self.trace {
                        debug!(name = %name, "deleted expired object");
                    }
                }
                Err(e) if e.is_not_found() => report.deleted += 1,
                Err(e) => {
                    report.failed += 1;
                    self.metrics.record_failure(Operation::Delete);
                    warn!(name = %name, "deleting expired object failed: {}", e);
                }
            }
        }

        info!(
            prefix,
            retention_days = self.days,
            listed = report.listed,
            deleted = report.deleted,
            failed = report.failed,
            "retention sweep finished"
        );
        Ok(report)
    }

    /// Sweeps now, then after every local midnight, until `cancel` fires.
    ///
    /// The next run is scheduled from the time the previous one started,
    /// whether or not it succeeded. A timer that fires while the wall clock
    /// is still short of that midnight sleeps again instead of sweeping.
    pub async fn run(self, cancel: CancellationToken) {
        let mut due: Option<DateTime<Local>> = None;
        loop {
            let now = self.clock.now();
            let wait = match due.filter(|due| now < *due) {
                Some(due) => {
                    if self.trace {
                        debug!(%due, %now, "retention timer fired early, waiting again");
                    }
                    (due - now).to_std().unwrap_or(Duration::ZERO)
                }
                None => {
                    // Failures are logged and counted by the sweep itself.
                    let _ = self.sweep().await;
                    let next = next_midnight(&now);
                    if self.trace {
                        debug!(%next, "next retention sweep scheduled");
                    }
                    due = Some(next);
                    (next - self.clock.now()).to_std().unwrap_or(Duration::ZERO)
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

/// The first midnight strictly after `from`, in `from`'s time zone.
///
/// Falls back to exactly one day later when that midnight does not exist
/// locally.
pub fn next_midnight<Tz: TimeZone>(from: &DateTime<Tz>) -> DateTime<Tz> {
    from.date_naive()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .and_then(|midnight| from.timezone().from_local_datetime(&midnight).earliest())
        .unwrap_or_else(|| from.clone() + TimeDelta::days(1))
}
