//! Prometheus metrics for the shipper.

use axum::http::Method;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

/// Labels of one served HTTP request.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub method: HttpMethod,
    pub route: String,
    pub status: u16,
}

/// Request method, collapsed to the verbs the server routes.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Other,
}

impl From<&Method> for HttpMethod {
    fn from(method: &Method) -> Self {
        match *method {
            Method::GET => HttpMethod::Get,
            Method::POST => HttpMethod::Post,
            Method::PUT => HttpMethod::Put,
            Method::DELETE => HttpMethod::Delete,
            _ => HttpMethod::Other,
        }
    }
}

/// Remote operation that failed.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Operation {
    Append,
    Flush,
    Rotate,
    /// Undelivered data dropped to respect the pending block limit.
    Overflow,
    List,
    Delete,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OperationLabels {
    pub operation: Operation,
}

/// Shipper and HTTP counters, registered in one Prometheus registry.
pub struct Metrics {
    registry: Registry,

    /// Counter of records accepted from producers.
    pub records_submitted_total: Counter,

    /// Counter of batches handed to the active writer.
    pub batches_written_total: Counter,

    /// Counter of encoded bytes handed to the active writer.
    pub bytes_appended_total: Counter,

    /// Counter of undelivered bytes dropped at the pending block limit.
    pub bytes_dropped_total: Counter,

    /// Counter of writer flushes that delivered data.
    pub flushes_total: Counter,

    /// Counter of remote failures by operation.
    pub remote_failures_total: Family<OperationLabels, Counter>,

    /// Counter of objects removed by the retention sweep.
    pub objects_deleted_total: Counter,

    /// HTTP requests served, by method, route and status.
    pub http_requests_total: Family<RequestLabels, Counter>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let records_submitted_total = Counter::default();
        registry.register(
            "logship_records_submitted",
            "Total number of log records submitted for shipping",
            records_submitted_total.clone(),
        );

        let batches_written_total = Counter::default();
        registry.register(
            "logship_batches_written",
            "Total number of batches handed to the active writer",
            batches_written_total.clone(),
        );

        let bytes_appended_total = Counter::default();
        registry.register(
            "logship_bytes_appended",
            "Total number of encoded bytes handed to the active writer",
            bytes_appended_total.clone(),
        );

        let bytes_dropped_total = Counter::default();
        registry.register(
            "logship_bytes_dropped",
            "Total number of undelivered bytes dropped while the store was failing",
            bytes_dropped_total.clone(),
        );

        let flushes_total = Counter::default();
        registry.register(
            "logship_flushes",
            "Total number of writer flushes",
            flushes_total.clone(),
        );

        let remote_failures_total = Family::<OperationLabels, Counter>::default();
        registry.register(
            "logship_remote_failures",
            "Total number of failed remote store operations",
            remote_failures_total.clone(),
        );

        let objects_deleted_total = Counter::default();
        registry.register(
            "logship_objects_deleted",
            "Total number of expired objects deleted",
            objects_deleted_total.clone(),
        );

        let http_requests_total = Family::<RequestLabels, Counter>::default();
        registry.register(
            "http_requests",
            "Total number of HTTP requests served",
            http_requests_total.clone(),
        );

        Self {
            registry,
            records_submitted_total,
            batches_written_total,
            bytes_appended_total,
            bytes_dropped_total,
            flushes_total,
            remote_failures_total,
            objects_deleted_total,
            http_requests_total,
        }
    }

    /// Counts one failed remote `operation`.
    pub fn record_failure(&self, operation: Operation) {
        self.remote_failures_total
            .get_or_create(&OperationLabels { operation })
            .inc();
    }

    /// Current failure count for `operation`.
    pub fn failures(&self, operation: Operation) -> u64 {
        self.remote_failures_total
            .get_or_create(&OperationLabels { operation })
            .get()
    }

    /// Renders the registry in the Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if let Err(e) = prometheus_client::encoding::text::encode(&mut buffer, &self.registry) {
            tracing::error!("failed to encode metrics: {}", e);
        }
        buffer
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}
