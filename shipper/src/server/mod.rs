//! HTTP server for the log shipper.
//!
//! Accepts log lines over HTTP, exposes explicit flushes, Prometheus metrics
//! and a liveness probe.

mod config;
mod error;
pub mod handlers;
mod http;
mod middleware;

pub use config::{CliArgs, ServerConfig};
pub use error::ApiError;
pub use http::LogServer;
