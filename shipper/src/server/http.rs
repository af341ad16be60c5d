//! HTTP server wiring.

use std::net::SocketAddr;

use axum::Router;
use axum::routing::{get, post};
use tokio::signal;

use super::config::ServerConfig;
use super::handlers::{
    AppState, handle_flush, handle_healthy, handle_lines, handle_metrics, handle_ready,
};
use super::middleware::ObserveLayer;
use crate::error::{Error, Result};
use crate::pipeline::Shipper;

/// HTTP front end of a [`Shipper`].
pub struct LogServer {
    shipper: Shipper,
    config: ServerConfig,
}

impl LogServer {
    pub fn new(shipper: Shipper, config: ServerConfig) -> Self {
        Self { shipper, config }
    }

    /// Serves until SIGINT or SIGTERM, then closes the shipper, flushing
    /// everything still buffered.
    pub async fn run(self) -> Result<()> {
        let app = router(AppState {
            shipper: self.shipper.handle(),
            metrics: self.shipper.metrics().clone(),
        });

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        tracing::info!("Starting log shipper server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Internal(format!("failed to bind {}: {}", addr, e)))?;
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(format!("server error: {}", e)));

        tracing::info!("Flushing buffered log data before shutdown...");
        if let Err(e) = self.shipper.close().await {
            tracing::error!("Failed to flush log data on shutdown: {}", e);
        }
        tracing::info!("Server shut down gracefully");
        served
    }
}

/// Builds the router over `state`.
pub(crate) fn router(state: AppState) -> Router {
    let metrics = state.metrics.clone();
    Router::new()
        .route("/api/v1/lines", post(handle_lines))
        .route("/api/v1/flush", post(handle_flush))
        .route("/metrics", get(handle_metrics))
        .route("/-/healthy", get(handle_healthy))
        .route("/-/ready", get(handle_ready))
        .layer(ObserveLayer::new(metrics))
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
