use std::process::ExitCode;

use clap::Parser;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use logship::server::{CliArgs, LogServer, ServerConfig};
use logship::{Shipper, ShipperHandle};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = CliArgs::parse();
    tracing::info!("Starting logship with args: {:?}", args);

    let shipper = match Shipper::open(args.to_config()).await {
        Ok(shipper) => shipper,
        Err(e) => {
            tracing::error!("Failed to start shipper: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.stdin {
        tokio::spawn(forward_stdin(shipper.handle()));
    }

    let server = LogServer::new(shipper, ServerConfig::from(&args));
    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Server failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Ships every line read from standard input until it closes.
async fn forward_stdin(handle: ShipperHandle) {
    match handle.forward_lines(BufReader::new(tokio::io::stdin())).await {
        Ok(lines) => tracing::info!("Standard input closed after {} lines", lines),
        Err(e) => tracing::error!("Stopped shipping standard input: {}", e),
    }
}
