//! DecentriLicense rendezvous registry.
//!
//! Runs on a reachable server so clients in WAN mode can find the device
//! currently holding a license before they contend for it.
//!
//! Usage:
//!   decentri-registry --port 3883
//!
//! State lives in memory only and is rebuilt from client registrations.

use std::{net::SocketAddr, sync::Arc, time::Duration};
use anyhow::{Context, Result};
use clap::Parser;
use decentri_registry::{build_router, run_cleanup, Registry};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "decentri-registry")]
#[command(about = "DecentriLicense rendezvous registry")]
struct Args {
    /// HTTP port to listen on
    #[arg(short, long, default_value = "3883")]
    port: u16,

    /// Seconds between sweeps for inactive devices
    #[arg(long, default_value = "60")]
    cleanup_interval_secs: u64,

    /// Devices unseen for this many seconds are forgotten
    #[arg(long, default_value = "300")]
    inactive_after_secs: i64,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("DecentriLicense registry starting...");
    let registry = Arc::new(Registry::new());

    tokio::spawn(run_cleanup(
        registry.clone(),
        Duration::from_secs(args.cleanup_interval_secs.max(1)),
        chrono::Duration::seconds(args.inactive_after_secs),
    ));

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {addr}"))?;
    info!("Registry listening on http://{}", addr);

    axum::serve(listener, build_router(registry))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down...");
        })
        .await
        .context("HTTP server error")?;

    Ok(())
}
