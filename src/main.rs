//! Fedra platform server - main entry point.
//!
//! Starts the access server exposing the three platform services:
//! - jobs: submit, inspect, list, abort
//! - events: publish, subscribe (streaming)
//! - directory: read-only registration listing

use clap::Parser;
use fedra_core::access::AccessServer;
use fedra_core::{Config, Platform};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "fedra-server", about = "Federation platform core server")]
struct Args {
    /// Bind address for the access server (overrides config).
    #[arg(long, env = "FEDRA_LISTEN")]
    listen: Option<SocketAddr>,

    /// Path to a JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Worker pool size (overrides config).
    #[arg(long)]
    pool_size: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize observability
    fedra_core::observability::init_tracing();

    let args = Args::parse();

    // Load configuration
    let mut config: Config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str(&raw)?
        }
        None => Config::default(),
    };
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen.to_string();
    }
    if let Some(pool_size) = args.pool_size {
        config.executor.pool_size = pool_size;
    }

    let addr: SocketAddr = config.server.listen_addr.parse()?;

    // Wire up the platform with the built-in job factories
    let platform = Arc::new(Platform::new(config.clone()));
    platform.install_builtins().await?;

    tracing::info!("🚀 Fedra platform server starting on {}", addr);
    tracing::info!("  ✓ jobs: submit, inspect, list, abort");
    tracing::info!("  ✓ events: publish, subscribe");
    tracing::info!("  ✓ directory: registration listing");

    let server = Arc::new(AccessServer::new(
        platform.clone(),
        addr,
        config.access.clone(),
    ));
    let server_task = tokio::spawn({
        let server = server.clone();
        async move { server.serve().await }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    server.shutdown();
    let _ = server_task.await;
    platform.shutdown().await?;

    Ok(())
}
