//! fieldlock sync server binary.
//!
//! Runs the HTTP API over a SQLite database. The server stores ciphertext
//! only; it can be hosted anywhere without access to record contents.
//!
//! Usage:
//!   fieldlock-server --port 8471 --db fieldlock.db

use anyhow::{Context, Result};
use clap::Parser;
use fieldlock_server::{build_router, ServerStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "fieldlock-server")]
#[command(about = "fieldlock encrypted field sync server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8471")]
    port: u16,

    /// Path to the SQLite database file
    #[arg(short, long, default_value = "fieldlock-server.db")]
    db: PathBuf,

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

    let store = ServerStore::open(&args.db)
        .with_context(|| format!("failed to open store at {}", args.db.display()))?;
    info!("store opened at {}", args.db.display());

    let app = build_router(Arc::new(store));
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port))
        .await
        .with_context(|| format!("failed to bind port {}", args.port))?;
    info!("listening on 0.0.0.0:{}", args.port);

    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}
