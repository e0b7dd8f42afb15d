//! RedKV server entry point.
//!
//! Parses the command line, loads the snapshot, then serves clients until
//! Ctrl+C.

use anyhow::Context;
use redkv::commands::CommandHandler;
use redkv::config::{CliAction, ServerConfig};
use redkv::connection::ConnectionStats;
use redkv::server::{accept_loop, bind_listener};
use redkv::snapshot::{load_snapshot, LoadOutcome};
use redkv::storage::{start_expiry_sweeper, StorageEngine};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn print_help() {
    println!(
        r#"
RedKV - A small RESP key-value server

USAGE:
    redkv [OPTIONS]

OPTIONS:
        --dir <DIR>              Directory holding the snapshot (default: .)
        --dbfilename <FILE>      Snapshot file name (default: dump.rdb)
    -h, --host <HOST>            Host to bind to (default: 0.0.0.0)
    -p, --port <PORT>            Port to listen on (default: 6379)
    -v, --version                Print version information
        --help                   Print this help message

EXAMPLES:
    redkv                                    # Start on 0.0.0.0:6379
    redkv --dir /var/lib/redis --dbfilename dump.rdb
    redkv --port 6380

Log verbosity follows RUST_LOG (default: info).
"#
    );
}

fn log_snapshot_outcome(config: &ServerConfig, outcome: &LoadOutcome) {
    match outcome {
        LoadOutcome::Loaded(report) => info!(
            dir = %config.dir,
            dbfilename = %config.dbfilename,
            loaded = report.loaded,
            skipped_expired = report.skipped_expired,
            "Snapshot loaded"
        ),
        LoadOutcome::NotFound => info!(
            dir = %config.dir,
            dbfilename = %config.dbfilename,
            "No snapshot found, starting with an empty store"
        ),
        LoadOutcome::Corrupt { report, error } => warn!(
            dir = %config.dir,
            dbfilename = %config.dbfilename,
            loaded = report.loaded,
            skipped_expired = report.skipped_expired,
            error = %error,
            "Snapshot is corrupt, keeping the entries read before the error"
        ),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match ServerConfig::parse_args(std::env::args().skip(1)) {
        Ok(CliAction::Run(config)) => config,
        Ok(CliAction::Help) => {
            print_help();
            return Ok(());
        }
        Ok(CliAction::Version) => {
            println!("RedKV version {}", redkv::VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!(version = redkv::VERSION, "Starting RedKV");

    let storage = Arc::new(StorageEngine::new());
    let outcome = load_snapshot(&config.dir, &config.dbfilename, &storage);
    log_snapshot_outcome(&config, &outcome);

    let _sweeper = start_expiry_sweeper(Arc::clone(&storage));

    let addr = config.socket_addr()?;
    let listener = bind_listener(addr)
        .with_context(|| format!("failed to bind to {}", addr))?;
    info!(address = %addr, "Ready to accept connections");

    let stats = Arc::new(ConnectionStats::new());
    let handler = CommandHandler::new(storage, Arc::new(config));

    let shutdown = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received, stopping server..."),
            Err(e) => {
                error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = accept_loop(listener, handler, Arc::clone(&stats)) => {}
        _ = shutdown => {}
    }

    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        protocol_errors = stats.protocol_errors.load(Ordering::Relaxed),
        bytes_read = stats.bytes_read.load(Ordering::Relaxed),
        bytes_written = stats.bytes_written.load(Ordering::Relaxed),
        "Server shutdown complete"
    );
    Ok(())
}
