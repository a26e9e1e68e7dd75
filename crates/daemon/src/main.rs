//! notemerge daemon entry point.
//!
//! Loads configuration, opens the database, serves the HTTP API, and shuts
//! down gracefully on SIGINT/SIGTERM.

mod signals;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use notemerge_core::config::AppConfig;
use notemerge_core::db::Database;
use notemerge_web::WebServer;

/// How long in-flight requests get after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// notemerge service daemon.
#[derive(Parser, Debug)]
#[command(
    name = "notemerge-daemon",
    version,
    about = "Fork, pull request and merge service for notes"
)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Override the log level from the config file (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = AppConfig::load_and_resolve(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config.display()))?;

    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.daemon.log_level.clone());
    let _log_guard = init_tracing(&log_level, &config)?;

    info!("========================================");
    info!("  notemerge daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("========================================");
    info!("Config file   : {}", args.config.display());
    info!("Web listen    : {}", config.web.listen);
    info!("Data dir      : {}", config.daemon.data_dir.display());
    info!("Auth          : {}", if config.web.auth_enabled() { "password" } else { "X-User-Id header" });
    info!("Log level     : {}", log_level);
    info!("========================================");

    std::fs::create_dir_all(&config.daemon.data_dir).with_context(|| {
        format!(
            "failed to create data directory {}",
            config.daemon.data_dir.display()
        )
    })?;

    let db_path = config.daemon.database_path();
    let db = Database::new(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    db.initialize()
        .context("failed to initialize database schema")?;
    info!("Database initialized at {}", db_path.display());

    let listen_addr = config.web.listen.clone();
    let web_server = WebServer::new(config, Arc::new(db));

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let mut web_handle = tokio::spawn(async move {
        let shutdown = async {
            let _ = stop_rx.await;
        };
        if let Err(e) = web_server.start(&listen_addr, shutdown).await {
            error!("web server error: {:#}", e);
        }
    });

    tokio::select! {
        _ = signals::wait_for_shutdown() => {}
        result = &mut web_handle => {
            if let Err(e) = result {
                warn!("web server task error: {}", e);
            }
            anyhow::bail!("web server exited unexpectedly");
        }
    }

    info!("shutdown signal received, stopping...");
    let _ = stop_tx.send(());
    match tokio::time::timeout(SHUTDOWN_GRACE, &mut web_handle).await {
        Ok(Ok(())) => info!("web server stopped gracefully"),
        Ok(Err(e)) => warn!("web server task error: {}", e),
        Err(_) => {
            warn!("web server did not stop within {:?}, aborting", SHUTDOWN_GRACE);
            web_handle.abort();
        }
    }

    info!("notemerge daemon stopped.");
    Ok(())
}

/// Install the global subscriber. When `daemon.log_dir` is set, output also
/// goes to a daily rolling file; the returned guard flushes it on drop.
fn init_tracing(log_level: &str, config: &AppConfig) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(true).with_thread_ids(false);

    match &config.daemon.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "notemerge-daemon.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .init();
            Ok(None)
        }
    }
}
