//! deces-ingest - INSEE death record import service
//!
//! Downloads the monthly/yearly death extracts published by INSEE, loads
//! every row into the `deces` table and keeps rejected rows for operator
//! repair. Default port: 5730.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use deces_common::config::{load_toml_config, RootFolderInitializer, RootFolderResolver};
use deces_common::events::EventBus;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use deces_ingest::config::resolve_ingest_config;
use deces_ingest::db::runs::fail_stale_runs;
use deces_ingest::AppState;

/// Command-line arguments for deces-ingest
#[derive(Parser, Debug)]
#[command(name = "deces-ingest")]
#[command(about = "INSEE death record import service")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5730", env = "DECES_PORT")]
    port: u16,

    /// Address to bind
    #[arg(short, long, default_value = "127.0.0.1", env = "DECES_BIND")]
    bind: IpAddr,

    /// Folder holding the database and the temporary download area
    #[arg(short, long, env = "DECES_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let toml_config = load_toml_config().unwrap_or_default();

    // A bare level applies to our crates; a full directive is used as is
    let level = toml_config.logging.level.trim();
    let default_filter = if level.contains('=') || level.contains(',') {
        level.to_string()
    } else {
        format!("deces_ingest={0},deces_common={0},tower_http={0}", level)
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!(
        "Starting deces-ingest v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    // CLI > ENV (both handled by clap) > TOML > platform default
    let root_folder = RootFolderResolver::new("deces-ingest")
        .with_cli_arg(args.root_folder.clone())
        .resolve();

    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());

    let db_pool = deces_ingest::db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;

    let config = resolve_ingest_config(&db_pool, &toml_config)
        .await
        .context("Failed to resolve ingest configuration")?;

    if let Some(timeout) = config.stale_run_timeout() {
        let failed = fail_stale_runs(&db_pool, timeout)
            .await
            .context("Failed to sweep stale import runs")?;
        if !failed.is_empty() {
            warn!(runs = ?failed, "Marked stale import runs as failed");
        }
    }

    let event_bus = EventBus::new(100);

    let state = AppState::new(db_pool, event_bus, config, initializer.work_dir())
        .context("Failed to build application state")?;
    let app = deces_ingest::build_router(state);

    let addr = SocketAddr::new(args.bind, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
