//! Waypoint Sweeper Daemon
//!
//! Periodically moves pending trip invitations past their deadline into
//! `expired`. Reads are already expiry-aware; the sweep keeps stored state
//! and listings honest without waiting for someone to touch each record.

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use waypoint_runtime::{ExpirySweeper, InvitationConfig, InvitationManager};
use waypoint_storage::{CollabStorage, PostgresCollabStorage};

mod config;
mod error;

use config::{StorageConfig, SweeperConfig};
use error::{SweeperError, SweeperResult};

/// Waypoint sweeper CLI
#[derive(Parser)]
#[command(name = "waypoint-sweeperd")]
#[command(about = "Expires lapsed Waypoint trip invitations", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "WAYPOINT_CONFIG")]
    config: Option<String>,

    /// Log level, overrides the configured one
    #[arg(long, env = "WAYPOINT_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "WAYPOINT_LOG_JSON")]
    json: bool,

    /// Run a single sweep and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = SweeperConfig::load(cli.config.as_deref()).map_err(SweeperError::from)?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());

    if cli.json || config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        interval_secs = config.sweep.interval_secs,
        "Waypoint sweeper starting"
    );

    run(config, cli.once).await.context("sweeper failed")?;
    Ok(())
}

async fn run(config: SweeperConfig, once: bool) -> SweeperResult<()> {
    config.validate()?;
    let storage = open_storage(&config.storage).await?;
    let sweeper = ExpirySweeper::new(
        InvitationManager::new(storage, InvitationConfig::default()),
        config.sweep,
    );

    if once {
        let count = sweeper.run_once().await?;
        tracing::info!(count, "Single sweep complete");
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    sweeper.run(shutdown_rx).await;
    tracing::info!("Waypoint sweeper shut down");
    Ok(())
}

async fn open_storage(config: &StorageConfig) -> SweeperResult<Arc<dyn CollabStorage>> {
    match config {
        StorageConfig::Memory => Err(SweeperError::NonPersistentStorage(config.kind())),
        StorageConfig::Postgres {
            url,
            max_connections,
            connect_timeout_secs,
        } => {
            let store = PostgresCollabStorage::connect_with_options(
                url,
                *max_connections,
                *connect_timeout_secs,
            )
            .await?;
            tracing::info!(max_connections, "Connected to PostgreSQL");
            Ok(Arc::new(store))
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, stopping sweeper");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, stopping sweeper");
        }
    }
}
