//! # Runtime
//!
//! Controller startup and shutdown.
//!
//! - `initialization`: rustls, tracing, metrics, HTTP server and client setup
//! - `watches`: dependency watchers and watch registration

pub mod initialization;
pub mod watches;

use anyhow::Result;
use std::sync::atomic::Ordering;
use tokio::sync::watch;
use tracing::{error, info};

/// Run the controller until SIGINT/SIGTERM
pub async fn run_controller() -> Result<()> {
    let init = initialization::initialize().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tasks = watches::start_watchers(&init.client, &init.config, &shutdown_rx).await?;

    init.server_state.is_ready.store(true, Ordering::Relaxed);
    info!("Controller initialized, dependency watchers running");

    shutdown_signal().await;
    init.server_state.is_ready.store(false, Ordering::Relaxed);
    shutdown_tx.send_replace(true);

    for task in tasks {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Dependency watcher failed: {}", e),
            Err(e) => error!("Dependency watcher task panicked: {}", e),
        }
    }

    info!("Controller stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
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
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Received shutdown signal, initiating graceful shutdown...");
}
