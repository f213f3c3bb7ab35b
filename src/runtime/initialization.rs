//! # Initialization
//!
//! Controller initialization: rustls setup, tracing, metrics, server startup
//! and Kubernetes client setup.

use crate::config::ControllerConfig;
use crate::observability;
use crate::server::{start_server, ServerState};
use anyhow::{Context, Result};
use kube::Client;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Everything the controller needs once bootstrapping is done
pub struct InitializationResult {
    pub client: Client,
    pub config: ControllerConfig,
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("config", &self.config)
            .field(
                "server_ready",
                &self
                    .server_state
                    .is_ready
                    .load(std::sync::atomic::Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}

/// Install the ring crypto provider for rustls. Must run before any TLS use.
pub fn install_crypto_provider() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }
}

/// Set up the tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `config.log_level` applies to this crate.
pub fn init_tracing(config: &ControllerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("governance_policy_addon_controller={}", config.log_level).into()
    });
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if config.json_logs() {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = result {
        eprintln!("tracing subscriber already initialized: {e}");
    }
}

/// Initialize the controller runtime
///
/// - rustls crypto provider setup
/// - tracing subscriber setup
/// - metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
pub async fn initialize() -> Result<InitializationResult> {
    install_crypto_provider();

    let config = ControllerConfig::from_env();
    init_tracing(&config);

    info!("Starting governance policy addon controller");
    info!(
        "Build info: datetime={}, git_hash={}",
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    info!(
        namespace = %config.controller_namespace,
        metrics_port = config.metrics_port,
        "Loaded controller configuration"
    );

    observability::metrics::register_metrics().context("Failed to register metrics")?;

    let server_state = Arc::new(ServerState {
        is_ready: Arc::new(AtomicBool::new(false)),
    });

    let server_port = config.metrics_port;
    let server_state_clone = Arc::clone(&server_state);
    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    Ok(InitializationResult {
        client,
        config,
        server_state,
    })
}
