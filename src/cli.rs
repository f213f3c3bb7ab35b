//! # CLI
//!
//! Command surface of the controller binary.
//!
//! ```bash
//! # Run the controller
//! governance-policy-addon-controller controller
//!
//! # Print the Helm values an add-on agent would get on a managed cluster
//! governance-policy-addon-controller values --addon config-policy-controller --cluster cluster1
//! ```

use crate::addon::{AddonKind, ApiHubLookup, HubLookup};
use crate::config::{AddonImages, ControllerConfig};
use crate::runtime::{self, initialization};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kube::Client;

/// Governance policy addon controller for Open Cluster Management
#[derive(Debug, Parser)]
#[command(name = "governance-policy-addon-controller", version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the addon controller
    Controller,
    /// Print the merged Helm values of an add-on on a managed cluster
    Values {
        /// Add-on name, e.g. governance-policy-framework
        #[arg(long)]
        addon: String,

        /// Managed cluster name (also the namespace of its add-ons)
        #[arg(long)]
        cluster: String,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Controller => runtime::run_controller().await,
        Commands::Values { addon, cluster } => values_command(&addon, &cluster).await,
    }
}

async fn values_command(addon: &str, cluster: &str) -> Result<()> {
    initialization::install_crypto_provider();
    initialization::init_tracing(&ControllerConfig::from_env());

    let kind: AddonKind = addon.parse()?;
    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;
    let hub = ApiHubLookup::new(client);

    let managed_cluster = hub
        .managed_cluster(cluster)
        .await
        .with_context(|| format!("Failed to get ManagedCluster {cluster}"))?
        .with_context(|| format!("ManagedCluster {cluster} not found"))?;
    let managed_cluster_addon = hub
        .managed_cluster_addon(cluster, kind.name())
        .await
        .with_context(|| format!("Failed to get ManagedClusterAddOn {cluster}/{kind}"))?
        .with_context(|| format!("ManagedClusterAddOn {cluster}/{kind} not found"))?;

    let values = kind
        .values(
            &managed_cluster,
            &managed_cluster_addon,
            &AddonImages::from_env(),
            &hub,
        )
        .await?;

    print!("{}", serde_yaml::to_string(&values)?);
    Ok(())
}
