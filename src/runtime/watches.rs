//! # Dependency Watches
//!
//! Starts one dependency watcher per reconciler and registers the watches.
//! A missing CRD only disables the affected reconciler; any other
//! registration failure aborts startup.

use crate::client::{DynamicClient, KubeDynamicClient};
use crate::config::ControllerConfig;
use crate::controllers::{ComplianceDbSecretReconciler, ComponentFinalizerReconciler};
use crate::depwatch::{DependencyWatcher, KubeDependencyWatcher, Reconcile, WatcherOptions};
use crate::error::WatchError;
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub type WatcherTask = JoinHandle<Result<(), WatchError>>;

pub async fn start_watchers(
    client: &Client,
    config: &ControllerConfig,
    shutdown: &watch::Receiver<bool>,
) -> Result<Vec<WatcherTask>> {
    let options = WatcherOptions::from(config);
    let dynamic_client: Arc<dyn DynamicClient> = Arc::new(KubeDynamicClient::new(client.clone()));
    let mut tasks = Vec::with_capacity(2);

    let finalizer_watcher = Arc::new(KubeDependencyWatcher::new(
        "componentfinalizer",
        client.clone(),
        options.clone(),
    ));
    let finalizer = Arc::new(ComponentFinalizerReconciler::new(
        Arc::clone(&finalizer_watcher) as Arc<dyn DependencyWatcher>,
        Arc::clone(&dynamic_client),
        config.finalizer_addon_names.clone(),
        config.controller_namespace.clone(),
    ));
    tasks.push(spawn_watcher(
        Arc::clone(&finalizer_watcher),
        Arc::clone(&finalizer) as Arc<dyn Reconcile>,
        shutdown.clone(),
    ));

    info!("Waiting for the finalizer dependency watcher to start");
    finalizer_watcher.started().await;
    tolerate_missing_crd(
        finalizer.watch_resources().await,
        "InternalHubComponent",
        "finalizer reconciler",
    )?;

    let compliance_watcher = Arc::new(KubeDependencyWatcher::new(
        "complianceapi",
        client.clone(),
        options,
    ));
    let compliance = Arc::new(ComplianceDbSecretReconciler::new(
        Arc::clone(&compliance_watcher) as Arc<dyn DependencyWatcher>,
        dynamic_client,
    ));
    tasks.push(spawn_watcher(
        Arc::clone(&compliance_watcher),
        Arc::clone(&compliance) as Arc<dyn Reconcile>,
        shutdown.clone(),
    ));

    info!("Waiting for the compliance API dependency watcher to start");
    compliance_watcher.started().await;
    tolerate_missing_crd(
        compliance
            .watch_resources(&config.controller_namespace)
            .await,
        "Route",
        "compliance API reconciler",
    )?;

    Ok(tasks)
}

fn spawn_watcher(
    watcher: Arc<KubeDependencyWatcher>,
    reconciler: Arc<dyn Reconcile>,
    mut shutdown: watch::Receiver<bool>,
) -> WatcherTask {
    tokio::spawn(async move {
        watcher
            .run(reconciler, async move {
                if shutdown.wait_for(|stop| *stop).await.is_err() {
                    warn!("shutdown signal dropped, stopping dependency watcher");
                }
            })
            .await
    })
}

fn tolerate_missing_crd(result: Result<(), WatchError>, kind: &str, reconciler: &str) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_no_versioned_resource() => {
            error!(error = %e, "{} unable to watch resources", reconciler);
            info!("{} CRD not found, those resources will not be watched", kind);
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("{reconciler} unable to watch resources")),
    }
}
