//! # Compliance History API
//!
//! Exposes the compliance history API through an OpenShift Route exactly
//! while the `governance-policy-database` Secret exists in the controller
//! namespace.
//!
//! The watcher key is the Secret identifier; the Route is watched as well so
//! a manually deleted Route is recreated.
//!
//! Cache lookup failures on the Secret are logged and swallowed rather than
//! retried. Failures of the Route create/delete are returned for retry.

use crate::client::DynamicClient;
use crate::constants::{
    COMPLIANCE_DB_SECRET_NAME, COMPLIANCE_ROUTE_NAME, COMPLIANCE_ROUTE_TARGET_PORT,
    COMPLIANCE_SERVICE_NAME, ROUTE_GROUP, ROUTE_KIND, ROUTE_PLURAL, ROUTE_VERSION,
};
use crate::depwatch::{CacheLookup, DependencyWatcher, ObjectIdentifier, Reconcile};
use crate::error::{ReconcileError, WatchError};
use async_trait::async_trait;
use kube::api::{ApiResource, DynamicObject};
use kube::core::GroupVersionKind;
use kube_runtime::controller::Action;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[must_use]
pub fn route_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk(ROUTE_GROUP, ROUTE_VERSION, ROUTE_KIND),
        ROUTE_PLURAL,
    )
}

/// Identifier of the database Secret in `namespace`
#[must_use]
pub fn db_secret_id(namespace: &str) -> ObjectIdentifier {
    ObjectIdentifier::new("", "v1", "Secret", namespace, COMPLIANCE_DB_SECRET_NAME)
}

/// Identifier of the compliance history API Route in `namespace`
#[must_use]
pub fn route_id(namespace: &str) -> ObjectIdentifier {
    ObjectIdentifier::new(ROUTE_GROUP, ROUTE_VERSION, ROUTE_KIND, namespace, COMPLIANCE_ROUTE_NAME)
}

/// The Route the controller maintains in `namespace`
#[must_use]
pub fn desired_route(namespace: &str) -> DynamicObject {
    DynamicObject::new(COMPLIANCE_ROUTE_NAME, &route_resource())
        .within(namespace)
        .data(json!({
            "spec": {
                "port": {
                    "targetPort": COMPLIANCE_ROUTE_TARGET_PORT,
                },
                "tls": {
                    "insecureEdgeTerminationPolicy": "Redirect",
                    "termination": "reencrypt",
                },
                "to": {
                    "kind": "Service",
                    "name": COMPLIANCE_SERVICE_NAME,
                },
            }
        }))
}

pub struct ComplianceDbSecretReconciler {
    watcher: Arc<dyn DependencyWatcher>,
    client: Arc<dyn DynamicClient>,
}

impl fmt::Debug for ComplianceDbSecretReconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComplianceDbSecretReconciler")
            .finish_non_exhaustive()
    }
}

impl ComplianceDbSecretReconciler {
    pub fn new(watcher: Arc<dyn DependencyWatcher>, client: Arc<dyn DynamicClient>) -> Self {
        Self { watcher, client }
    }

    /// Watch the database Secret and the Route in `namespace`.
    ///
    /// Returns [`WatchError::NoVersionedResource`] on clusters without the Route API.
    pub async fn watch_resources(&self, namespace: &str) -> Result<(), WatchError> {
        let secret = db_secret_id(namespace);
        self.watcher
            .add_or_update_watcher(secret.clone(), vec![secret, route_id(namespace)])
            .await
    }

    async fn delete_route(&self, namespace: &str) -> Result<Action, ReconcileError> {
        debug!(
            namespace,
            secret = COMPLIANCE_DB_SECRET_NAME,
            route = COMPLIANCE_ROUTE_NAME,
            "secret not present, verifying the route is deleted"
        );

        match self
            .client
            .delete(&route_resource(), Some(namespace), COMPLIANCE_ROUTE_NAME)
            .await
        {
            Ok(()) => {
                info!(namespace, route = COMPLIANCE_ROUTE_NAME, "deleted the compliance history API route");
                Ok(Action::await_change())
            }
            Err(err) if err.is_not_found() => Ok(Action::await_change()),
            Err(err) => {
                error!(
                    namespace,
                    route = COMPLIANCE_ROUTE_NAME,
                    error = %err,
                    "failed to delete the compliance history API route"
                );
                Err(err.into())
            }
        }
    }

    async fn create_route(&self, namespace: &str) -> Result<Action, ReconcileError> {
        debug!(
            namespace,
            secret = COMPLIANCE_DB_SECRET_NAME,
            route = COMPLIANCE_ROUTE_NAME,
            "secret present, verifying the route exists"
        );

        match self
            .client
            .create(&route_resource(), Some(namespace), &desired_route(namespace))
            .await
        {
            Ok(_) => {
                info!(namespace, route = COMPLIANCE_ROUTE_NAME, "created the compliance history API route");
                Ok(Action::await_change())
            }
            Err(err) if err.is_already_exists() => {
                debug!(namespace, route = COMPLIANCE_ROUTE_NAME, "compliance history API route already exists");
                Ok(Action::await_change())
            }
            Err(err) => {
                error!(
                    namespace,
                    route = COMPLIANCE_ROUTE_NAME,
                    error = %err,
                    "failed to create the compliance history API route"
                );
                Err(err.into())
            }
        }
    }
}

#[async_trait]
impl Reconcile for ComplianceDbSecretReconciler {
    fn name(&self) -> &'static str {
        "complianceapi"
    }

    async fn reconcile(&self, watcher: &ObjectIdentifier) -> Result<Action, ReconcileError> {
        // The Secret and the Route share the watcher's namespace
        let namespace = watcher.namespace.as_str();

        let lookup = self.watcher.get_from_cache(
            &GroupVersionKind::gvk("", "v1", "Secret"),
            namespace,
            COMPLIANCE_DB_SECRET_NAME,
        );

        match lookup {
            Ok(CacheLookup::Found(_)) => self.create_route(namespace).await,
            Ok(CacheLookup::NotCached) => self.delete_route(namespace).await,
            Err(err) => {
                warn!(namespace, error = %err, "failed to read the database secret from the cache");
                Ok(Action::await_change())
            }
        }
    }
}
