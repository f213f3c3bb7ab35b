//! # Component Finalizer
//!
//! Keeps [`POLICY_FINALIZER`] on the `grc` InternalHubComponent for as long as
//! any of the configured ManagedClusterAddOns exist in any namespace, so the
//! hub component cannot be removed before its add-ons are cleaned up.

use crate::client::DynamicClient;
use crate::constants::{
    ADDON_GROUP, ADDON_KIND, ADDON_VERSION, IHC_GROUP, IHC_KIND, IHC_NAME, IHC_PLURAL, IHC_VERSION,
    POLICY_FINALIZER,
};
use crate::depwatch::{CacheLookup, DependencyWatcher, ObjectIdentifier, Reconcile, SELECT_ALL};
use crate::error::{ReconcileError, WatchError};
use async_trait::async_trait;
use kube::api::ApiResource;
use kube::core::GroupVersionKind;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

#[must_use]
pub fn ihc_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk(IHC_GROUP, IHC_VERSION, IHC_KIND)
}

#[must_use]
pub fn ihc_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(&ihc_gvk(), IHC_PLURAL)
}

pub struct ComponentFinalizerReconciler {
    watcher: Arc<dyn DependencyWatcher>,
    client: Arc<dyn DynamicClient>,
    addon_names: Vec<String>,
    /// Namespace of the `grc` InternalHubComponent
    namespace: String,
}

impl fmt::Debug for ComponentFinalizerReconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentFinalizerReconciler")
            .field("addon_names", &self.addon_names)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl ComponentFinalizerReconciler {
    pub fn new(
        watcher: Arc<dyn DependencyWatcher>,
        client: Arc<dyn DynamicClient>,
        addon_names: Vec<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            watcher,
            client,
            addon_names,
            namespace: namespace.into(),
        }
    }

    /// Identifier of the `grc` InternalHubComponent, used as the watcher key
    #[must_use]
    pub fn target(&self) -> ObjectIdentifier {
        ObjectIdentifier::new(IHC_GROUP, IHC_VERSION, IHC_KIND, &self.namespace, IHC_NAME)
    }

    /// Watch the target plus every configured add-on name across all namespaces.
    ///
    /// Returns [`WatchError::NoVersionedResource`] when the InternalHubComponent
    /// CRD is not installed.
    pub async fn watch_resources(&self) -> Result<(), WatchError> {
        let target = self.target();
        let mut watched = Vec::with_capacity(self.addon_names.len() + 1);
        watched.push(target.clone());
        for name in &self.addon_names {
            watched.push(
                ObjectIdentifier::new(ADDON_GROUP, ADDON_VERSION, ADDON_KIND, "", name)
                    .with_selector(SELECT_ALL),
            );
        }
        self.watcher.add_or_update_watcher(target, watched).await
    }

    fn is_target(watcher: &ObjectIdentifier) -> bool {
        watcher.group == IHC_GROUP && watcher.kind == IHC_KIND && watcher.name == IHC_NAME
    }
}

#[async_trait]
impl Reconcile for ComponentFinalizerReconciler {
    fn name(&self) -> &'static str {
        "componentfinalizer"
    }

    async fn reconcile(&self, watcher: &ObjectIdentifier) -> Result<Action, ReconcileError> {
        if !Self::is_target(watcher) {
            info!(watcher = %watcher, "ignoring unexpected input to component finalizer reconciler");
            return Ok(Action::await_change());
        }

        let mut ihc = match self
            .watcher
            .get_from_cache(&ihc_gvk(), &self.namespace, IHC_NAME)?
        {
            CacheLookup::Found(ihc) => ihc,
            CacheLookup::NotCached => {
                debug!(namespace = %self.namespace, name = IHC_NAME, "InternalHubComponent not found");
                return Ok(Action::await_change());
            }
        };

        let has_finalizer = ihc.finalizers().iter().any(|f| f == POLICY_FINALIZER);

        // The listing includes the InternalHubComponent itself, which never matches an add-on name
        let any_addon = self
            .watcher
            .list_watched_from_cache(watcher)?
            .iter()
            .any(|obj| self.addon_names.iter().any(|name| *name == obj.name_any()));

        match (any_addon, has_finalizer) {
            (true, false) => {
                ihc.finalizers_mut().push(POLICY_FINALIZER.to_string());
                self.client
                    .update(&ihc_resource(), Some(self.namespace.as_str()), &ihc)
                    .await?;
                info!(
                    namespace = %self.namespace,
                    finalizer = POLICY_FINALIZER,
                    "added finalizer to InternalHubComponent {}",
                    IHC_NAME
                );
            }
            (false, true) => {
                ihc.finalizers_mut().retain(|f| f != POLICY_FINALIZER);
                self.client
                    .update(&ihc_resource(), Some(self.namespace.as_str()), &ihc)
                    .await?;
                info!(
                    namespace = %self.namespace,
                    finalizer = POLICY_FINALIZER,
                    "removed finalizer from InternalHubComponent {}",
                    IHC_NAME
                );
            }
            _ => debug!(finalizer_present = has_finalizer, "finalizer already in desired state"),
        }

        Ok(Action::await_change())
    }
}
