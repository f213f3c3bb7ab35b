//! # Policy Framework Values
//!
//! Values for the `governance-policy-framework` agent, which syncs policies
//! from the hub to the managed cluster.

use super::common::{
    bool_annotation, cluster_vendor, to_values, GlobalValues, UserArgs,
    HOSTING_CLUSTER_NAME_ANNOTATION, PROMETHEUS_ENABLED_ANNOTATION,
};
use super::Values;
use crate::config::AddonImages;
use crate::crd::{ManagedCluster, ManagedClusterAddOn};
use crate::error::ValuesError;
use kube::ResourceExt;
use serde::Serialize;
use serde_json::{Map, Value};

pub const ADDON_NAME: &str = "governance-policy-framework";

/// Marks a cluster (or add-on) as running on the hub itself
pub const ON_MULTICLUSTER_HUB_ANNOTATION: &str = "addon.open-cluster-management.io/on-multicluster-hub";
/// Only set when the hub is imported into a global hub
pub const SYNC_POLICIES_ON_MULTICLUSTER_HUB_ANNOTATION: &str =
    "policy.open-cluster-management.io/sync-policies-on-multicluster-hub";

const LOCAL_CLUSTER: &str = "local-cluster";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Args {
    #[serde(flatten)]
    common: UserArgs,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    sync_policies_on_multicluster_hub: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PolicyFrameworkValues {
    on_multicluster_hub: bool,
    global: GlobalValues,
    kubernetes_distribution: String,
    prometheus: Map<String, Value>,
    args: Args,
}

/// Values derived from the cluster and add-on metadata
pub fn values(
    cluster: &ManagedCluster,
    addon: &ManagedClusterAddOn,
    images: &AddonImages,
) -> Result<Values, ValuesError> {
    let addon_annotations = addon.annotations();
    let hosting_cluster = addon_annotations
        .get(HOSTING_CLUSTER_NAME_ANNOTATION)
        .map(String::as_str);

    let mut on_multicluster_hub =
        cluster.name_any() == LOCAL_CLUSTER || hosting_cluster == Some(LOCAL_CLUSTER);
    let mut sync_policies = false;

    // The add-on annotation wins over the cluster annotation
    for annotations in [cluster.annotations(), addon_annotations] {
        on_multicluster_hub = bool_flag(annotations.get(ON_MULTICLUSTER_HUB_ANNOTATION), on_multicluster_hub);
        sync_policies = bool_flag(
            annotations.get(SYNC_POLICIES_ON_MULTICLUSTER_HUB_ANNOTATION),
            sync_policies,
        );
    }

    let mut args = Args {
        common: UserArgs::default(),
        sync_policies_on_multicluster_hub: sync_policies,
    };
    args.common.apply_log_level(ADDON_NAME, addon_annotations);

    let kubernetes_distribution = cluster_vendor(cluster);
    let prometheus_enabled = bool_annotation(
        ADDON_NAME,
        addon_annotations,
        PROMETHEUS_ENABLED_ANNOTATION,
        kubernetes_distribution == "OpenShift",
    );

    to_values(&PolicyFrameworkValues {
        on_multicluster_hub,
        global: GlobalValues::with_image_overrides([
            (
                "governance_policy_framework_addon",
                images.governance_policy_framework_addon.as_str(),
            ),
            ("kube_rbac_proxy", images.kube_rbac_proxy.as_str()),
        ]),
        kubernetes_distribution,
        prometheus: Map::from_iter([("enabled".to_string(), Value::Bool(prometheus_enabled))]),
        args,
    })
}

/// Case-insensitive `true`/`false`; anything else keeps `current`
fn bool_flag(value: Option<&String>, current: bool) -> bool {
    match value {
        Some(v) if v.eq_ignore_ascii_case("true") => true,
        Some(v) if v.eq_ignore_ascii_case("false") => false,
        _ => current,
    }
}
