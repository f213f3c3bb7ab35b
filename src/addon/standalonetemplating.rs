//! Values for the `governance-standalone-hub-templating` agent.

use super::Values;
use crate::crd::ManagedClusterAddOn;
use kube::ResourceExt;
use serde_json::Value;

pub const ADDON_NAME: &str = "governance-standalone-hub-templating";

/// The hub group the add-on agent authenticates as. Users bind extra
/// permissions for hub templates to this group.
pub fn hub_group(cluster_namespace: &str, addon_name: &str) -> String {
    format!("system:open-cluster-management:cluster:{cluster_namespace}:addon:{addon_name}")
}

pub fn values(addon: &ManagedClusterAddOn) -> Values {
    let namespace = addon.namespace().unwrap_or_default();
    Values::from_iter([(
        "hubGroup".to_string(),
        Value::from(hub_group(&namespace, &addon.name_any())),
    )])
}
