use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// An add-on enabled for one managed cluster, living in the cluster's namespace
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "ManagedClusterAddOn",
    group = "addon.open-cluster-management.io",
    version = "v1alpha1",
    namespaced,
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterAddOnSpec {
    /// Namespace on the managed cluster the agent is installed into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_namespace: Option<String>,
}
