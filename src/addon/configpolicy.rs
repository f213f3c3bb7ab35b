//! # Config Policy Controller Values
//!
//! Values for the `config-policy-controller` agent. Unlike the other agents
//! these depend on hub state: the hosting cluster of a hosted-mode add-on
//! and whether standalone hub templating is enabled for the cluster.

use super::common::{
    bool_annotation, cluster_vendor, to_values, GlobalValues, UserArgs,
    HOSTING_CLUSTER_NAME_ANNOTATION, PROMETHEUS_ENABLED_ANNOTATION,
};
use super::lookup::HubLookup;
use super::{standalonetemplating, Values};
use crate::config::AddonImages;
use crate::crd::{ManagedCluster, ManagedClusterAddOn};
use crate::error::ValuesError;
use kube::ResourceExt;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::error;

pub const ADDON_NAME: &str = "config-policy-controller";

pub const EVALUATION_CONCURRENCY_ANNOTATION: &str = "policy-evaluation-concurrency";
pub const CLIENT_QPS_ANNOTATION: &str = "client-qps";
pub const CLIENT_BURST_ANNOTATION: &str = "client-burst";
pub const OPERATOR_POLICY_DISABLED_ANNOTATION: &str = "operator-policy-disabled";

const OPENSHIFT_MAJOR_LABEL: &str = "openshiftVersion-major";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Args {
    #[serde(flatten)]
    common: UserArgs,
    /// Zero leaves the chart default in place
    #[serde(skip_serializing_if = "is_zero")]
    evaluation_concurrency: u8,
    #[serde(rename = "clientQPS", skip_serializing_if = "is_zero")]
    client_qps: u8,
    #[serde(skip_serializing_if = "is_zero")]
    client_burst: u8,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigPolicyValues {
    global: GlobalValues,
    kubernetes_distribution: String,
    hosting_kubernetes_distribution: String,
    prometheus: Map<String, Value>,
    operator_policy: Map<String, Value>,
    args: Args,
    standalone_hub_templating_secret: String,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(value: &u8) -> bool {
    *value == 0
}

/// Values derived from the cluster, the add-on and hub state
pub async fn values(
    cluster: &ManagedCluster,
    addon: &ManagedClusterAddOn,
    images: &AddonImages,
    hub: &dyn HubLookup,
) -> Result<Values, ValuesError> {
    let annotations = addon.annotations();
    let kubernetes_distribution = cluster_vendor(cluster);

    let hosting_kubernetes_distribution = match annotations
        .get(HOSTING_CLUSTER_NAME_ANNOTATION)
        .filter(|name| !name.is_empty())
    {
        Some(hosting) => {
            let hosting_cluster = hub
                .managed_cluster(hosting)
                .await?
                .ok_or_else(|| ValuesError::ClusterNotFound(hosting.clone()))?;
            cluster_vendor(&hosting_cluster)
        }
        None => kubernetes_distribution.clone(),
    };

    let namespace = addon.namespace().unwrap_or_default();
    let standalone_hub_templating_secret = if hub
        .managed_cluster_addon(&namespace, standalonetemplating::ADDON_NAME)
        .await?
        .is_some()
    {
        format!("{}-hub-kubeconfig", standalonetemplating::ADDON_NAME)
    } else {
        String::new()
    };

    let openshift_4 = cluster.labels().get(OPENSHIFT_MAJOR_LABEL).map(String::as_str) == Some("4");
    let mut operator_policy = Map::new();
    operator_policy.insert(
        "disabled".to_string(),
        Value::Bool(bool_annotation(
            ADDON_NAME,
            annotations,
            OPERATOR_POLICY_DISABLED_ANNOTATION,
            !openshift_4,
        )),
    );
    if openshift_4 {
        operator_policy.insert(
            "defaultNamespace".to_string(),
            Value::from("openshift-operators"),
        );
    }

    let prometheus_enabled = bool_annotation(
        ADDON_NAME,
        annotations,
        PROMETHEUS_ENABLED_ANNOTATION,
        hosting_kubernetes_distribution == "OpenShift",
    );

    let mut common = UserArgs::default();
    common.apply_log_level(ADDON_NAME, annotations);

    let evaluation_concurrency = u8_annotation(annotations, EVALUATION_CONCURRENCY_ANNOTATION, 0);
    // Client limits scale with concurrency unless set explicitly
    let client_qps = match annotations.get(CLIENT_QPS_ANNOTATION) {
        Some(_) => u8_annotation(annotations, CLIENT_QPS_ANNOTATION, 0),
        None => evaluation_concurrency.wrapping_mul(15),
    };
    let client_burst = match annotations.get(CLIENT_BURST_ANNOTATION) {
        Some(_) => u8_annotation(annotations, CLIENT_BURST_ANNOTATION, 0),
        None if evaluation_concurrency != 0 => evaluation_concurrency.wrapping_mul(22).wrapping_add(1),
        None => 0,
    };

    to_values(&ConfigPolicyValues {
        global: GlobalValues::with_image_overrides([(
            "config_policy_controller",
            images.config_policy_controller.as_str(),
        )]),
        kubernetes_distribution,
        hosting_kubernetes_distribution,
        prometheus: Map::from_iter([("enabled".to_string(), Value::Bool(prometheus_enabled))]),
        operator_policy,
        args: Args {
            common,
            evaluation_concurrency,
            client_qps,
            client_burst,
        },
        standalone_hub_templating_secret,
    })
}

fn u8_annotation(annotations: &BTreeMap<String, String>, annotation: &str, default: u8) -> u8 {
    let Some(value) = annotations.get(annotation) else {
        return default;
    };
    parse_unsigned(value).unwrap_or_else(|err| {
        error!(
            component = ADDON_NAME,
            annotation,
            error = %err,
            "failed to verify '{annotation}' annotation value '{value}' for component {ADDON_NAME} (falling back to default value {default})"
        );
        default
    })
}

/// Unsigned decimal without a sign prefix
fn parse_unsigned(value: &str) -> Result<u8, String> {
    if value.starts_with('+') {
        return Err("invalid syntax".to_string());
    }
    value.parse().map_err(|err: std::num::ParseIntError| err.to_string())
}
