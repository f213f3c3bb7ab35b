//! # Common Values
//!
//! Helm values shared by every add-on agent and the helpers used to derive
//! them from ManagedCluster and ManagedClusterAddOn metadata.

use super::Values;
use crate::crd::{ManagedCluster, ManagedClusterAddOn};
use crate::error::ValuesError;
use kube::ResourceExt;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::error;

/// Agent log verbosity
pub const LOG_LEVEL_ANNOTATION: &str = "log-level";
/// Enables or disables the agent's Prometheus metrics
pub const PROMETHEUS_ENABLED_ANNOTATION: &str = "prometheus-metrics-enabled";
/// JSON object merged into the computed values
pub const VALUES_ANNOTATION: &str = "addon.open-cluster-management.io/values";
/// Set on hosted-mode add-ons to the cluster running the agent
pub const HOSTING_CLUSTER_NAME_ANNOTATION: &str = "addon.open-cluster-management.io/hosting-cluster-name";

const PRODUCT_CLAIM: &str = "product.open-cluster-management.io";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalValues {
    pub image_pull_policy: String,
    pub image_pull_secret: String,
    pub image_overrides: BTreeMap<String, String>,
    pub proxy_config: BTreeMap<String, String>,
}

impl GlobalValues {
    /// Defaults with the given `image key -> image` overrides
    pub fn with_image_overrides<'a>(overrides: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            image_pull_policy: "IfNotPresent".to_string(),
            image_pull_secret: "open-cluster-management-image-pull-credentials".to_string(),
            image_overrides: overrides
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            proxy_config: ["HTTP_PROXY", "HTTPS_PROXY", "NO_PROXY"]
                .into_iter()
                .map(|k| (k.to_string(), String::new()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserArgs {
    pub log_encoder: String,
    pub log_level: i8,
    pub pkg_log_level: i8,
}

impl Default for UserArgs {
    fn default() -> Self {
        Self {
            log_encoder: "console".to_string(),
            log_level: 0,
            pkg_log_level: -1,
        }
    }
}

impl UserArgs {
    /// Apply the `log-level` annotation, if present
    pub fn apply_log_level(&mut self, component: &str, annotations: &BTreeMap<String, String>) {
        if let Some(value) = annotations.get(LOG_LEVEL_ANNOTATION) {
            self.log_level = log_level(component, value);
            self.pkg_log_level = self.log_level.saturating_sub(2);
        }
    }
}

/// Parse a `log-level` annotation value; anything invalid or below -1 becomes 0
pub fn log_level(component: &str, value: &str) -> i8 {
    match value.trim().parse::<i8>() {
        Ok(level) if level >= -1 => level,
        Ok(_) => {
            error!(
                component,
                "log level {value} for component {component} is below -1 (falling back to default value 0)"
            );
            0
        }
        Err(err) => {
            error!(
                component,
                error = %err,
                "failed to parse log level {value} for component {component} (falling back to default value 0)"
            );
            0
        }
    }
}

/// Boolean parsing with the spellings Kubernetes annotations commonly use
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Override `current` with a boolean annotation, logging and keeping `current` when invalid
pub fn bool_annotation(
    component: &str,
    annotations: &BTreeMap<String, String>,
    annotation: &str,
    current: bool,
) -> bool {
    let Some(value) = annotations.get(annotation) else {
        return current;
    };
    parse_bool(value).unwrap_or_else(|| {
        error!(
            component,
            annotation,
            "failed to verify '{annotation}' annotation value '{value}' for component {component} (falling back to default value {current})"
        );
        current
    })
}

/// Distribution of a managed cluster: the product claim wins over the `vendor` label
pub fn cluster_vendor(cluster: &ManagedCluster) -> String {
    let claim = cluster
        .status
        .as_ref()
        .and_then(|s| s.cluster_claims.iter().find(|c| c.name == PRODUCT_CLAIM));
    if let Some(claim) = claim {
        return claim.value.clone();
    }
    // The label may hold values like "auto-detect"; only a literal OpenShift counts
    match cluster.labels().get("vendor").map(String::as_str) {
        Some("OpenShift") => "OpenShift".to_string(),
        _ => String::new(),
    }
}

/// True for clusters on Kubernetes older than 1.14
pub fn is_old_kubernetes(cluster: &ManagedCluster) -> bool {
    let Some(version) = cluster.status.as_ref().and_then(|s| s.version.as_ref()) else {
        return false;
    };
    let mut parts = version.kubernetes.trim_start_matches('v').split('.');
    let major = parts.next().and_then(|p| p.parse::<u64>().ok());
    let minor = parts
        .next()
        .map(|p| p.chars().take_while(char::is_ascii_digit).collect::<String>())
        .and_then(|p| p.parse::<u64>().ok());
    matches!((major, minor), (Some(1), Some(minor)) if minor < 14)
}

/// Values supplied verbatim by the user through [`VALUES_ANNOTATION`]
pub fn values_from_addon_annotation(addon: &ManagedClusterAddOn) -> Result<Values, ValuesError> {
    let Some(raw) = addon.annotations().get(VALUES_ANNOTATION) else {
        return Ok(Values::new());
    };
    serde_json::from_str(raw).map_err(|source| ValuesError::InvalidAnnotation {
        annotation: VALUES_ANNOTATION.to_string(),
        source,
    })
}

/// Values applied regardless of user overrides
pub fn mandate_values(cluster: &ManagedCluster, addon: &ManagedClusterAddOn) -> Values {
    let mut values = Values::new();
    // No replica overrides on old clusters
    if is_old_kubernetes(cluster) {
        values.insert("replicas".to_string(), Value::from(1));
    }
    if addon.metadata.deletion_timestamp.is_some() {
        values.insert("uninstallationAnnotation".to_string(), Value::from("true"));
    }
    values
}

/// Deep-merge `overlay` into `base`; nested objects merge, everything else is replaced
pub fn merge_values(base: &mut Values, overlay: Values) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => merge_values(existing, incoming),
            (Some(slot), value) => *slot = value,
            (None, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Serialize a values struct into a values map
pub fn to_values<T: Serialize>(values: &T) -> Result<Values, ValuesError> {
    match serde_json::to_value(values)? {
        Value::Object(map) => Ok(map),
        other => Ok(Values::from_iter([("value".to_string(), other)])),
    }
}
