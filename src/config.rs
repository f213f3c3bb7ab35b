//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::constants::{
    DEFAULT_CONTROLLER_NAMESPACE, DEFAULT_METRICS_PORT, DEFAULT_RECONCILE_RETRY_MAX_SECS,
    DEFAULT_RECONCILE_RETRY_MIN_SECS, DEFAULT_WATCH_RESTART_DELAY_SECS, FINALIZER_ADDON_NAMES,
};
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have defaults and can be overridden via environment variables
/// populated by the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace the controller runs in (`POD_NAMESPACE`).
    /// Holds the `grc` InternalHubComponent, the database Secret and the Route.
    pub controller_namespace: String,
    /// HTTP port for `/healthz`, `/readyz` and `/metrics`
    pub metrics_port: u16,
    /// First retry delay after a failed reconcile (seconds)
    pub reconcile_retry_min_secs: u64,
    /// Cap on the retry delay after repeated failures (seconds)
    pub reconcile_retry_max_secs: u64,
    /// Delay before restarting a failed watch stream (seconds)
    pub watch_restart_delay_secs: u64,
    /// Default log level when `RUST_LOG` is unset
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// ManagedClusterAddOn names that keep the `grc` finalizer in place
    pub finalizer_addon_names: Vec<String>,
    /// Image overrides injected into add-on Helm values
    pub images: AddonImages,
}

/// Agent images handed to the managed clusters through Helm values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddonImages {
    pub config_policy_controller: String,
    pub governance_policy_framework_addon: String,
    pub kube_rbac_proxy: String,
}

impl AddonImages {
    /// Load image overrides from the environment; unset variables stay empty
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            config_policy_controller: env_var_or_default_str("CONFIG_POLICY_CONTROLLER_IMAGE", ""),
            governance_policy_framework_addon: env_var_or_default_str(
                "GOVERNANCE_POLICY_FRAMEWORK_ADDON_IMAGE",
                "",
            ),
            kube_rbac_proxy: env_var_or_default_str("KUBE_RBAC_PROXY_IMAGE", ""),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            controller_namespace: DEFAULT_CONTROLLER_NAMESPACE.to_string(),
            metrics_port: DEFAULT_METRICS_PORT,
            reconcile_retry_min_secs: DEFAULT_RECONCILE_RETRY_MIN_SECS,
            reconcile_retry_max_secs: DEFAULT_RECONCILE_RETRY_MAX_SECS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            finalizer_addon_names: FINALIZER_ADDON_NAMES.iter().map(ToString::to_string).collect(),
            images: AddonImages::default(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            controller_namespace: env_var_or_default_str(
                "POD_NAMESPACE",
                &defaults.controller_namespace,
            ),
            metrics_port: env_var_or_default("METRICS_PORT", defaults.metrics_port),
            reconcile_retry_min_secs: env_var_or_default(
                "RECONCILE_RETRY_MIN_SECS",
                defaults.reconcile_retry_min_secs,
            ),
            reconcile_retry_max_secs: env_var_or_default(
                "RECONCILE_RETRY_MAX_SECS",
                defaults.reconcile_retry_max_secs,
            ),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                defaults.watch_restart_delay_secs,
            ),
            log_level: env_var_or_default_str("LOG_LEVEL", &defaults.log_level),
            log_format: env_var_or_default_str("LOG_FORMAT", &defaults.log_format),
            finalizer_addon_names: defaults.finalizer_addon_names,
            images: AddonImages::from_env(),
        }
    }

    /// Get watch restart delay duration
    #[must_use]
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    /// True when logs should be emitted as JSON
    #[must_use]
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
