//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! Names and groups here are part of the contract with the rest of the
//! Open Cluster Management hub and must not drift from the deployed CRDs.

/// Default namespace of the controller (and of the `grc` InternalHubComponent)
pub const DEFAULT_CONTROLLER_NAMESPACE: &str = "open-cluster-management";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8383;

/// Default first retry delay after a failed reconcile (seconds)
pub const DEFAULT_RECONCILE_RETRY_MIN_SECS: u64 = 1;

/// Default retry delay cap after repeated reconcile failures (seconds)
pub const DEFAULT_RECONCILE_RETRY_MAX_SECS: u64 = 60;

/// Default delay before restarting a watch stream after an error (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Finalizer kept on the `grc` InternalHubComponent while policy add-ons exist
pub const POLICY_FINALIZER: &str = "policy.open-cluster-management.io/mcao-cleanup";

/// Group of the InternalHubComponent resource
pub const IHC_GROUP: &str = "operator.open-cluster-management.io";
/// Version of the InternalHubComponent resource
pub const IHC_VERSION: &str = "v1";
/// Kind of the InternalHubComponent resource
pub const IHC_KIND: &str = "InternalHubComponent";
/// Plural of the InternalHubComponent resource
pub const IHC_PLURAL: &str = "internalhubcomponents";
/// Name of the governance InternalHubComponent
pub const IHC_NAME: &str = "grc";

/// Group of ManagedClusterAddOn resources
pub const ADDON_GROUP: &str = "addon.open-cluster-management.io";
/// Version of ManagedClusterAddOn resources
pub const ADDON_VERSION: &str = "v1alpha1";
/// Kind of ManagedClusterAddOn resources
pub const ADDON_KIND: &str = "ManagedClusterAddOn";

/// Add-ons whose presence anywhere keeps the `grc` finalizer in place
pub const FINALIZER_ADDON_NAMES: [&str; 2] = ["config-policy-controller", "governance-policy-framework"];

/// Service backing the compliance history API
pub const COMPLIANCE_SERVICE_NAME: &str = "governance-policy-compliance-history-api";
/// Route exposing the compliance history API.
/// Kept short: DNS labels are limited to 63 characters.
pub const COMPLIANCE_ROUTE_NAME: &str = "governance-history-api";
/// Secret holding the compliance database connection
pub const COMPLIANCE_DB_SECRET_NAME: &str = "governance-policy-database";
/// Named Service port the Route targets
pub const COMPLIANCE_ROUTE_TARGET_PORT: &str = "compliance-history-api";

/// Group of OpenShift Route resources
pub const ROUTE_GROUP: &str = "route.openshift.io";
/// Version of OpenShift Route resources
pub const ROUTE_VERSION: &str = "v1";
/// Kind of OpenShift Route resources
pub const ROUTE_KIND: &str = "Route";
/// Plural of OpenShift Route resources
pub const ROUTE_PLURAL: &str = "routes";
