//! # Governance Policy Addon Controller
//!
//! Hub-side controller for the Open Cluster Management governance add-ons.
//!
//! ## Overview
//!
//! 1. **Add-on values** - Derives the Helm values of the governance-policy-framework,
//!    config-policy-controller and standalone templating agents for each managed cluster
//! 2. **Cleanup finalizer** - Holds a finalizer on the `InternalHubComponent` named
//!    `grc` while any policy add-on is still deployed
//! 3. **Compliance API Route** - Exposes the compliance history API through an
//!    OpenShift Route while its database secret exists
//!
//! See `cli` for the command surface.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    governance_policy_addon_controller::cli::run().await
}
