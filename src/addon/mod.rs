//! # Add-on Values
//!
//! Helm values handed to the policy add-on agents on each managed cluster.
//!
//! Values for one cluster are built in layers and deep-merged, later layers
//! winning:
//!
//! 1. values derived from cluster and add-on metadata (per agent)
//! 2. the user's JSON in the `addon.open-cluster-management.io/values` annotation
//! 3. mandated values that no user override may change
//!
//! The standalone templating agent only has the first layer.

pub mod common;
pub mod configpolicy;
pub mod lookup;
pub mod policyframework;
pub mod standalonetemplating;

pub use lookup::{ApiHubLookup, HubLookup};

use crate::config::AddonImages;
use crate::crd::{ManagedCluster, ManagedClusterAddOn};
use crate::error::ValuesError;
use std::fmt;
use std::str::FromStr;

/// Helm values as a JSON object
pub type Values = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddonKind {
    PolicyFramework,
    ConfigPolicy,
    StandaloneTemplating,
}

impl AddonKind {
    pub const ALL: [AddonKind; 3] = [
        AddonKind::PolicyFramework,
        AddonKind::ConfigPolicy,
        AddonKind::StandaloneTemplating,
    ];

    /// ManagedClusterAddOn name of the agent
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            AddonKind::PolicyFramework => policyframework::ADDON_NAME,
            AddonKind::ConfigPolicy => configpolicy::ADDON_NAME,
            AddonKind::StandaloneTemplating => standalonetemplating::ADDON_NAME,
        }
    }

    /// Compute the merged values for `addon` on `cluster`
    pub async fn values(
        self,
        cluster: &ManagedCluster,
        addon: &ManagedClusterAddOn,
        images: &AddonImages,
        hub: &dyn HubLookup,
    ) -> Result<Values, ValuesError> {
        let mut values = match self {
            AddonKind::PolicyFramework => policyframework::values(cluster, addon, images)?,
            AddonKind::ConfigPolicy => configpolicy::values(cluster, addon, images, hub).await?,
            AddonKind::StandaloneTemplating => return Ok(standalonetemplating::values(addon)),
        };
        common::merge_values(&mut values, common::values_from_addon_annotation(addon)?);
        common::merge_values(&mut values, common::mandate_values(cluster, addon));
        Ok(values)
    }
}

impl fmt::Display for AddonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AddonKind {
    type Err = ValuesError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        AddonKind::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| ValuesError::UnknownAddon(name.to_string()))
    }
}
