//! # Open Cluster Management Resources
//!
//! Typed views of the cluster-management resources the add-on values are
//! derived from. The controller only reads these; they are owned and
//! installed by the cluster manager.
//!
//! - `managedcluster.rs` - cluster-scoped `ManagedCluster`
//! - `managedclusteraddon.rs` - namespaced `ManagedClusterAddOn`

mod managedcluster;
mod managedclusteraddon;

pub use managedcluster::{
    ManagedCluster, ManagedClusterClaim, ManagedClusterSpec, ManagedClusterStatus,
    ManagedClusterVersion,
};
pub use managedclusteraddon::{ManagedClusterAddOn, ManagedClusterAddOnSpec};
