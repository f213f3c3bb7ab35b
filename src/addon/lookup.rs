//! Hub reads needed while deriving values.

use crate::crd::{ManagedCluster, ManagedClusterAddOn};
use async_trait::async_trait;
use kube::{Api, Client};

#[async_trait]
pub trait HubLookup: Send + Sync {
    async fn managed_cluster(&self, name: &str) -> Result<Option<ManagedCluster>, kube::Error>;

    async fn managed_cluster_addon(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ManagedClusterAddOn>, kube::Error>;
}

/// [`HubLookup`] against the hub API server
#[derive(Clone)]
pub struct ApiHubLookup {
    client: Client,
}

impl std::fmt::Debug for ApiHubLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiHubLookup").finish_non_exhaustive()
    }
}

impl ApiHubLookup {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HubLookup for ApiHubLookup {
    async fn managed_cluster(&self, name: &str) -> Result<Option<ManagedCluster>, kube::Error> {
        Api::<ManagedCluster>::all(self.client.clone())
            .get_opt(name)
            .await
    }

    async fn managed_cluster_addon(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ManagedClusterAddOn>, kube::Error> {
        Api::<ManagedClusterAddOn>::namespaced(self.client.clone(), namespace)
            .get_opt(name)
            .await
    }
}
