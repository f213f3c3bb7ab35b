//! # Dynamic Client
//!
//! Untyped create/update/delete for arbitrary resource types. The
//! reconcilers only ever touch resources through this trait so tests can
//! substitute a recording fake.

use crate::error::ApiError;
use async_trait::async_trait;
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, PostParams};
use kube::Client;
use tracing::debug;

#[async_trait]
pub trait DynamicClient: Send + Sync {
    /// Create `obj`. Fails with [`ApiError::AlreadyExists`] if the name is taken.
    async fn create(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, ApiError>;

    /// Replace `obj`. The object's resourceVersion is used for optimistic concurrency.
    async fn update(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, ApiError>;

    /// Delete by name. Fails with [`ApiError::NotFound`] if nothing is there.
    async fn delete(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), ApiError>;
}

/// [`DynamicClient`] talking to the API server
#[derive(Clone)]
pub struct KubeDynamicClient {
    client: Client,
}

impl std::fmt::Debug for KubeDynamicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeDynamicClient").finish_non_exhaustive()
    }
}

impl KubeDynamicClient {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, resource: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) if !ns.is_empty() => Api::namespaced_with(self.client.clone(), ns, resource),
            _ => Api::all_with(self.client.clone(), resource),
        }
    }
}

fn object_name(obj: &DynamicObject) -> &str {
    obj.metadata.name.as_deref().unwrap_or_default()
}

#[async_trait]
impl DynamicClient for KubeDynamicClient {
    async fn create(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, ApiError> {
        debug!(kind = %resource.kind, name = object_name(obj), "creating object");
        Ok(self
            .api(resource, namespace)
            .create(&PostParams::default(), obj)
            .await?)
    }

    async fn update(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, ApiError> {
        debug!(kind = %resource.kind, name = object_name(obj), "updating object");
        Ok(self
            .api(resource, namespace)
            .replace(object_name(obj), &PostParams::default(), obj)
            .await?)
    }

    async fn delete(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), ApiError> {
        debug!(kind = %resource.kind, name, "deleting object");
        self.api(resource, namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }
}
