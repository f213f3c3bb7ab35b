//! Common test utilities for the reconciler integration tests
//!
//! In-memory stand-ins for the dependency watcher and the dynamic client so
//! reconcilers can be driven without an API server.

#![allow(dead_code)]

use async_trait::async_trait;
use governance_policy_addon_controller::client::DynamicClient;
use governance_policy_addon_controller::constants::{
    ADDON_GROUP, ADDON_KIND, ADDON_VERSION, COMPLIANCE_DB_SECRET_NAME, IHC_NAME,
};
use governance_policy_addon_controller::controllers::componentfinalizer::ihc_resource;
use governance_policy_addon_controller::depwatch::{
    CacheLookup, DependencyWatcher, ObjectIdentifier,
};
use governance_policy_addon_controller::error::{ApiError, WatchError};
use kube::api::{ApiResource, DynamicObject};
use kube::core::GroupVersionKind;
use kube::ResourceExt;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub const NAMESPACE: &str = "open-cluster-management";

pub fn addon_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk(ADDON_GROUP, ADDON_VERSION, ADDON_KIND)
}

pub fn secret_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk("", "v1", "Secret")
}

/// The `grc` InternalHubComponent carrying `finalizers`
pub fn ihc(namespace: &str, finalizers: &[&str]) -> DynamicObject {
    let mut obj = DynamicObject::new(IHC_NAME, &ihc_resource()).within(namespace);
    if !finalizers.is_empty() {
        obj.metadata.finalizers = Some(finalizers.iter().map(|f| (*f).to_string()).collect());
    }
    obj.metadata.resource_version = Some("1".to_string());
    obj
}

pub fn addon(namespace: &str, name: &str) -> DynamicObject {
    let resource = ApiResource::from_gvk_with_plural(&addon_gvk(), "managedclusteraddons");
    DynamicObject::new(name, &resource).within(namespace)
}

pub fn db_secret(namespace: &str) -> DynamicObject {
    DynamicObject::new(COMPLIANCE_DB_SECRET_NAME, &ApiResource::erase::<
        k8s_openapi::api::core::v1::Secret,
    >(&()))
    .within(namespace)
}

fn matches(id: &ObjectIdentifier, gvk: &GroupVersionKind, obj: &DynamicObject) -> bool {
    id.matches_gvk(gvk)
        && (id.namespace.is_empty() || obj.namespace().as_deref() == Some(id.namespace.as_str()))
        && (id.name.is_empty() || obj.name_any() == id.name)
}

/// [`DependencyWatcher`] over a fixed set of objects
#[derive(Default)]
pub struct FakeWatcher {
    objects: Mutex<Vec<(GroupVersionKind, DynamicObject)>>,
    watchers: Mutex<BTreeMap<ObjectIdentifier, Vec<ObjectIdentifier>>>,
    registrations: Mutex<Vec<(ObjectIdentifier, Vec<ObjectIdentifier>)>>,
    fail_reads: AtomicBool,
    register_error: Mutex<Option<WatchError>>,
}

impl FakeWatcher {
    /// Insert or replace an object, as a watch event would
    pub fn put(&self, gvk: GroupVersionKind, obj: DynamicObject) {
        let mut objects = self.objects.lock().unwrap();
        objects.retain(|(g, o)| {
            !(g == &gvk && o.namespace() == obj.namespace() && o.name_any() == obj.name_any())
        });
        objects.push((gvk, obj));
    }

    pub fn remove(&self, gvk: &GroupVersionKind, namespace: &str, name: &str) {
        self.objects.lock().unwrap().retain(|(g, o)| {
            !(g == gvk && o.namespace().as_deref() == Some(namespace) && o.name_any() == name)
        });
    }

    /// Make every cache read fail with [`WatchError::CacheUnavailable`]
    pub fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    /// Fail the next registration with `err`
    pub fn fail_next_registration(&self, err: WatchError) {
        *self.register_error.lock().unwrap() = Some(err);
    }

    pub fn registrations(&self) -> Vec<(ObjectIdentifier, Vec<ObjectIdentifier>)> {
        self.registrations.lock().unwrap().clone()
    }

    fn check_reads(&self) -> Result<(), WatchError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(WatchError::CacheUnavailable("injected".to_string()));
        }
        Ok(())
    }

    fn register(
        &self,
        watcher: ObjectIdentifier,
        watched: Vec<ObjectIdentifier>,
        replace: bool,
    ) -> Result<(), WatchError> {
        if let Some(err) = self.register_error.lock().unwrap().take() {
            return Err(err);
        }
        let mut watchers = self.watchers.lock().unwrap();
        if !replace && watchers.contains_key(&watcher) {
            return Err(WatchError::WatcherExists(watcher.to_string()));
        }
        self.registrations
            .lock()
            .unwrap()
            .push((watcher.clone(), watched.clone()));
        watchers.insert(watcher, watched);
        Ok(())
    }
}

#[async_trait]
impl DependencyWatcher for FakeWatcher {
    async fn add_watcher(
        &self,
        watcher: ObjectIdentifier,
        watched: Vec<ObjectIdentifier>,
    ) -> Result<(), WatchError> {
        self.register(watcher, watched, false)
    }

    async fn add_or_update_watcher(
        &self,
        watcher: ObjectIdentifier,
        watched: Vec<ObjectIdentifier>,
    ) -> Result<(), WatchError> {
        self.register(watcher, watched, true)
    }

    fn get_from_cache(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
    ) -> Result<CacheLookup, WatchError> {
        self.check_reads()?;
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .iter()
            .find(|(g, o)| {
                g == gvk && o.namespace().unwrap_or_default() == namespace && o.name_any() == name
            })
            .map_or(CacheLookup::NotCached, |(_, o)| CacheLookup::Found(o.clone())))
    }

    fn list_watched_from_cache(
        &self,
        watcher: &ObjectIdentifier,
    ) -> Result<Vec<DynamicObject>, WatchError> {
        self.check_reads()?;
        let watchers = self.watchers.lock().unwrap();
        let watched = watchers
            .get(watcher)
            .ok_or_else(|| WatchError::UnknownWatcher(watcher.to_string()))?;
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .iter()
            .filter(|(gvk, obj)| watched.iter().any(|id| matches(id, gvk, obj)))
            .map(|(_, obj)| obj.clone())
            .collect())
    }
}

/// A write made through [`FakeClient`]
#[derive(Debug, Clone)]
pub enum Call {
    Create(DynamicObject),
    Update(DynamicObject),
    Delete { namespace: String, name: String },
}

/// [`DynamicClient`] that records writes and tracks which objects exist
#[derive(Default)]
pub struct FakeClient {
    calls: Mutex<Vec<Call>>,
    existing: Mutex<HashSet<(String, String, String)>>,
    next_error: Mutex<Option<ApiError>>,
}

impl FakeClient {
    /// Mark `kind` `namespace/name` as present on the API server
    pub fn insert(&self, kind: &str, namespace: &str, name: &str) {
        self.existing
            .lock()
            .unwrap()
            .insert((kind.to_string(), namespace.to_string(), name.to_string()));
    }

    /// Remove an object behind the controller's back
    pub fn remove(&self, kind: &str, namespace: &str, name: &str) {
        self.existing
            .lock()
            .unwrap()
            .remove(&(kind.to_string(), namespace.to_string(), name.to_string()));
    }

    pub fn exists(&self, kind: &str, namespace: &str, name: &str) -> bool {
        self.existing
            .lock()
            .unwrap()
            .contains(&(kind.to_string(), namespace.to_string(), name.to_string()))
    }

    /// Fail the next call with `err`
    pub fn fail_next(&self, err: ApiError) {
        *self.next_error.lock().unwrap() = Some(err);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<DynamicObject> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Update(obj) => Some(obj),
                _ => None,
            })
            .collect()
    }

    fn key(resource: &ApiResource, namespace: Option<&str>, name: &str) -> (String, String, String) {
        (
            resource.kind.clone(),
            namespace.unwrap_or_default().to_string(),
            name.to_string(),
        )
    }

    fn injected(&self) -> Result<(), ApiError> {
        match self.next_error.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DynamicClient for FakeClient {
    async fn create(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, ApiError> {
        self.calls.lock().unwrap().push(Call::Create(obj.clone()));
        self.injected()?;
        let key = Self::key(resource, namespace, &obj.name_any());
        if !self.existing.lock().unwrap().insert(key) {
            return Err(ApiError::AlreadyExists);
        }
        Ok(obj.clone())
    }

    async fn update(
        &self,
        _resource: &ApiResource,
        _namespace: Option<&str>,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, ApiError> {
        self.calls.lock().unwrap().push(Call::Update(obj.clone()));
        self.injected()?;
        Ok(obj.clone())
    }

    async fn delete(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(Call::Delete {
            namespace: namespace.unwrap_or_default().to_string(),
            name: name.to_string(),
        });
        self.injected()?;
        if !self
            .existing
            .lock()
            .unwrap()
            .remove(&Self::key(resource, namespace, name))
        {
            return Err(ApiError::NotFound);
        }
        Ok(())
    }
}
