//! # Dependency Watcher
//!
//! Watches arbitrary Kubernetes objects and calls a reconciler whenever an
//! object it depends on changes.
//!
//! A *watcher* is an [`ObjectIdentifier`] that receives reconcile calls. It is
//! registered together with the identifiers it depends on (its watched set),
//! which always includes the watcher itself so that creation and deletion of
//! the primary object are observed too.
//!
//! - [`DependencyWatcher`]: registration and synchronous cache reads, the seam
//!   reconcilers are written against
//! - [`Reconcile`]: implemented by each reconciler
//! - [`KubeDependencyWatcher`]: the kube-runtime backed implementation

pub mod backoff;
mod cache;
pub mod identifier;
mod kube_watcher;
mod queue;

pub use identifier::{ObjectIdentifier, SELECT_ALL};
pub use kube_watcher::{KubeDependencyWatcher, WatcherOptions};

use crate::error::{ReconcileError, WatchError};
use async_trait::async_trait;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use kube_runtime::controller::Action;

/// Result of a cache read
#[derive(Debug, Clone)]
pub enum CacheLookup {
    Found(DynamicObject),
    /// The object is not in the cache: either nothing watches it or it does not exist
    NotCached,
}

/// Watch registration and cache access
#[async_trait]
pub trait DependencyWatcher: Send + Sync {
    /// Register a new watcher. Fails with [`WatchError::WatcherExists`] if the key is taken.
    async fn add_watcher(
        &self,
        watcher: ObjectIdentifier,
        watched: Vec<ObjectIdentifier>,
    ) -> Result<(), WatchError>;

    /// Register a watcher or replace the watched set of an existing one
    async fn add_or_update_watcher(
        &self,
        watcher: ObjectIdentifier,
        watched: Vec<ObjectIdentifier>,
    ) -> Result<(), WatchError>;

    /// Read one object from the cache. Never blocks on the API server.
    fn get_from_cache(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
    ) -> Result<CacheLookup, WatchError>;

    /// Every cached object in the watched set of `watcher`, including the watcher itself
    fn list_watched_from_cache(
        &self,
        watcher: &ObjectIdentifier,
    ) -> Result<Vec<DynamicObject>, WatchError>;
}

/// A reconciler driven by a dependency watcher.
///
/// Calls for one watcher key are never concurrent. Implementations make a
/// single attempt and return; retries are the watcher's job.
#[async_trait]
pub trait Reconcile: Send + Sync {
    /// Short name used in logs and metric labels
    fn name(&self) -> &'static str;

    async fn reconcile(&self, watcher: &ObjectIdentifier) -> Result<Action, ReconcileError>;
}
