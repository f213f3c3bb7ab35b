//! # Watch Cache
//!
//! Bookkeeping behind the dependency watcher: which watcher depends on which
//! watched identifiers, and one reflector [`Store`] per watched identifier.
//!
//! A watcher is only dispatched once every store in its watched set has
//! finished its initial list. Before that an empty store would read as
//! "object absent".

use super::{CacheLookup, ObjectIdentifier};
use crate::error::WatchError;
use kube::api::{ApiResource, DynamicObject};
use kube::core::GroupVersionKind;
use kube_runtime::reflector::store::Writer;
use kube_runtime::reflector::{ObjectRef, Store};
use std::collections::{HashMap, HashSet};
use std::fmt;

struct WatchedStore {
    resource: ApiResource,
    store: Store<DynamicObject>,
    /// Set once the first list has been applied to `store`
    synced: bool,
}

#[derive(Default)]
pub(crate) struct WatchCache {
    /// watcher -> watched identifiers (always including the watcher itself)
    watchers: HashMap<ObjectIdentifier, Vec<ObjectIdentifier>>,
    stores: HashMap<ObjectIdentifier, WatchedStore>,
}

impl fmt::Debug for WatchCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchCache")
            .field("watchers", &self.watchers.len())
            .field("stores", &self.stores.len())
            .finish()
    }
}

/// Build the watched set for `watcher`: itself first, then `watched` without duplicates
pub(crate) fn normalize_watched(
    watcher: &ObjectIdentifier,
    watched: Vec<ObjectIdentifier>,
) -> Vec<ObjectIdentifier> {
    let mut set = Vec::with_capacity(watched.len() + 1);
    set.push(watcher.clone());
    for id in watched {
        if !set.contains(&id) {
            set.push(id);
        }
    }
    set
}

/// (namespace, name) of an object
fn object_key(obj: &DynamicObject) -> (String, String) {
    (
        obj.metadata.namespace.clone().unwrap_or_default(),
        obj.metadata.name.clone().unwrap_or_default(),
    )
}

impl WatchCache {
    pub(crate) fn is_registered(&self, watcher: &ObjectIdentifier) -> bool {
        self.watchers.contains_key(watcher)
    }

    pub(crate) fn has_store(&self, id: &ObjectIdentifier) -> bool {
        self.stores.contains_key(id)
    }

    /// Create the store for `id`. Returns the writer feeding it, or `None`
    /// when `id` already has a store.
    pub(crate) fn add_store(
        &mut self,
        id: &ObjectIdentifier,
        resource: ApiResource,
    ) -> Option<Writer<DynamicObject>> {
        if self.stores.contains_key(id) {
            return None;
        }
        let writer = Writer::new(resource.clone());
        self.stores.insert(
            id.clone(),
            WatchedStore {
                resource,
                store: writer.as_reader(),
                synced: false,
            },
        );
        Some(writer)
    }

    /// Record that the initial list for `id` has been applied
    pub(crate) fn mark_synced(&mut self, id: &ObjectIdentifier) {
        if let Some(watched) = self.stores.get_mut(id) {
            watched.synced = true;
        }
    }

    /// True when every store in the watched set of `watcher` has synced
    pub(crate) fn is_synced(&self, watcher: &ObjectIdentifier) -> bool {
        self.watchers.get(watcher).is_some_and(|watched| {
            watched
                .iter()
                .all(|id| self.stores.get(id).is_some_and(|s| s.synced))
        })
    }

    /// Register or replace the watched set of `watcher`.
    /// `watched` must already be normalized.
    pub(crate) fn set_watcher(&mut self, watcher: ObjectIdentifier, watched: Vec<ObjectIdentifier>) {
        self.watchers.insert(watcher, watched);
    }

    /// Drop stores no watcher refers to any more and return their identifiers
    pub(crate) fn prune_unreferenced(&mut self) -> Vec<ObjectIdentifier> {
        let referenced: HashSet<&ObjectIdentifier> = self.watchers.values().flatten().collect();
        let stale: Vec<ObjectIdentifier> = self
            .stores
            .keys()
            .filter(|id| !referenced.contains(id))
            .cloned()
            .collect();
        for id in &stale {
            self.stores.remove(id);
        }
        stale
    }

    /// Synced watchers whose watched set contains `id`
    pub(crate) fn watchers_of(&self, id: &ObjectIdentifier) -> Vec<ObjectIdentifier> {
        let mut watchers: Vec<ObjectIdentifier> = self
            .watchers
            .iter()
            .filter(|(watcher, watched)| watched.contains(id) && self.is_synced(watcher))
            .map(|(watcher, _)| watcher.clone())
            .collect();
        watchers.sort();
        watchers
    }

    pub(crate) fn get(&self, gvk: &GroupVersionKind, namespace: &str, name: &str) -> CacheLookup {
        self.stores
            .iter()
            .filter(|(id, _)| id.matches_gvk(gvk))
            .find_map(|(_, watched)| {
                let mut key = ObjectRef::new_with(name, watched.resource.clone());
                if !namespace.is_empty() {
                    key = key.within(namespace);
                }
                watched.store.get(&key)
            })
            .map_or(CacheLookup::NotCached, |obj| {
                CacheLookup::Found(obj.as_ref().clone())
            })
    }

    /// Every cached object matched by the watched set of `watcher`, without duplicates
    pub(crate) fn list_watched(&self, watcher: &ObjectIdentifier) -> Result<Vec<DynamicObject>, WatchError> {
        let watched = self
            .watchers
            .get(watcher)
            .ok_or_else(|| WatchError::UnknownWatcher(watcher.to_string()))?;

        let mut seen = HashSet::new();
        let mut objects = Vec::new();
        for id in watched {
            let Some(cached) = self.stores.get(id) else {
                continue;
            };
            let mut state: Vec<DynamicObject> = cached
                .store
                .state()
                .iter()
                .map(|obj| obj.as_ref().clone())
                .collect();
            state.sort_by_key(object_key);
            for obj in state {
                if seen.insert((id.api_version(), id.kind.clone(), object_key(&obj))) {
                    objects.push(obj);
                }
            }
        }
        Ok(objects)
    }
}
