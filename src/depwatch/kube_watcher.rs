//! # Kubernetes Dependency Watcher
//!
//! [`DependencyWatcher`] backed by kube-runtime watch streams.
//!
//! Every distinct watched identifier gets one reflector stream writing into
//! its own store. Stream events queue every watcher that depends on the
//! changed identifier, but only once all of that watcher's stores have
//! completed their first list. [`KubeDependencyWatcher::run`] drains that queue one
//! key at a time and retries failed reconciles with a per-key Fibonacci
//! backoff.

use super::backoff::FibonacciBackoff;
use super::cache::{normalize_watched, WatchCache};
use super::queue::WorkQueue;
use super::{CacheLookup, DependencyWatcher, ObjectIdentifier, Reconcile};
use crate::config::ControllerConfig;
use crate::constants::{
    DEFAULT_RECONCILE_RETRY_MAX_SECS, DEFAULT_RECONCILE_RETRY_MIN_SECS,
    DEFAULT_WATCH_RESTART_DELAY_SECS,
};
use crate::error::WatchError;
use crate::observability::metrics;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use kube::api::{Api, ApiResource, DynamicObject};
use kube::core::GroupVersionKind;
use kube::Client;
use kube_runtime::reflector::{reflector, store::Writer};
use kube_runtime::watcher;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// Retry and restart timing for a dependency watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherOptions {
    pub retry_min_secs: u64,
    pub retry_max_secs: u64,
    pub restart_delay: Duration,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            retry_min_secs: DEFAULT_RECONCILE_RETRY_MIN_SECS,
            retry_max_secs: DEFAULT_RECONCILE_RETRY_MAX_SECS,
            restart_delay: Duration::from_secs(DEFAULT_WATCH_RESTART_DELAY_SECS),
        }
    }
}

impl From<&ControllerConfig> for WatcherOptions {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            retry_min_secs: config.reconcile_retry_min_secs,
            retry_max_secs: config.reconcile_retry_max_secs,
            restart_delay: config.watch_restart_delay_duration(),
        }
    }
}

pub struct KubeDependencyWatcher {
    name: &'static str,
    client: Client,
    options: WatcherOptions,
    cache: Arc<RwLock<WatchCache>>,
    streams: Mutex<HashMap<ObjectIdentifier, JoinHandle<()>>>,
    queue: WorkQueue,
    /// Taken by the dispatch loop on start
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<ObjectIdentifier>>>,
    started: watch::Sender<bool>,
}

impl fmt::Debug for KubeDependencyWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeDependencyWatcher")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}

impl KubeDependencyWatcher {
    #[must_use]
    pub fn new(name: &'static str, client: Client, options: WatcherOptions) -> Self {
        let (queue, queue_rx) = WorkQueue::new();
        let (started, _) = watch::channel(false);
        Self {
            name,
            client,
            options,
            cache: Arc::new(RwLock::new(WatchCache::default())),
            streams: Mutex::new(HashMap::new()),
            queue,
            queue_rx: Mutex::new(Some(queue_rx)),
            started,
        }
    }

    /// Resolves once [`run`](Self::run) has started dispatching
    pub async fn started(&self) {
        let mut rx = self.started.subscribe();
        if rx.wait_for(|started| *started).await.is_err() {
            warn!(watcher = self.name, "started signal dropped");
        }
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        *self.started.borrow()
    }

    /// Dispatch queued watcher keys to `reconciler` until `shutdown` resolves.
    ///
    /// Can only be called once per watcher.
    pub async fn run<F>(&self, reconciler: Arc<dyn Reconcile>, shutdown: F) -> Result<(), WatchError>
    where
        F: Future<Output = ()> + Send,
    {
        let mut rx = self
            .queue_rx
            .lock()
            .map_err(|e| WatchError::CacheUnavailable(e.to_string()))?
            .take()
            .ok_or_else(|| WatchError::AlreadyStarted(self.name.to_string()))?;

        let mut backoffs: HashMap<ObjectIdentifier, FibonacciBackoff> = HashMap::new();
        tokio::pin!(shutdown);

        self.started.send_replace(true);
        info!(watcher = self.name, reconciler = reconciler.name(), "dependency watcher started");

        loop {
            let key = tokio::select! {
                () = &mut shutdown => break,
                next = rx.recv() => match next {
                    Some(key) => key,
                    None => break,
                },
            };
            self.queue.done(&key);

            let span = tracing::info_span!("reconcile", reconciler = reconciler.name(), watcher = %key);
            let start = Instant::now();
            let result = reconciler.reconcile(&key).instrument(span).await;
            metrics::observe_reconciliation(
                reconciler.name(),
                start.elapsed().as_secs_f64(),
                result.is_ok(),
            );

            match result {
                Ok(action) => {
                    debug!(watcher = %key, action = ?action, "reconciled");
                    if let Some(backoff) = backoffs.get_mut(&key) {
                        backoff.reset();
                    }
                }
                Err(err) => {
                    let delay = backoffs
                        .entry(key.clone())
                        .or_insert_with(|| {
                            FibonacciBackoff::new(self.options.retry_min_secs, self.options.retry_max_secs)
                        })
                        .next_backoff();
                    error!(
                        reconciler = reconciler.name(),
                        watcher = %key,
                        error = %err,
                        retry_in_secs = delay.as_secs(),
                        "reconcile failed"
                    );
                    let queue = self.queue.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        queue.push(key);
                    });
                }
            }
        }

        info!(watcher = self.name, "dependency watcher stopping");
        self.abort_all_streams();
        Ok(())
    }

    fn read_cache(&self) -> Result<RwLockReadGuard<'_, WatchCache>, WatchError> {
        self.cache
            .read()
            .map_err(|e| WatchError::CacheUnavailable(e.to_string()))
    }

    fn write_cache(&self) -> Result<RwLockWriteGuard<'_, WatchCache>, WatchError> {
        self.cache
            .write()
            .map_err(|e| WatchError::CacheUnavailable(e.to_string()))
    }

    async fn register(
        &self,
        watcher: ObjectIdentifier,
        watched: Vec<ObjectIdentifier>,
        replace: bool,
    ) -> Result<(), WatchError> {
        let watched = normalize_watched(&watcher, watched);

        let registered = self.read_cache()?.is_registered(&watcher);
        if registered && !replace {
            return Err(WatchError::WatcherExists(watcher.to_string()));
        }

        // Resolve every new resource type before touching any state so a
        // missing CRD leaves the watcher unregistered.
        let mut resolved = Vec::new();
        for id in &watched {
            let known = self.read_cache()?.has_store(id);
            if !known {
                resolved.push((id.clone(), self.resolve(id).await?));
            }
        }

        let synced = {
            let mut cache = self.write_cache()?;
            cache.set_watcher(watcher.clone(), watched);
            for (id, resource) in resolved {
                if let Some(writer) = cache.add_store(&id, resource.clone()) {
                    self.spawn_stream(id, &resource, writer);
                }
            }
            for id in cache.prune_unreferenced() {
                self.abort_stream(&id);
            }
            cache.is_synced(&watcher)
        };

        info!(watcher = %watcher, streams = self.stream_count(), "registered watcher");
        if synced {
            self.queue.push(watcher);
        } else {
            debug!(watcher = %watcher, "waiting for initial list of watched resources");
        }
        Ok(())
    }

    async fn resolve(&self, id: &ObjectIdentifier) -> Result<ApiResource, WatchError> {
        let gvk = id.gvk();
        match kube::discovery::pinned_kind(&self.client, &gvk).await {
            Ok((resource, _capabilities)) => Ok(resource),
            Err(kube::Error::Discovery(_)) => Err(no_versioned_resource(id)),
            Err(kube::Error::Api(response)) if response.code == 404 => Err(no_versioned_resource(id)),
            Err(err) => Err(err.into()),
        }
    }

    /// Start the watch stream feeding `writer`. Called with the cache write
    /// lock held so stores and streams change together.
    fn spawn_stream(&self, id: ObjectIdentifier, resource: &ApiResource, writer: Writer<DynamicObject>) {
        let api: Api<DynamicObject> = if id.namespace.is_empty() {
            Api::all_with(self.client.clone(), resource)
        } else {
            Api::namespaced_with(self.client.clone(), &id.namespace, resource)
        };
        let task = tokio::spawn(watch_resource(
            id.clone(),
            reflector(writer, watcher(api, watch_config(&id))),
            Arc::clone(&self.cache),
            self.queue.clone(),
            self.options.restart_delay,
        ));

        let mut streams = match self.streams.lock() {
            Ok(streams) => streams,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = streams.insert(id, task) {
            previous.abort();
        }
    }

    fn abort_stream(&self, id: &ObjectIdentifier) {
        let mut streams = match self.streams.lock() {
            Ok(streams) => streams,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(task) = streams.remove(id) {
            debug!(watched = %id, "stopping unreferenced watch");
            task.abort();
        }
    }

    fn abort_all_streams(&self) {
        let mut streams = match self.streams.lock() {
            Ok(streams) => streams,
            Err(poisoned) => poisoned.into_inner(),
        };
        for (_, task) in streams.drain() {
            task.abort();
        }
    }

    fn stream_count(&self) -> usize {
        match self.streams.lock() {
            Ok(streams) => streams.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

impl Drop for KubeDependencyWatcher {
    fn drop(&mut self) {
        self.abort_all_streams();
    }
}

#[async_trait]
impl DependencyWatcher for KubeDependencyWatcher {
    async fn add_watcher(
        &self,
        watcher: ObjectIdentifier,
        watched: Vec<ObjectIdentifier>,
    ) -> Result<(), WatchError> {
        self.register(watcher, watched, false).await
    }

    async fn add_or_update_watcher(
        &self,
        watcher: ObjectIdentifier,
        watched: Vec<ObjectIdentifier>,
    ) -> Result<(), WatchError> {
        self.register(watcher, watched, true).await
    }

    fn get_from_cache(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
    ) -> Result<CacheLookup, WatchError> {
        Ok(self.read_cache()?.get(gvk, namespace, name))
    }

    fn list_watched_from_cache(
        &self,
        watcher: &ObjectIdentifier,
    ) -> Result<Vec<DynamicObject>, WatchError> {
        self.read_cache()?.list_watched(watcher)
    }
}

fn no_versioned_resource(id: &ObjectIdentifier) -> WatchError {
    WatchError::NoVersionedResource {
        gvk: format!("{}, Kind={}", id.api_version(), id.kind),
    }
}

/// List/watch parameters for one watched identifier
pub(crate) fn watch_config(id: &ObjectIdentifier) -> watcher::Config {
    let mut config = watcher::Config::default();
    if !id.name.is_empty() {
        config = config.fields(&format!("metadata.name={}", id.name));
    }
    if let Some(selector) = id.selector.as_deref().filter(|s| !s.is_empty()) {
        config = config.labels(selector);
    }
    config
}

/// Drive one reflector stream. The store is written by the reflector itself;
/// this loop only tracks the initial sync and queues dependent watchers.
async fn watch_resource<S>(
    id: ObjectIdentifier,
    stream: S,
    cache: Arc<RwLock<WatchCache>>,
    queue: WorkQueue,
    restart_delay: Duration,
) where
    S: Stream<Item = watcher::Result<watcher::Event<DynamicObject>>> + Send,
{
    info!(watched = %id, "starting watch");
    let mut stream = std::pin::pin!(stream);

    while let Some(event) = stream.next().await {
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                warn!(
                    watched = %id,
                    error = %err,
                    "watch stream error, retrying in {}s",
                    restart_delay.as_secs()
                );
                tokio::time::sleep(restart_delay).await;
                continue;
            }
        };
        metrics::increment_watch_events(&id.kind);

        match event {
            watcher::Event::Init | watcher::Event::InitApply(_) => {}
            watcher::Event::InitDone => queue_dependents(&cache, &queue, &id, true),
            watcher::Event::Apply(_) | watcher::Event::Delete(_) => {
                queue_dependents(&cache, &queue, &id, false);
            }
        }
    }

    warn!(watched = %id, "watch stream ended");
}

/// Queue every synced watcher that depends on `id`
fn queue_dependents(cache: &RwLock<WatchCache>, queue: &WorkQueue, id: &ObjectIdentifier, listed: bool) {
    let watchers = {
        let mut cache = match cache.write() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };
        if listed {
            cache.mark_synced(id);
        }
        cache.watchers_of(id)
    };
    for watcher in watchers {
        debug!(watched = %id, watcher = %watcher, "queueing reconcile");
        queue.push(watcher);
    }
}
