//! # Errors
//!
//! Error taxonomy shared by the dependency watcher, the dynamic client, the
//! reconcilers and values derivation.
//!
//! "Not cached" is not an error: cache lookups return
//! [`crate::depwatch::CacheLookup::NotCached`] instead.

use thiserror::Error;

/// Errors raised by a dependency watcher
#[derive(Debug, Error)]
pub enum WatchError {
    /// The watched resource type is not served by the cluster (CRD not installed).
    /// Callers may continue without the watch.
    #[error("no versioned resource found for {gvk}")]
    NoVersionedResource { gvk: String },

    /// `add_watcher` was called for a key that is already registered
    #[error("watcher {0} is already registered")]
    WatcherExists(String),

    /// A cache listing was requested for a key that was never registered
    #[error("watcher {0} is not registered")]
    UnknownWatcher(String),

    /// `run` was called a second time on the same watcher
    #[error("dependency watcher {0} is already running")]
    AlreadyStarted(String),

    /// The cache lock was poisoned by a panicking writer
    #[error("watch cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),
}

impl WatchError {
    /// True when the error only means the resource type is absent from the cluster
    #[must_use]
    pub fn is_no_versioned_resource(&self) -> bool {
        matches!(self, WatchError::NoVersionedResource { .. })
    }
}

/// Errors raised by the dynamic Kubernetes client
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("resource not found")]
    NotFound,

    #[error("resource already exists")]
    AlreadyExists,

    /// Write rejected because of a stale resource version or similar conflict
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("kubernetes error: {0}")]
    Kube(kube::Error),
}

impl ApiError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound)
    }

    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, ApiError::AlreadyExists)
    }
}

impl From<kube::Error> for ApiError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ref response) if response.code == 404 => ApiError::NotFound,
            kube::Error::Api(ref response)
                if response.code == 409 && response.reason == "AlreadyExists" =>
            {
                ApiError::AlreadyExists
            }
            kube::Error::Api(ref response) if response.code == 409 => {
                ApiError::Conflict(response.message.clone())
            }
            other => ApiError::Kube(other),
        }
    }
}

/// Errors returned from a reconcile; the dependency watcher retries on any of them
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("cache lookup failed: {0}")]
    Watch(#[from] WatchError),

    #[error("api request failed: {0}")]
    Api(#[from] ApiError),
}

/// Errors raised while deriving add-on Helm values
#[derive(Debug, Error)]
pub enum ValuesError {
    #[error("managed cluster {0} not found")]
    ClusterNotFound(String),

    #[error("invalid JSON in annotation {annotation}: {source}")]
    InvalidAnnotation {
        annotation: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown add-on {0}")]
    UnknownAddon(String),

    #[error("failed to serialize values: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("hub lookup failed: {0}")]
    Kube(#[from] kube::Error),
}
