//! # Work Queue
//!
//! De-duplicating queue of watcher keys waiting for a reconcile. A key that is
//! already waiting is not queued a second time; once the dispatch loop takes a
//! key it can be queued again, so changes seen mid-reconcile are not lost.

use super::ObjectIdentifier;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Clone)]
pub(crate) struct WorkQueue {
    tx: mpsc::UnboundedSender<ObjectIdentifier>,
    pending: Arc<Mutex<HashSet<ObjectIdentifier>>>,
}

impl WorkQueue {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<ObjectIdentifier>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                pending: Arc::new(Mutex::new(HashSet::new())),
            },
            rx,
        )
    }

    /// Queue `key` unless it is already waiting
    pub(crate) fn push(&self, key: ObjectIdentifier) {
        let mut pending = match self.pending.lock() {
            Ok(pending) => pending,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !pending.insert(key.clone()) {
            return;
        }
        if let Err(e) = self.tx.send(key) {
            pending.remove(&e.0);
            warn!(watcher = %e.0, "dispatch loop is gone, dropping reconcile request");
        }
    }

    /// Mark `key` as taken by the dispatch loop
    pub(crate) fn done(&self, key: &ObjectIdentifier) {
        let mut pending = match self.pending.lock() {
            Ok(pending) => pending,
            Err(poisoned) => poisoned.into_inner(),
        };
        pending.remove(key);
    }
}
