//! Per-resource locks with deferred callbacks.
//!
//! A job takes the lock of the playlist (or rundown, or studio) it mutates
//! before loading anything, and holds it until its writes are done.
//! Waiters queue in FIFO order. Work that must only happen once the lock is
//! free, such as publishing events, is queued on the lock with
//! [`ResourceLock::defer`] and runs from [`ResourceLock::release`].

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;
use rundown_core::ids::{RundownId, RundownPlaylistId, StudioId};
use tokio::sync::{Mutex, OwnedMutexGuard};

pub type DeferredFn = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// Hands out one mutex per resource key.
#[derive(Default)]
pub struct LockManager {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock_playlist(&self, id: &RundownPlaylistId) -> PlaylistLock {
        self.acquire(id.clone(), "playlist").await
    }

    pub async fn lock_rundown(&self, id: &RundownId) -> RundownLock {
        self.acquire(id.clone(), "rundown").await
    }

    pub async fn lock_studio(&self, id: &StudioId) -> StudioLock {
        self.acquire(id.clone(), "studio").await
    }

    async fn acquire<Id: fmt::Display>(&self, id: Id, kind: &'static str) -> ResourceLock<Id> {
        let key = format!("{kind}:{id}");
        let mutex = {
            let mut locks = self.locks.lock().await;
            // Nobody holds or waits for an entry whose only owner is the map.
            locks.retain(|k, m| k == &key || Arc::strong_count(m) > 1);
            locks.entry(key.clone()).or_default().clone()
        };

        let guard = mutex.lock_owned().await;
        tracing::debug!(resource = %key, "Lock acquired");
        ResourceLock {
            id,
            key,
            guard: Some(guard),
            deferred: Vec::new(),
            _kind: PhantomData,
        }
    }
}

/// A held lock. Dropping it without [`release`](Self::release) frees the
/// resource and discards the deferred callbacks.
pub struct ResourceLock<Id> {
    id: Id,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
    deferred: Vec<DeferredFn>,
    _kind: PhantomData<fn() -> Id>,
}

pub type PlaylistLock = ResourceLock<RundownPlaylistId>;
pub type RundownLock = ResourceLock<RundownId>;
pub type StudioLock = ResourceLock<StudioId>;

impl<Id> ResourceLock<Id> {
    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn is_locked(&self) -> bool {
        self.guard.is_some()
    }

    /// Run `f` after the lock is released, after every callback deferred
    /// before it.
    pub fn defer<F, Fut>(&mut self, f: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.deferred.push(Box::new(move || Box::pin(f())));
    }

    /// Free the resource, then run the deferred callbacks in order. A
    /// failing callback is logged and does not stop the rest.
    pub async fn release(mut self) {
        self.guard.take();
        tracing::debug!(resource = %self.key, "Lock released");

        for (index, callback) in std::mem::take(&mut self.deferred).into_iter().enumerate() {
            if let Err(e) = callback().await {
                tracing::warn!(resource = %self.key, index, error = %e, "Deferred callback failed");
            }
        }
    }
}

impl<Id> Drop for ResourceLock<Id> {
    fn drop(&mut self) {
        if !self.deferred.is_empty() {
            tracing::warn!(
                resource = %self.key,
                count = self.deferred.len(),
                "Lock dropped without release, discarding deferred callbacks"
            );
        }
    }
}
