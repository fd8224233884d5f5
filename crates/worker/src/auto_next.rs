//! Timers that take the next part when an autonext part runs out.

use std::collections::HashMap;
use std::future::Future;

use rundown_core::ids::RundownPlaylistId;
use rundown_core::types::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// At most one pending timer per playlist; scheduling replaces it.
#[derive(Default)]
pub struct AutoNextScheduler {
    timers: Mutex<HashMap<RundownPlaylistId, JoinHandle<()>>>,
}

impl AutoNextScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fire` after `delay_ms`. The fired work runs on its own task so
    /// that it may reschedule this playlist.
    pub async fn schedule<F, Fut>(&self, playlist_id: &RundownPlaylistId, delay_ms: Duration, fire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = std::time::Duration::from_millis(delay_ms.max(0) as u64);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(fire());
        });
        if let Some(previous) = self.timers.lock().await.insert(playlist_id.clone(), handle) {
            previous.abort();
        }
        tracing::debug!(playlist_id = %playlist_id, delay_ms, "Scheduled autonext");
    }

    pub async fn cancel(&self, playlist_id: &RundownPlaylistId) {
        if let Some(handle) = self.timers.lock().await.remove(playlist_id) {
            if !handle.is_finished() {
                tracing::debug!(playlist_id = %playlist_id, "Cancelled autonext");
            }
            handle.abort();
        }
    }

    /// Whether a timer is waiting to fire.
    pub async fn is_pending(&self, playlist_id: &RundownPlaylistId) -> bool {
        self.timers
            .lock()
            .await
            .get(playlist_id)
            .is_some_and(|handle| !handle.is_finished())
    }

    pub async fn shutdown(&self) {
        for (_, handle) in self.timers.lock().await.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    type Fire = std::pin::Pin<Box<dyn Future<Output = ()> + Send>>;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Fire + Clone + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let fire = move || {
            let c = c.clone();
            Box::pin(async move {
                c.fetch_add(1, Ordering::SeqCst);
            }) as Fire
        };
        (count, fire)
    }

    // -- schedule --

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let scheduler = AutoNextScheduler::new();
        let (count, fire) = counter();
        scheduler.schedule(&"pl".into(), 5_000, fire).await;

        tokio::time::sleep(std::time::Duration::from_millis(4_999)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(scheduler.is_pending(&"pl".into()).await);

        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_pending_timer() {
        let scheduler = AutoNextScheduler::new();
        let (count, fire) = counter();
        let id: RundownPlaylistId = "pl".into();
        scheduler.schedule(&id, 1_000, fire.clone()).await;
        scheduler.schedule(&id, 3_000, fire).await;

        tokio::time::sleep(std::time::Duration::from_millis(2_000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        tokio::time::sleep(std::time::Duration::from_millis(1_100)).await;
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    // -- cancel --

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let scheduler = AutoNextScheduler::new();
        let (count, fire) = counter();
        let id: RundownPlaylistId = "pl".into();
        scheduler.schedule(&id, 1_000, fire).await;
        scheduler.cancel(&id).await;

        tokio::time::sleep(std::time::Duration::from_millis(5_000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!scheduler.is_pending(&id).await);
    }
}
