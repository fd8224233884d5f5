//! The job worker: the entry point callers submit work through.
//!
//! Playout jobs are queued per playlist and ingest jobs per rundown, so
//! work on one resource runs in submission order while different
//! resources proceed in parallel. Each playout job ends by rescheduling
//! or cancelling the autonext timer of its playlist, still on its lane.

use std::sync::Arc;

use futures::future::BoxFuture;
use rundown_core::blueprint::{ActionBlueprint, IngestBlueprint, PayloadBlueprint};
use rundown_core::ids::{PartInstanceId, RouteSetId, RundownPlaylistId, StudioId};
use rundown_core::models::RundownPlaylist;
use rundown_core::timeline::RouteSetState;
use rundown_core::types::Duration;
use rundown_events::names;
use rundown_events::{EventBus, NotificationCenter, PlayoutEvent, SubscriberRegistry};
use serde_json::json;
use tokio::sync::{broadcast, mpsc};

use crate::auto_next::AutoNextScheduler;
use crate::clock::{Clock, TokioClock};
use crate::config::WorkerConfig;
use crate::error::JobResult;
use crate::ingest::{rundown_id_for, run_ingest_job, IngestJob, IngestJobOutput};
use crate::jobs::{run_playout_job, PlayoutJob, PlayoutJobOutput};
use crate::lock::LockManager;
use crate::playout::{route_sets, TimelineUpdate};
use crate::queue::{JobQueue, QueueConfig};
use crate::store::Store;
use crate::trace::{TraceSink, Tracer};

/// Everything a job may touch. Shared by all jobs of one worker.
pub(crate) struct WorkerContext {
    pub store: Store,
    pub locks: LockManager,
    pub queue: JobQueue,
    pub bus: Arc<EventBus>,
    pub notes: Arc<NotificationCenter>,
    pub timeline_subscribers: Arc<SubscriberRegistry<Arc<TimelineUpdate>>>,
    pub clock: Arc<dyn Clock>,
    pub config: WorkerConfig,
    pub tracer: Tracer,
    pub ingest_blueprint: Arc<dyn IngestBlueprint>,
    pub action_blueprint: Arc<dyn ActionBlueprint>,
    pub auto_next: AutoNextScheduler,
}

pub struct WorkerBuilder {
    store: Store,
    config: WorkerConfig,
    clock: Option<Arc<dyn Clock>>,
    trace_sink: Option<Arc<dyn TraceSink>>,
    ingest_blueprint: Arc<dyn IngestBlueprint>,
    action_blueprint: Arc<dyn ActionBlueprint>,
}

impl WorkerBuilder {
    pub fn config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.trace_sink = Some(sink);
        self
    }

    pub fn ingest_blueprint(mut self, blueprint: Arc<dyn IngestBlueprint>) -> Self {
        self.ingest_blueprint = blueprint;
        self
    }

    pub fn action_blueprint(mut self, blueprint: Arc<dyn ActionBlueprint>) -> Self {
        self.action_blueprint = blueprint;
        self
    }

    /// Must be called inside a tokio runtime.
    pub fn build(self) -> Worker {
        let bus = Arc::new(EventBus::new(self.config.event_bus_capacity));
        let queue = JobQueue::new(QueueConfig {
            job_timeout: self.config.job_timeout,
            retry_fatal: self.config.retry_fatal,
            lane_idle_timeout: self.config.lane_idle_timeout,
        });
        let context = WorkerContext {
            store: self.store,
            locks: LockManager::new(),
            queue,
            notes: Arc::new(NotificationCenter::new(bus.clone())),
            bus,
            timeline_subscribers: Arc::new(SubscriberRegistry::new()),
            clock: self.clock.unwrap_or_else(|| Arc::new(TokioClock::new())),
            config: self.config,
            tracer: Tracer::new(self.trace_sink),
            ingest_blueprint: self.ingest_blueprint,
            action_blueprint: self.action_blueprint,
            auto_next: AutoNextScheduler::new(),
        };
        Worker {
            inner: Arc::new(context),
        }
    }
}

/// Cheap to clone; clones share one queue, lock manager and event bus.
#[derive(Clone)]
pub struct Worker {
    inner: Arc<WorkerContext>,
}

impl Worker {
    pub fn builder(store: Store) -> WorkerBuilder {
        WorkerBuilder {
            store,
            config: WorkerConfig::default(),
            clock: None,
            trace_sink: None,
            ingest_blueprint: Arc::new(PayloadBlueprint),
            action_blueprint: Arc::new(PayloadBlueprint),
        }
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PlayoutEvent> {
        self.inner.bus.subscribe()
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.inner.notes
    }

    /// Receive every timeline saved for `studio_id`, or for all studios.
    pub async fn subscribe_timelines(
        &self,
        subscriber_id: impl Into<String>,
        studio_id: Option<&StudioId>,
    ) -> mpsc::UnboundedReceiver<Arc<TimelineUpdate>> {
        self.inner
            .timeline_subscribers
            .add(subscriber_id, studio_id.map(|id| id.to_string()))
            .await
    }

    pub async fn unsubscribe_timelines(&self, subscriber_id: &str) {
        self.inner.timeline_subscribers.remove(subscriber_id).await;
    }

    /// Run a playout job on the playlist's queue. The autonext timer is
    /// rescheduled before the next job of the playlist starts.
    ///
    /// Boxed because autonext timers submit jobs from within a job's
    /// follow-up.
    pub fn playout(
        &self,
        playlist_id: &RundownPlaylistId,
        job: PlayoutJob,
    ) -> BoxFuture<'static, JobResult<PlayoutJobOutput>> {
        let worker = self.clone();
        let playlist_id = playlist_id.clone();
        Box::pin(async move {
            let key = format!("playlist:{playlist_id}");
            let name = job.name();
            let lane_worker = worker.clone();
            worker
                .inner
                .queue
                .run(&key, name, move || {
                    let worker = lane_worker.clone();
                    let id = playlist_id.clone();
                    let job = job.clone();
                    async move {
                        let outcome = run_playout_job(&worker.inner, &id, &job).await?;
                        worker.reschedule_autonext(&id, outcome.autonext).await;
                        Ok(outcome.output)
                    }
                })
                .await
        })
    }

    /// Run an ingest job on the rundown's queue. An active playlist whose
    /// content changed is then reconciled by a playout job.
    pub async fn ingest(&self, studio_id: &StudioId, job: IngestJob) -> JobResult<IngestJobOutput> {
        let key = format!("rundown:{}", rundown_id_for(studio_id, job.rundown_external_id()));
        let ctx = self.inner.clone();
        let studio = studio_id.clone();
        let name = job.name();
        let outcome = self
            .inner
            .queue
            .run(&key, name, move || {
                let ctx = ctx.clone();
                let studio = studio.clone();
                let job = job.clone();
                async move { run_ingest_job(&ctx, &studio, &job).await }
            })
            .await?;

        if let Some(playlist_id) = outcome.sync_playlist {
            if let Err(e) = self.playout(&playlist_id, PlayoutJob::SyncIngestChanges).await {
                tracing::warn!(playlist_id = %playlist_id, error = %e, "Failed to sync ingest changes to playout");
            }
        }
        Ok(outcome.output)
    }

    /// Switch a studio route set and rebuild the timelines of the studio's
    /// active playlists when the routing changed.
    pub async fn switch_route_set(
        &self,
        studio_id: &StudioId,
        route_set_id: &RouteSetId,
        state: RouteSetState,
    ) -> JobResult<bool> {
        let key = format!("studio:{studio_id}");
        let ctx = self.inner.clone();
        let studio = studio_id.clone();
        let route_set = route_set_id.clone();
        let changed = self
            .inner
            .queue
            .run(&key, "switchRouteSet", move || {
                let ctx = ctx.clone();
                let studio = studio.clone();
                let route_set = route_set.clone();
                async move {
                    route_sets::switch_route_set(&ctx.store, &ctx.locks, &studio, &route_set, state).await
                }
            })
            .await?;

        self.inner.bus.publish(
            PlayoutEvent::new(names::ROUTE_SET_SWITCHED)
                .for_studio(studio_id.clone())
                .with_payload(json!({ "routeSetId": route_set_id, "changed": changed })),
        );
        if !changed {
            return Ok(false);
        }

        let wanted = studio_id.clone();
        let active = self
            .inner
            .store
            .playlists
            .find_where(&|p: &RundownPlaylist| p.studio_id == wanted && p.is_active())
            .await?;
        for playlist in active {
            self.playout(&playlist.id, PlayoutJob::UpdateTimeline).await?;
        }
        Ok(true)
    }

    pub async fn autonext_pending(&self, playlist_id: &RundownPlaylistId) -> bool {
        self.inner.auto_next.is_pending(playlist_id).await
    }

    /// Stop timers and job lanes. Jobs already running finish.
    pub async fn shutdown(&self) {
        self.inner.auto_next.shutdown().await;
        self.inner.queue.shutdown();
        tracing::info!("Worker stopped");
    }

    async fn reschedule_autonext(
        &self,
        playlist_id: &RundownPlaylistId,
        autonext: Option<(PartInstanceId, Duration)>,
    ) {
        let Some((from_part_instance_id, delay)) = autonext else {
            self.inner.auto_next.cancel(playlist_id).await;
            return;
        };
        let worker = self.clone();
        let id = playlist_id.clone();
        self.inner
            .auto_next
            .schedule(playlist_id, delay, move || async move {
                let job = PlayoutJob::AutoNext {
                    from_part_instance_id,
                    ignore_quickloop: false,
                };
                match worker.playout(&id, job).await {
                    Ok(_) => {}
                    // The part changed since the timer was set.
                    Err(e) if e.is_user_error() => {
                        tracing::debug!(playlist_id = %id, error = %e, "Autonext skipped");
                    }
                    Err(e) => {
                        tracing::error!(playlist_id = %id, error = %e, "Autonext failed");
                    }
                }
            })
            .await;
    }
}
