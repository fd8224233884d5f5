mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use futures::future::join_all;
use rundown_core::blueprint::{ActionBlueprint, ActionContext};
use rundown_core::error::{CoreError, UserErrorMessage};
use rundown_core::models::playlist::{QuickLoopMarker, QuickLoopMarkers};
use rundown_core::models::RundownPlaylist;
use rundown_events::names;
use rundown_worker::store::{Collection, Filter, MemoryCollection, StoreResult};
use rundown_worker::{JobError, PlayoutJob, PlayoutJobOutput};
use serde_json::Value;

use common::*;

// -- take / autonext --

#[tokio::test(start_paused = true)]
async fn autonext_part_takes_the_next_part_when_it_runs_out() {
    let worker = test_worker().await;
    let playlist_id = ingest(&worker, autonext_rundown("show")).await;

    worker
        .playout(&playlist_id, PlayoutJob::Activate { rehearsal: false })
        .await
        .unwrap();
    worker
        .playout(&playlist_id, take())
        .await
        .unwrap();
    assert_eq!(current_part(&worker, &playlist_id).await.as_deref(), Some("a"));
    assert!(!worker.autonext_pending(&playlist_id).await);

    worker
        .playout(&playlist_id, take())
        .await
        .unwrap();
    assert_eq!(current_part(&worker, &playlist_id).await.as_deref(), Some("b"));
    assert!(worker.autonext_pending(&playlist_id).await);

    tokio::time::sleep(Duration::from_millis(4_000)).await;
    assert_eq!(current_part(&worker, &playlist_id).await.as_deref(), Some("b"));

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    let taken = wait_for(|| {
        let worker = worker.clone();
        let playlist_id = playlist_id.clone();
        async move { current_part(&worker, &playlist_id).await.as_deref() == Some("c") }
    })
    .await;
    assert!(taken, "autonext did not take part c");

    worker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn manual_take_cancels_the_autonext_timer() {
    let worker = test_worker().await;
    let playlist_id = ingest(&worker, autonext_rundown("show")).await;

    worker
        .playout(&playlist_id, PlayoutJob::Activate { rehearsal: false })
        .await
        .unwrap();
    worker
        .playout(&playlist_id, PlayoutJob::SetNextPart { part_id: Some(part_id("show", "b")) })
        .await
        .unwrap();
    worker
        .playout(&playlist_id, take())
        .await
        .unwrap();
    assert!(worker.autonext_pending(&playlist_id).await);

    worker
        .playout(&playlist_id, take())
        .await
        .unwrap();
    assert_eq!(current_part(&worker, &playlist_id).await.as_deref(), Some("c"));
    assert!(!worker.autonext_pending(&playlist_id).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn back_to_back_takes_leave_the_timer_of_the_last_take() {
    let worker = test_worker().await;
    let playlist_id = ingest(&worker, autonext_rundown("show")).await;
    worker
        .playout(&playlist_id, PlayoutJob::Activate { rehearsal: false })
        .await
        .unwrap();
    worker.playout(&playlist_id, take()).await.unwrap();

    // The first take puts autonext part b on air, the second moves on to c.
    let (into_b, into_c) = tokio::join!(
        worker.playout(&playlist_id, take()),
        worker.playout(&playlist_id, take()),
    );
    into_b.unwrap();
    into_c.unwrap();

    assert_eq!(current_part(&worker, &playlist_id).await.as_deref(), Some("c"));
    assert!(!worker.autonext_pending(&playlist_id).await);
}

#[tokio::test]
async fn take_on_inactive_playlist_is_a_user_error() {
    let worker = test_worker().await;
    let playlist_id = ingest(&worker, autonext_rundown("show")).await;

    let err = worker
        .playout(&playlist_id, take())
        .await
        .unwrap_err();
    assert!(err.is_user_error());
    assert!(err.is_user_message(UserErrorMessage::InactiveRundown));
}

#[tokio::test]
async fn failed_job_leaves_the_store_untouched() {
    let worker = test_worker().await;
    let playlist_id = ingest(&worker, autonext_rundown("show")).await;
    worker
        .playout(&playlist_id, PlayoutJob::Activate { rehearsal: false })
        .await
        .unwrap();
    let before = worker
        .store()
        .playlists
        .find_one(playlist_id.as_str())
        .await
        .unwrap();

    let err = worker
        .playout(&playlist_id, PlayoutJob::SetNextPart { part_id: Some("missing".into()) })
        .await
        .unwrap_err();
    assert_matches!(err, JobError::User(_));

    let after = worker
        .store()
        .playlists
        .find_one(playlist_id.as_str())
        .await
        .unwrap();
    assert_eq!(before, after);
}

// -- quick loop --

fn three_parts(external_id: &str) -> rundown_core::ingest::IngestRundown {
    rundown(
        external_id,
        vec![segment(
            "seg",
            0.0,
            vec![
                part("a", 0.0, Value::Null),
                part("b", 1.0, Value::Null),
                part("c", 2.0, Value::Null),
            ],
        )],
    )
}

#[tokio::test]
async fn quick_loop_markers_loop_takes_unless_ignored() {
    let worker = test_worker().await;
    let playlist_id = ingest(&worker, three_parts("loop")).await;
    worker
        .playout(&playlist_id, PlayoutJob::Activate { rehearsal: false })
        .await
        .unwrap();
    let mut events = worker.subscribe_events();

    worker
        .playout(
            &playlist_id,
            PlayoutJob::SetQuickLoopMarkers {
                markers: Some(QuickLoopMarkers {
                    start: QuickLoopMarker::Part(part_id("loop", "a")),
                    end: QuickLoopMarker::Part(part_id("loop", "b")),
                    running: true,
                }),
            },
        )
        .await
        .unwrap();
    let event = events.recv().await.unwrap();
    assert_eq!(event.event_type, names::QUICK_LOOP_CHANGED);

    worker.playout(&playlist_id, take()).await.unwrap();
    worker.playout(&playlist_id, take()).await.unwrap();
    assert_eq!(current_part(&worker, &playlist_id).await.as_deref(), Some("b"));
    assert_eq!(next_part(&worker, &playlist_id).await.as_deref(), Some("a"));

    worker.playout(&playlist_id, take()).await.unwrap();
    worker
        .playout(
            &playlist_id,
            PlayoutJob::Take {
                from_part_instance_id: None,
                ignore_quickloop: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(current_part(&worker, &playlist_id).await.as_deref(), Some("b"));
    assert_eq!(next_part(&worker, &playlist_id).await.as_deref(), Some("c"));
}

#[tokio::test]
async fn clearing_quick_loop_markers_restores_the_running_order() {
    let worker = test_worker().await;
    let playlist_id = ingest(&worker, three_parts("loop")).await;
    worker
        .playout(&playlist_id, PlayoutJob::Activate { rehearsal: false })
        .await
        .unwrap();
    let markers = QuickLoopMarkers {
        start: QuickLoopMarker::Part(part_id("loop", "a")),
        end: QuickLoopMarker::Part(part_id("loop", "b")),
        running: true,
    };
    worker
        .playout(&playlist_id, PlayoutJob::SetQuickLoopMarkers { markers: Some(markers) })
        .await
        .unwrap();
    worker.playout(&playlist_id, take()).await.unwrap();
    worker.playout(&playlist_id, take()).await.unwrap();
    assert_eq!(next_part(&worker, &playlist_id).await.as_deref(), Some("a"));

    worker
        .playout(&playlist_id, PlayoutJob::SetQuickLoopMarkers { markers: None })
        .await
        .unwrap();
    let playlist = worker
        .store()
        .playlists
        .find_one(playlist_id.as_str())
        .await
        .unwrap()
        .unwrap();
    assert!(playlist.quick_loop.is_none());
    assert_eq!(next_part(&worker, &playlist_id).await.as_deref(), Some("c"));
}

// -- locking --

/// Counts how many actions run at once.
#[derive(Default)]
struct ConcurrencyCounter {
    in_flight: AtomicUsize,
    max_seen: AtomicUsize,
    runs: AtomicUsize,
}

impl ActionBlueprint for ConcurrencyCounter {
    fn execute_action(
        &self,
        _ctx: &mut dyn ActionContext,
        _action_id: &str,
        _user_data: &Value,
    ) -> Result<(), CoreError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(5));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn jobs_on_one_playlist_never_overlap() {
    let counter = Arc::new(ConcurrencyCounter::default());
    let worker = builder().await.action_blueprint(counter.clone()).build();
    let playlist_id = ingest(&worker, autonext_rundown("show")).await;
    worker
        .playout(&playlist_id, PlayoutJob::Activate { rehearsal: false })
        .await
        .unwrap();

    let jobs = (0..8).map(|i| {
        let worker = worker.clone();
        let playlist_id = playlist_id.clone();
        tokio::spawn(async move {
            worker
                .playout(
                    &playlist_id,
                    PlayoutJob::ExecuteAction {
                        action_id: format!("count_{i}"),
                        user_data: Value::Null,
                    },
                )
                .await
        })
    });
    for result in join_all(jobs).await {
        assert_eq!(result.unwrap().unwrap(), PlayoutJobOutput::Done);
    }

    assert_eq!(counter.runs.load(Ordering::SeqCst), 8);
    assert_eq!(counter.max_seen.load(Ordering::SeqCst), 1);
}

/// Delays every playlist read so concurrent jobs interleave between a
/// query and the write that depends on it.
struct SlowPlaylists {
    inner: MemoryCollection<RundownPlaylist>,
}

#[async_trait]
impl Collection<RundownPlaylist> for SlowPlaylists {
    async fn find_one(&self, id: &str) -> StoreResult<Option<RundownPlaylist>> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.inner.find_one(id).await
    }

    async fn find_where(&self, filter: Filter<'_, RundownPlaylist>) -> StoreResult<Vec<RundownPlaylist>> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.inner.find_where(filter).await
    }

    async fn upsert(&self, doc: RundownPlaylist) -> StoreResult<()> {
        self.inner.upsert(doc).await
    }

    async fn remove(&self, id: &str) -> StoreResult<bool> {
        self.inner.remove(id).await
    }

    async fn remove_where(&self, filter: Filter<'_, RundownPlaylist>) -> StoreResult<usize> {
        self.inner.remove_where(filter).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_activations_in_one_studio_admit_one_playlist() {
    let mut store = seeded_store().await;
    store.playlists = Arc::new(SlowPlaylists {
        inner: MemoryCollection::new(),
    });
    let worker = rundown_worker::Worker::builder(store).config(test_config()).build();
    let first = ingest(&worker, autonext_rundown("early")).await;
    let second = ingest(&worker, autonext_rundown("late")).await;

    let (a, b) = tokio::join!(
        worker.playout(&first, PlayoutJob::Activate { rehearsal: false }),
        worker.playout(&second, PlayoutJob::Activate { rehearsal: false }),
    );
    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let err = results.into_iter().find_map(Result::err).unwrap();
    assert!(err.is_user_message(UserErrorMessage::RundownAlreadyActive));

    let active = worker
        .store()
        .playlists
        .find_where(&|p: &RundownPlaylist| p.is_active())
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
}

// -- deferred effects --

#[tokio::test]
async fn events_are_published_after_the_job_is_persisted() {
    let worker = test_worker().await;
    let playlist_id = ingest(&worker, autonext_rundown("show")).await;
    worker
        .playout(&playlist_id, PlayoutJob::Activate { rehearsal: false })
        .await
        .unwrap();

    let mut events = worker.subscribe_events();
    let output = worker
        .playout(&playlist_id, take())
        .await
        .unwrap();
    let PlayoutJobOutput::Taken { part_instance_id } = output else {
        panic!("expected a take, got {output:?}");
    };

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event.event_type.clone());
        if event.event_type == names::PART_TAKEN {
            let stored = worker
                .store()
                .playlists
                .find_one(playlist_id.as_str())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(stored.current_part_instance_id(), Some(&part_instance_id));
        }
    }

    let taken = received.iter().position(|n| n == names::PART_TAKEN);
    let timeline = received.iter().position(|n| n == names::TIMELINE_UPDATED);
    assert!(taken.is_some(), "no take event in {received:?}");
    assert!(timeline.is_some(), "no timeline event in {received:?}");
    assert!(taken < timeline);
}

#[tokio::test]
async fn timelines_are_pushed_to_studio_subscribers() {
    let worker = test_worker().await;
    let playlist_id = ingest(&worker, autonext_rundown("show")).await;
    let mut timelines = worker.subscribe_timelines("playout-gateway", Some(&studio_id())).await;

    worker
        .playout(&playlist_id, PlayoutJob::Activate { rehearsal: false })
        .await
        .unwrap();

    let update = timelines.try_recv().unwrap();
    assert_eq!(update.timeline.playlist_id, playlist_id);
    let stored = worker
        .store()
        .timelines
        .find_one(playlist_id.as_str())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.timeline_hash, update.timeline.timeline_hash);

    // Same content, same hash: nothing new is pushed.
    worker.playout(&playlist_id, PlayoutJob::UpdateTimeline).await.unwrap();
    assert!(timelines.try_recv().is_err());
}
