mod common;

use rundown_core::models::studio::{StudioRouteBehavior, StudioRouteSet};
use rundown_core::overrides::ObjectOverrideOp;
use rundown_core::timeline::RouteSetState;
use rundown_events::names;
use rundown_worker::{PlayoutJob, PlayoutJobOutput};
use serde_json::json;

use common::*;

fn route_set(name: &str, active: bool) -> StudioRouteSet {
    StudioRouteSet {
        name: name.into(),
        active,
        default_active: None,
        exclusivity_group: Some("g".into()),
        behavior: StudioRouteBehavior::Toggle,
        routes: Vec::new(),
        ab_players: Vec::new(),
    }
}

async fn worker_with_route_sets() -> rundown_worker::Worker {
    let store = seeded_store().await;
    let mut studio = store.studios.find_one(STUDIO).await.unwrap().unwrap();
    studio.route_sets.defaults.insert("a".into(), route_set("A", true));
    studio.route_sets.defaults.insert("b".into(), route_set("B", false));
    store.studios.upsert(studio).await.unwrap();
    rundown_worker::Worker::builder(store).config(test_config()).build()
}

async fn active_sets(worker: &rundown_worker::Worker) -> Vec<String> {
    let studio = worker.store().studios.find_one(STUDIO).await.unwrap().unwrap();
    studio
        .resolved_route_sets()
        .unwrap()
        .into_iter()
        .filter(|(_, set)| set.active)
        .map(|(id, _)| id)
        .collect()
}

// -- switch_route_set --

#[tokio::test]
async fn activating_a_member_deactivates_its_group() {
    let worker = worker_with_route_sets().await;
    let mut events = worker.subscribe_events();

    let changed = worker
        .switch_route_set(&studio_id(), &"b".into(), RouteSetState::Set(true))
        .await
        .unwrap();
    assert!(changed);
    assert_eq!(active_sets(&worker).await, ["b"]);

    let event = events.try_recv().unwrap();
    assert_eq!(event.event_type, names::ROUTE_SET_SWITCHED);
}

#[tokio::test]
async fn switching_to_the_current_state_changes_nothing() {
    let worker = worker_with_route_sets().await;
    let changed = worker
        .switch_route_set(&studio_id(), &"a".into(), RouteSetState::Set(true))
        .await
        .unwrap();
    assert!(!changed);
    assert_eq!(active_sets(&worker).await, ["a"]);
}

#[tokio::test]
async fn route_change_rebuilds_active_timelines() {
    let worker = worker_with_route_sets().await;
    let playlist_id = ingest(&worker, autonext_rundown("show")).await;
    worker
        .playout(&playlist_id, PlayoutJob::Activate { rehearsal: false })
        .await
        .unwrap();
    let mut timelines = worker.subscribe_timelines("gateway", None).await;
    let mut events = worker.subscribe_events();

    worker
        .switch_route_set(&studio_id(), &"b".into(), RouteSetState::Toggle)
        .await
        .unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event.event_type);
    }
    assert!(seen.iter().any(|n| n == names::ROUTE_SET_SWITCHED));
    // Neither set has routes, so the rebuilt timeline is identical.
    assert!(timelines.try_recv().is_err());
}

#[tokio::test]
async fn playlist_job_switches_its_studio_route_set() {
    let worker = worker_with_route_sets().await;
    let playlist_id = ingest(&worker, autonext_rundown("show")).await;

    let output = worker
        .playout(
            &playlist_id,
            PlayoutJob::SwitchRouteSet {
                route_set_id: "b".into(),
                state: RouteSetState::Set(true),
            },
        )
        .await
        .unwrap();
    assert_eq!(output, PlayoutJobOutput::RouteSetSwitched { changed: true });
    assert_eq!(active_sets(&worker).await, ["b"]);
}

#[tokio::test]
async fn failed_playlist_switch_keeps_the_studio_routing() {
    let worker = worker_with_route_sets().await;
    let playlist_id = ingest(&worker, autonext_rundown("show")).await;

    // A mapping override that no longer deserialises breaks the timeline
    // build after the route set has been switched in memory.
    let mut studio = worker.store().studios.find_one(STUDIO).await.unwrap().unwrap();
    studio.mappings.overrides.push(ObjectOverrideOp::Set {
        path: "vt".into(),
        value: json!({ "lookahead": 42 }),
    });
    worker.store().studios.upsert(studio).await.unwrap();

    let result = worker
        .playout(
            &playlist_id,
            PlayoutJob::SwitchRouteSet {
                route_set_id: "b".into(),
                state: RouteSetState::Set(true),
            },
        )
        .await;
    assert!(result.is_err());
    assert_eq!(active_sets(&worker).await, ["a"]);
}
