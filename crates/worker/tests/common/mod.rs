#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use rundown_core::ids::{PartId, PartInstanceId, RundownId, RundownPlaylistId, StudioId};
use rundown_core::ingest::{IngestPart, IngestRundown, IngestSegment};
use rundown_core::models::show_style::{ShowStyleBase, ShowStyleVariant};
use rundown_core::models::{RundownPlaylist, Studio};
use rundown_core::overrides::ObjectWithOverrides;
use rundown_worker::ingest::playlist_id_for;
use rundown_worker::{IngestJob, IngestJobOutput, PlayoutJob, Store, Worker, WorkerBuilder, WorkerConfig};
use serde_json::{json, Value};

pub const STUDIO: &str = "studio";

pub fn studio_id() -> StudioId {
    StudioId::new(STUDIO)
}

/// A studio supporting show style base `base`, which has one variant.
pub async fn seeded_store() -> Store {
    let store = Store::in_memory();

    let mut studio = Studio::new(studio_id(), "Studio 1");
    studio.supported_show_style_base_ids = vec!["base".into()];
    store.studios.upsert(studio).await.unwrap();

    store
        .show_style_bases
        .upsert(ShowStyleBase {
            id: "base".into(),
            name: "News".into(),
            source_layers: ObjectWithOverrides::default(),
            output_layers: ObjectWithOverrides::default(),
            blueprint_config: ObjectWithOverrides::new(Value::Null),
        })
        .await
        .unwrap();
    store
        .show_style_variants
        .upsert(ShowStyleVariant {
            id: "variant".into(),
            show_style_base_id: "base".into(),
            name: "Default".into(),
            blueprint_config: ObjectWithOverrides::new(Value::Null),
        })
        .await
        .unwrap();

    store
}

/// No take debounce, so tests can take back to back.
pub fn test_config() -> WorkerConfig {
    WorkerConfig {
        take_debounce_ms: 0,
        ..WorkerConfig::default()
    }
}

pub async fn builder() -> WorkerBuilder {
    Worker::builder(seeded_store().await).config(test_config())
}

pub async fn test_worker() -> Worker {
    builder().await.build()
}

pub fn part(external_id: &str, rank: f64, payload: Value) -> IngestPart {
    IngestPart {
        external_id: external_id.into(),
        name: external_id.to_uppercase(),
        rank,
        payload,
    }
}

pub fn segment(external_id: &str, rank: f64, parts: Vec<IngestPart>) -> IngestSegment {
    IngestSegment {
        external_id: external_id.into(),
        name: external_id.to_uppercase(),
        rank,
        payload: Value::Null,
        parts,
    }
}

pub fn rundown(external_id: &str, segments: Vec<IngestSegment>) -> IngestRundown {
    IngestRundown {
        external_id: external_id.into(),
        name: "Evening News".into(),
        rundown_type: "mos".into(),
        payload: Value::Null,
        segments,
    }
}

/// Parts `a`, `b` and `c` in one segment. `b` autonexts after five seconds.
pub fn autonext_rundown(external_id: &str) -> IngestRundown {
    rundown(
        external_id,
        vec![segment(
            "seg",
            0.0,
            vec![
                part("a", 0.0, Value::Null),
                part("b", 1.0, json!({ "autoNext": true, "expectedDuration": 5000 })),
                part("c", 2.0, Value::Null),
            ],
        )],
    )
}

/// Ingest a rundown and return its playlist id.
pub async fn ingest(worker: &Worker, rundown: IngestRundown) -> RundownPlaylistId {
    let external_id = rundown.external_id.clone();
    let output = worker
        .ingest(&studio_id(), IngestJob::UpdateRundown { rundown })
        .await
        .unwrap();
    assert!(matches!(output, IngestJobOutput::Updated { .. }));
    playlist_id_for(&studio_id(), &external_id)
}

pub fn rundown_id(external_id: &str) -> RundownId {
    rundown_worker::ingest::rundown_id_for(&studio_id(), external_id)
}

pub fn part_id(rundown_external_id: &str, part_external_id: &str) -> PartId {
    PartId::from_hash(&[rundown_id(rundown_external_id).as_str(), part_external_id])
}

/// External id of the part behind the playlist's current instance.
pub async fn current_part(worker: &Worker, playlist_id: &RundownPlaylistId) -> Option<String> {
    selected_part(worker, playlist_id, |p| p.current_part_instance_id().cloned()).await
}

/// External id of the part behind the playlist's next instance.
pub async fn next_part(worker: &Worker, playlist_id: &RundownPlaylistId) -> Option<String> {
    selected_part(worker, playlist_id, |p| p.next_part_instance_id().cloned()).await
}

async fn selected_part(
    worker: &Worker,
    playlist_id: &RundownPlaylistId,
    select: impl Fn(&RundownPlaylist) -> Option<PartInstanceId>,
) -> Option<String> {
    let playlist = worker
        .store()
        .playlists
        .find_one(playlist_id.as_str())
        .await
        .unwrap()?;
    let instance_id = select(&playlist)?;
    let instance = worker
        .store()
        .part_instances
        .find_one(instance_id.as_str())
        .await
        .unwrap()?;
    Some(instance.part.external_id)
}

/// Poll `check` until it holds, advancing time in small steps.
pub async fn wait_for<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// A MOS story; its name carries the segment name before the separator.
pub fn story(external_id: &str, rank: f64, name: &str) -> IngestPart {
    IngestPart {
        external_id: external_id.into(),
        name: name.into(),
        rank,
        payload: Value::Null,
    }
}

/// A manual take of whatever is next.
pub fn take() -> PlayoutJob {
    PlayoutJob::Take {
        from_part_instance_id: None,
        ignore_quickloop: false,
    }
}
