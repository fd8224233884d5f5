//! Ingest jobs.
//!
//! NRCS data is reconciled against the cached working copy under the
//! rundown lock, changed segments are regenerated through the ingest
//! blueprint, and the results are written under the playlist lock so that
//! playout never loads a half-written rundown. Notes and events go out
//! after both locks are free.

use std::collections::{BTreeMap, HashSet};

use rundown_core::blueprint::{CommonContext, GeneratedSegment};
use rundown_core::diff::DiffStatus;
use rundown_core::error::{CoreError, UserError, UserErrorMessage};
use rundown_core::ids::{
    PartId, RundownId, RundownPlaylistId, SegmentId, ShowStyleBaseId, ShowStyleVariantId, StudioId,
};
use rundown_core::ingest::delta::RejectedDelta;
use rundown_core::ingest::model::USER_EDIT_LOCKED;
use rundown_core::ingest::reconcile::SegmentChange;
use rundown_core::ingest::{
    apply_ingest_deltas, group_mos_parts_into_ingest_segments, reconcile_rundown, IngestChangeSet,
    IngestDelta, IngestMergeResult, IngestNotification, IngestPart, IngestRundown,
};
use rundown_core::models::instances::{PartInstance, PieceInstance};
use rundown_core::models::rundown::{RundownOrphanedReason, RundownSource};
use rundown_core::models::show_style::ShowStyleVariant;
use rundown_core::models::update::{PlaylistOptionalField, PlaylistUpdate};
use rundown_core::models::{Part, Piece, Rundown, RundownPlaylist, Segment, Studio};
use rundown_core::notes::{GenericNote, NoteOrigin, NoteSeverity, TrackedNote, TranslatableMessage};
use rundown_events::names;
use rundown_events::notes::NoteSource;
use rundown_events::PlayoutEvent;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::JobResult;
use crate::lock::RundownLock;
use crate::store::{IngestCacheEntry, Store};
use crate::worker::WorkerContext;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IngestJob {
    /// A complete rundown from the NRCS.
    UpdateRundown { rundown: IngestRundown },
    /// Incremental changes to the cached NRCS rundown.
    ApplyDeltas {
        rundown_external_id: String,
        deltas: Vec<IngestDelta>,
    },
    /// A MOS running order as a flat list of stories.
    UpdateMosStories {
        rundown_external_id: String,
        name: String,
        stories: Vec<IngestPart>,
    },
    RemoveRundown { rundown_external_id: String },
    /// The operator renames a segment, taking ownership of it.
    UserEditSegment {
        rundown_external_id: String,
        segment_external_id: String,
        name: String,
    },
}

impl IngestJob {
    pub fn name(&self) -> &'static str {
        match self {
            Self::UpdateRundown { .. } => "updateRundown",
            Self::ApplyDeltas { .. } => "applyDeltas",
            Self::UpdateMosStories { .. } => "updateMosStories",
            Self::RemoveRundown { .. } => "removeRundown",
            Self::UserEditSegment { .. } => "userEditSegment",
        }
    }

    pub fn rundown_external_id(&self) -> &str {
        match self {
            Self::UpdateRundown { rundown } => &rundown.external_id,
            Self::ApplyDeltas {
                rundown_external_id,
                ..
            }
            | Self::UpdateMosStories {
                rundown_external_id,
                ..
            }
            | Self::RemoveRundown {
                rundown_external_id,
            }
            | Self::UserEditSegment {
                rundown_external_id,
                ..
            } => rundown_external_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IngestJobOutput {
    Updated {
        rundown_id: RundownId,
        regenerated_segments: usize,
        removed_segments: usize,
        rejected_deltas: usize,
    },
    /// The NRCS deleted a rundown that is on air; it stays until taken off.
    Orphaned { rundown_id: RundownId },
    Removed { rundown_id: RundownId },
}

pub(crate) struct IngestJobOutcome {
    pub output: IngestJobOutput,
    /// An active playlist whose current and next need reconciling.
    pub sync_playlist: Option<RundownPlaylistId>,
}

pub fn rundown_id_for(studio_id: &StudioId, external_id: &str) -> RundownId {
    RundownId::from_hash(&[studio_id.as_str(), external_id])
}

/// Every ingested rundown gets a playlist of its own.
pub fn playlist_id_for(studio_id: &StudioId, external_id: &str) -> RundownPlaylistId {
    RundownPlaylistId::from_hash(&[studio_id.as_str(), external_id])
}

pub(crate) async fn run_ingest_job(
    ctx: &WorkerContext,
    studio_id: &StudioId,
    job: &IngestJob,
) -> JobResult<IngestJobOutcome> {
    let rundown_id = rundown_id_for(studio_id, job.rundown_external_id());
    let mut lock = ctx.locks.lock_rundown(&rundown_id).await;
    let result = match job {
        IngestJob::RemoveRundown { .. } => remove_rundown(ctx, &mut lock).await,
        _ => update_rundown(ctx, &mut lock, studio_id, job).await,
    };
    lock.release().await;
    result
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

async fn update_rundown(
    ctx: &WorkerContext,
    lock: &mut RundownLock,
    studio_id: &StudioId,
    job: &IngestJob,
) -> JobResult<IngestJobOutcome> {
    let rundown_id = lock.id().clone();
    let studio = ctx
        .store
        .studios
        .find_one(studio_id.as_str())
        .await?
        .ok_or_else(|| CoreError::not_found("Studio", studio_id))?;
    let cache = ctx.store.ingest_cache.find_one(rundown_id.as_str()).await?;

    let trace = ctx.tracer.start("ingest.merge", rundown_id.as_str());
    let mut rejected = Vec::new();
    let (nrcs, merge) = match job {
        IngestJob::UpdateRundown { rundown } => {
            let merge = reconcile_rundown(cache.as_ref().map(|c| &c.sofie), rundown)?;
            (rundown.clone(), merge)
        }
        IngestJob::ApplyDeltas { deltas, .. } => {
            let cache = cache.as_ref().ok_or(UserErrorMessage::RundownNotFound)?;
            let applied = apply_ingest_deltas(&cache.nrcs, deltas);
            rejected = applied.rejected;
            let merge = reconcile_rundown(Some(&cache.sofie), &applied.rundown)?;
            (applied.rundown, merge)
        }
        IngestJob::UpdateMosStories {
            rundown_external_id,
            name,
            stories,
        } => {
            let grouping = ctx.config.mos_grouping_for(&studio.settings);
            let rundown = IngestRundown {
                external_id: rundown_external_id.clone(),
                name: name.clone(),
                rundown_type: "mos".into(),
                payload: cache.as_ref().map_or(Value::Null, |c| c.nrcs.payload.clone()),
                segments: group_mos_parts_into_ingest_segments(rundown_external_id, stories, &grouping),
            };
            let merge = reconcile_rundown(cache.as_ref().map(|c| &c.sofie), &rundown)?;
            (rundown, merge)
        }
        IngestJob::UserEditSegment {
            segment_external_id,
            name,
            ..
        } => {
            let cache = cache.as_ref().ok_or(UserErrorMessage::RundownNotFound)?;
            (cache.nrcs.clone(), edit_segment(cache, segment_external_id, name)?)
        }
        IngestJob::RemoveRundown { .. } => {
            return Err(CoreError::InvalidState("remove is not an update".into()).into())
        }
    };
    ctx.tracer.end(trace);

    let existing = ctx.store.rundowns.find_one(rundown_id.as_str()).await?;
    let (base_id, variant_id) = match &existing {
        Some(rundown) => (
            rundown.show_style_base_id.clone(),
            rundown.show_style_variant_id.clone(),
        ),
        None => select_show_style(&ctx.store, &studio).await?,
    };

    let regenerate: Vec<&str> = if existing.is_some() {
        merge.changes.segments_to_regenerate().collect()
    } else {
        merge
            .rundown
            .segments
            .iter()
            .map(|s| s.external_id.as_str())
            .collect()
    };
    let mut generated = Vec::with_capacity(regenerate.len());
    for external_id in &regenerate {
        let Some(segment) = merge.rundown.segment(external_id) else {
            continue;
        };
        let segment_id = SegmentId::from_hash(&[rundown_id.as_str(), &segment.external_id]);
        let mut blueprint_ctx = CommonContext::new(
            format!("segment:{}", segment.external_id),
            rundown_id.as_str(),
            NoteOrigin::segment(rundown_id.clone(), segment_id).with_name(segment.name.clone()),
        );
        let result = ctx.ingest_blueprint.get_segment(&mut blueprint_ctx, segment)?;
        let notes = blueprint_ctx
            .into_notes()
            .into_iter()
            .map(|n| GenericNote {
                severity: n.severity,
                message: n.message,
            })
            .collect();
        generated.push(result.into_models(&rundown_id, &segment.external_id, segment.rank, notes));
    }
    let removed: Vec<SegmentId> = merge
        .changes
        .removed_segments()
        .map(|external_id| SegmentId::from_hash(&[rundown_id.as_str(), external_id]))
        .collect();

    let playlist_id = existing
        .as_ref()
        .map(|r| r.playlist_id.clone())
        .unwrap_or_else(|| playlist_id_for(&studio.id, &nrcs.external_id));
    let rundown = Rundown {
        id: rundown_id.clone(),
        name: merge.rundown.name.clone(),
        studio_id: studio.id.clone(),
        show_style_base_id: base_id,
        show_style_variant_id: variant_id,
        playlist_id: playlist_id.clone(),
        source: RundownSource {
            nrcs_type: nrcs.rundown_type.clone(),
            external_id: nrcs.external_id.clone(),
        },
        orphaned: existing
            .as_ref()
            .and_then(|r| r.orphaned)
            .filter(|reason| *reason != RundownOrphanedReason::Deleted),
        metadata: merge.rundown.payload.clone(),
    };

    let playlist_lock = ctx.locks.lock_playlist(&playlist_id).await;
    let written = write_rundown(
        &ctx.store,
        &rundown,
        &generated,
        &removed,
        IngestCacheEntry {
            rundown_id: rundown_id.clone(),
            nrcs,
            sofie: merge.rundown.clone(),
        },
    )
    .await;
    playlist_lock.release().await;
    let playlist = written?;

    let segments = ctx
        .store
        .segments
        .find_where(&|s: &Segment| s.rundown_id == rundown_id)
        .await?;
    let notes = ingest_notes(&rundown_id, &segments, &merge.notifications, &rejected);
    tracing::info!(
        rundown_id = %rundown_id,
        playlist_id = %playlist_id,
        regenerated = generated.len(),
        removed = removed.len(),
        rejected = rejected.len(),
        notes = notes.len(),
        "Ingested rundown"
    );

    let center = ctx.notes.clone();
    let notes_playlist = playlist_id.clone();
    lock.defer(move || async move {
        center.replace(&notes_playlist, NoteSource::Ingest, notes).await;
        Ok(())
    });
    let bus = ctx.bus.clone();
    let event = PlayoutEvent::new(names::RUNDOWN_INGESTED)
        .for_studio(studio.id.clone())
        .for_playlist(playlist_id.clone())
        .with_payload(json!({
            "rundownId": rundown_id,
            "regeneratedSegments": generated.len(),
            "removedSegments": removed.len(),
        }));
    lock.defer(move || async move {
        bus.publish(event);
        Ok(())
    });

    let changed = !generated.is_empty() || !removed.is_empty();
    Ok(IngestJobOutcome {
        output: IngestJobOutput::Updated {
            rundown_id,
            regenerated_segments: generated.len(),
            removed_segments: removed.len(),
            rejected_deltas: rejected.len(),
        },
        sync_playlist: (changed && playlist.is_active()).then_some(playlist_id),
    })
}

/// Rename a segment in the working copy and lock it against the NRCS.
fn edit_segment(
    cache: &IngestCacheEntry,
    segment_external_id: &str,
    name: &str,
) -> JobResult<IngestMergeResult> {
    let mut rundown = cache.sofie.clone();
    let segment = rundown
        .segment_mut(segment_external_id)
        .ok_or(UserErrorMessage::SegmentNotFound)?;
    if name.trim().is_empty() {
        return Err(UserError::new(UserErrorMessage::ValidationFailed)
            .with_arg("reason", "name: length")
            .into());
    }
    segment.name = name.to_string();
    segment.user_edit_states.insert(USER_EDIT_LOCKED.into(), true);

    let changes = IngestChangeSet {
        rundown_changed: false,
        segments: BTreeMap::from([(
            segment_external_id.to_string(),
            SegmentChange {
                status: DiffStatus::Changed,
                parts: BTreeMap::new(),
            },
        )]),
    };
    Ok(IngestMergeResult {
        rundown,
        changes,
        notifications: Vec::new(),
    })
}

/// The first supported show style base that exists, with its first
/// variant.
async fn select_show_style(
    store: &Store,
    studio: &Studio,
) -> JobResult<(ShowStyleBaseId, ShowStyleVariantId)> {
    for base_id in &studio.supported_show_style_base_ids {
        let Some(base) = store.show_style_bases.find_one(base_id.as_str()).await? else {
            continue;
        };
        let wanted = base.id.clone();
        let variants = store
            .show_style_variants
            .find_where(&|v: &ShowStyleVariant| v.show_style_base_id == wanted)
            .await?;
        if let Some(variant) = variants.into_iter().next() {
            return Ok((base.id, variant.id));
        }
    }
    tracing::warn!(
        studio_id = %studio.id,
        supported = studio.supported_show_style_base_ids.len(),
        "No usable show style for studio"
    );
    Err(UserError::new(UserErrorMessage::ValidationFailed)
        .with_arg("reason", "Studio has no usable show style")
        .into())
}

async fn write_rundown(
    store: &Store,
    rundown: &Rundown,
    generated: &[GeneratedSegment],
    removed: &[SegmentId],
    cache: IngestCacheEntry,
) -> JobResult<RundownPlaylist> {
    for segment in generated {
        delete_segment_content(store, &segment.segment.id).await?;
        store.segments.upsert(segment.segment.clone()).await?;
        store.parts.upsert_many(segment.parts.clone()).await?;
        store.pieces.upsert_many(segment.pieces.clone()).await?;
    }
    for segment_id in removed {
        delete_segment_content(store, segment_id).await?;
        store.segments.remove(segment_id.as_str()).await?;
    }

    store.rundowns.upsert(rundown.clone()).await?;

    let mut playlist = match store.playlists.find_one(rundown.playlist_id.as_str()).await? {
        Some(playlist) => playlist,
        None => RundownPlaylist::new(
            rundown.playlist_id.clone(),
            rundown.external_id(),
            rundown.studio_id.clone(),
            rundown.name.clone(),
        ),
    };
    playlist.name = rundown.name.clone();
    if !playlist.contains_rundown(&rundown.id) {
        playlist.rundown_ids_in_order.push(rundown.id.clone());
    }
    store.playlists.upsert(playlist.clone()).await?;
    store.ingest_cache.upsert(cache).await?;
    Ok(playlist)
}

async fn delete_segment_content(store: &Store, segment_id: &SegmentId) -> JobResult<()> {
    let part_ids: HashSet<PartId> = store
        .parts
        .find_where(&|p: &Part| p.segment_id == *segment_id)
        .await?
        .into_iter()
        .map(|p| p.id)
        .collect();
    store
        .pieces
        .remove_where(&|p: &Piece| part_ids.contains(&p.start_part_id))
        .await?;
    store
        .parts
        .remove_where(&|p: &Part| p.segment_id == *segment_id)
        .await?;
    Ok(())
}

/// Everything ingest has to say about one rundown: notes stored on its
/// segments, edits the NRCS could not overwrite, and rejected deltas.
fn ingest_notes(
    rundown_id: &RundownId,
    segments: &[Segment],
    notifications: &[IngestNotification],
    rejected: &[RejectedDelta],
) -> Vec<TrackedNote> {
    let mut notes = Vec::new();
    for segment in segments {
        for note in &segment.notes {
            notes.push(TrackedNote::new(
                note.severity,
                note.message.clone(),
                NoteOrigin::segment(rundown_id.clone(), segment.id.clone()).with_name(segment.name.clone()),
            ));
        }
    }
    for notification in notifications {
        let origin = match (&notification.segment_external_id, &notification.part_external_id) {
            (Some(segment), Some(part)) => NoteOrigin::part(
                rundown_id.clone(),
                SegmentId::from_hash(&[rundown_id.as_str(), segment]),
                PartId::from_hash(&[rundown_id.as_str(), part]),
            ),
            (Some(segment), None) => NoteOrigin::segment(
                rundown_id.clone(),
                SegmentId::from_hash(&[rundown_id.as_str(), segment]),
            ),
            _ => NoteOrigin::rundown(rundown_id.clone()),
        };
        notes.push(TrackedNote::new(NoteSeverity::Warning, notification.message(), origin));
    }
    for delta in rejected {
        notes.push(TrackedNote::new(
            NoteSeverity::Warning,
            TranslatableMessage::new("ingest.deltaRejected")
                .with_arg("index", delta.index)
                .with_arg("reason", delta.reason.as_str()),
            NoteOrigin::rundown(rundown_id.clone()),
        ));
    }
    notes
}

// ---------------------------------------------------------------------------
// Remove
// ---------------------------------------------------------------------------

async fn remove_rundown(ctx: &WorkerContext, lock: &mut RundownLock) -> JobResult<IngestJobOutcome> {
    let rundown_id = lock.id().clone();
    let mut rundown = ctx
        .store
        .rundowns
        .find_one(rundown_id.as_str())
        .await?
        .ok_or(UserErrorMessage::RundownNotFound)?;
    let playlist_id = rundown.playlist_id.clone();

    let playlist_lock = ctx.locks.lock_playlist(&playlist_id).await;
    let playlist = ctx.store.playlists.find_one(playlist_id.as_str()).await?;
    let on_air = playlist.as_ref().is_some_and(|p| {
        p.is_active()
            && p.current_part_info
                .as_ref()
                .is_some_and(|info| info.rundown_id == rundown_id)
    });

    if on_air {
        rundown.orphaned = Some(RundownOrphanedReason::Deleted);
        let written = ctx.store.rundowns.upsert(rundown).await;
        playlist_lock.release().await;
        written?;
        tracing::info!(rundown_id = %rundown_id, "Rundown removed while on air, keeping it orphaned");
        return Ok(IngestJobOutcome {
            output: IngestJobOutput::Orphaned { rundown_id },
            sync_playlist: None,
        });
    }

    let written = delete_rundown(&ctx.store, &rundown_id, playlist).await;
    playlist_lock.release().await;
    let remaining = written?;

    let center = ctx.notes.clone();
    let notes_playlist = playlist_id.clone();
    let playlist_gone = remaining.is_none();
    lock.defer(move || async move {
        if playlist_gone {
            center.clear_playlist(&notes_playlist).await;
        } else {
            center.replace(&notes_playlist, NoteSource::Ingest, Vec::new()).await;
        }
        Ok(())
    });
    let bus = ctx.bus.clone();
    let event = PlayoutEvent::new(names::RUNDOWN_REMOVED)
        .for_studio(rundown.studio_id.clone())
        .for_playlist(playlist_id.clone())
        .with_payload(json!({ "rundownId": rundown_id }));
    lock.defer(move || async move {
        bus.publish(event);
        Ok(())
    });
    tracing::info!(rundown_id = %rundown_id, playlist_removed = playlist_gone, "Removed rundown");

    Ok(IngestJobOutcome {
        output: IngestJobOutput::Removed { rundown_id },
        sync_playlist: remaining.filter(|p| p.is_active()).map(|p| p.id),
    })
}

/// Delete a rundown and everything under it. Returns the playlist if other
/// rundowns keep it alive.
async fn delete_rundown(
    store: &Store,
    rundown_id: &RundownId,
    playlist: Option<RundownPlaylist>,
) -> JobResult<Option<RundownPlaylist>> {
    let part_ids: HashSet<PartId> = store
        .parts
        .find_where(&|p: &Part| p.rundown_id == *rundown_id)
        .await?
        .into_iter()
        .map(|p| p.id)
        .collect();
    store
        .pieces
        .remove_where(&|p: &Piece| part_ids.contains(&p.start_part_id))
        .await?;
    store.parts.remove_where(&|p: &Part| p.rundown_id == *rundown_id).await?;
    store
        .segments
        .remove_where(&|s: &Segment| s.rundown_id == *rundown_id)
        .await?;
    store
        .piece_instances
        .remove_where(&|p: &PieceInstance| p.rundown_id == *rundown_id)
        .await?;
    store
        .part_instances
        .remove_where(&|p: &PartInstance| p.rundown_id == *rundown_id)
        .await?;
    store.ingest_cache.remove(rundown_id.as_str()).await?;
    store.rundowns.remove(rundown_id.as_str()).await?;

    let Some(mut playlist) = playlist else {
        return Ok(None);
    };
    playlist.rundown_ids_in_order.retain(|id| id != rundown_id);
    if playlist.rundown_ids_in_order.is_empty() {
        store.playlists.remove(playlist.id.as_str()).await?;
        store.timelines.remove(playlist.id.as_str()).await?;
        return Ok(None);
    }
    if playlist
        .next_part_info
        .as_ref()
        .is_some_and(|info| info.rundown_id == *rundown_id)
    {
        playlist.apply(PlaylistUpdate::remove(PlaylistOptionalField::NextPartInfo));
    }
    store.playlists.upsert(playlist.clone()).await?;
    Ok(Some(playlist))
}
