//! Playout jobs.
//!
//! A job runs under the playlist lock: load the model, apply one state
//! machine operation, recompute the timeline, persist, then publish from
//! deferred callbacks once the lock is free. A failing operation leaves the
//! store untouched because nothing is written before it succeeds.
//! Activation and route set switches additionally hold the studio lock.

use std::sync::Arc;

use rundown_core::error::UserErrorMessage;
use rundown_core::ids::{PartId, PartInstanceId, RouteSetId, RundownPlaylistId, SegmentId};
use rundown_core::models::playlist::QuickLoopMarkers;
use rundown_core::models::RundownPlaylist;
use rundown_core::notes::TrackedNote;
use rundown_core::timeline::{switch_route_set, RouteSetState};
use rundown_core::types::{Duration, Time};
use rundown_events::names;
use rundown_events::notes::NoteSource;
use rundown_events::PlayoutEvent;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::JobResult;
use crate::lock::PlaylistLock;
use crate::model::PlayoutModel;
use crate::playout::{self, TimelineUpdate};
use crate::worker::WorkerContext;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayoutJob {
    Activate {
        rehearsal: bool,
    },
    Deactivate,
    ResetPlaylist,
    SetNextPart {
        part_id: Option<PartId>,
    },
    MoveNextPart {
        delta_parts: i32,
        delta_segments: i32,
    },
    QueueNextSegment {
        segment_id: Option<SegmentId>,
    },
    /// `None` clears the markers.
    SetQuickLoopMarkers {
        markers: Option<QuickLoopMarkers>,
    },
    Take {
        from_part_instance_id: Option<PartInstanceId>,
        #[serde(default)]
        ignore_quickloop: bool,
    },
    /// Take fired by the autonext timer. Not subject to take debouncing.
    AutoNext {
        from_part_instance_id: PartInstanceId,
        #[serde(default)]
        ignore_quickloop: bool,
    },
    OnPartPlaybackStarted {
        part_instance_id: PartInstanceId,
        started_at: Time,
    },
    OnPartPlaybackStopped {
        part_instance_id: PartInstanceId,
        stopped_at: Time,
    },
    ExecuteAction {
        action_id: String,
        #[serde(default)]
        user_data: Value,
    },
    SwitchRouteSet {
        route_set_id: RouteSetId,
        state: RouteSetState,
    },
    UpdateTimeline,
    /// Reconcile current and next with content changed by ingest.
    SyncIngestChanges,
}

impl PlayoutJob {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Activate { .. } => "activate",
            Self::Deactivate => "deactivate",
            Self::ResetPlaylist => "resetPlaylist",
            Self::SetNextPart { .. } => "setNextPart",
            Self::MoveNextPart { .. } => "moveNextPart",
            Self::QueueNextSegment { .. } => "queueNextSegment",
            Self::SetQuickLoopMarkers { .. } => "setQuickLoopMarkers",
            Self::Take { .. } => "take",
            Self::AutoNext { .. } => "autoNext",
            Self::OnPartPlaybackStarted { .. } => "onPartPlaybackStarted",
            Self::OnPartPlaybackStopped { .. } => "onPartPlaybackStopped",
            Self::ExecuteAction { .. } => "executeAction",
            Self::SwitchRouteSet { .. } => "switchRouteSet",
            Self::UpdateTimeline => "updateTimeline",
            Self::SyncIngestChanges => "syncIngestChanges",
        }
    }

    fn locks_studio(&self) -> bool {
        matches!(self, Self::Activate { .. } | Self::SwitchRouteSet { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayoutJobOutput {
    Done,
    Taken { part_instance_id: PartInstanceId },
    NextMoved { changed: bool },
    RouteSetSwitched { changed: bool },
}

/// What the worker needs to know after a playout job.
pub(crate) struct PlayoutJobOutcome {
    pub output: PlayoutJobOutput,
    /// The current instance and the time until it should autonext.
    pub autonext: Option<(PartInstanceId, Duration)>,
}

/// Side effects of a job, published once the lock is free.
#[derive(Default)]
struct Effects {
    event: Option<(&'static str, Value)>,
    recompute_timeline: bool,
    blueprint_notes: Option<Vec<TrackedNote>>,
}

pub(crate) async fn run_playout_job(
    ctx: &WorkerContext,
    playlist_id: &RundownPlaylistId,
    job: &PlayoutJob,
) -> JobResult<PlayoutJobOutcome> {
    let mut lock = ctx.locks.lock_playlist(playlist_id).await;
    let result = run_locked(ctx, &mut lock, job).await;
    lock.release().await;
    result
}

async fn run_locked(
    ctx: &WorkerContext,
    lock: &mut PlaylistLock,
    job: &PlayoutJob,
) -> JobResult<PlayoutJobOutcome> {
    // Held until persisted: both read or write state shared by every
    // playlist of the studio.
    let studio_lock = if job.locks_studio() {
        let studio_id = ctx
            .store
            .playlists
            .find_one(lock.id().as_str())
            .await?
            .map(|p| p.studio_id)
            .ok_or(UserErrorMessage::PlaylistNotFound)?;
        Some(ctx.locks.lock_studio(&studio_id).await)
    } else {
        None
    };
    let result = run_model(ctx, lock, job).await;
    if let Some(studio_lock) = studio_lock {
        studio_lock.release().await;
    }
    result
}

async fn run_model(
    ctx: &WorkerContext,
    lock: &mut PlaylistLock,
    job: &PlayoutJob,
) -> JobResult<PlayoutJobOutcome> {
    let playlist_id = lock.id().clone();
    let trace = ctx.tracer.start("playout.job", format!("{}:{playlist_id}", job.name()));

    let mut model = PlayoutModel::load(&ctx.store, &playlist_id).await?;
    let now = ctx.clock.now();

    // The switch only touches the model's copy of the studio; it is written
    // back once the rest of the job has been persisted.
    let route_set_changed = match job {
        PlayoutJob::SwitchRouteSet {
            route_set_id,
            state,
        } => Some(switch_route_set(&mut model.studio.route_sets, route_set_id, *state)?),
        _ => None,
    };

    let other_active = if matches!(job, PlayoutJob::Activate { .. }) {
        other_active_playlists(ctx, &model.playlist).await?
    } else {
        Vec::new()
    };

    let (mut output, mut effects) = apply(ctx, &mut model, job, &other_active, now)?;
    if let (Some(changed), PlayoutJob::SwitchRouteSet { route_set_id, .. }) = (route_set_changed, job) {
        effects.recompute_timeline = changed;
        effects.event = Some((
            names::ROUTE_SET_SWITCHED,
            json!({ "routeSetId": route_set_id, "changed": changed }),
        ));
        output = PlayoutJobOutput::RouteSetSwitched { changed };
    }

    let timeline = if effects.recompute_timeline {
        let lookahead = ctx.config.lookahead_distance_for(&model.studio.settings);
        let timeline_trace = ctx.tracer.start("timeline.update", playlist_id.as_str());
        let update = playout::update_timeline(&mut model, lookahead, now)?;
        ctx.tracer.end(timeline_trace);
        Some(update)
    } else {
        None
    };

    model.save(&ctx.store).await?;
    if route_set_changed == Some(true) {
        ctx.store.studios.upsert(model.studio.clone()).await?;
    }

    let mut timeline_changed = false;
    if let Some(update) = &timeline {
        let previous = ctx.store.timelines.find_one(playlist_id.as_str()).await?;
        timeline_changed = previous
            .map_or(true, |t| t.timeline_hash != update.timeline.timeline_hash);
        if timeline_changed {
            ctx.store.timelines.upsert(update.timeline.clone()).await?;
        }
    }

    let autonext = model
        .current_instance()
        .map(|i| i.id.clone())
        .zip(playout::autonext_delay(&model, now));

    defer_effects(ctx, lock, &model, effects, timeline.filter(|_| timeline_changed));
    ctx.tracer.end(trace);

    tracing::info!(
        job = job.name(),
        playlist_id = %playlist_id,
        current = ?model.playlist.current_part_instance_id(),
        next = ?model.playlist.next_part_instance_id(),
        "Playout job done"
    );
    Ok(PlayoutJobOutcome { output, autonext })
}

fn apply(
    ctx: &WorkerContext,
    model: &mut PlayoutModel,
    job: &PlayoutJob,
    other_active: &[RundownPlaylistId],
    now: Time,
) -> JobResult<(PlayoutJobOutput, Effects)> {
    let mut effects = Effects {
        recompute_timeline: true,
        ..Effects::default()
    };
    let mut output = PlayoutJobOutput::Done;

    match job {
        PlayoutJob::Activate { rehearsal } => {
            playout::activate(model, *rehearsal, other_active, now)?;
            effects.event = Some((names::PLAYLIST_ACTIVATED, json!({ "rehearsal": rehearsal })));
        }
        PlayoutJob::Deactivate => {
            playout::deactivate(model, now)?;
            effects.event = Some((names::PLAYLIST_DEACTIVATED, Value::Null));
        }
        PlayoutJob::ResetPlaylist => {
            playout::reset_playlist(model, now)?;
            effects.event = Some((names::PLAYLIST_RESET, Value::Null));
        }
        PlayoutJob::SetNextPart { part_id } => {
            playout::set_next_part(model, part_id.as_ref(), true, now)?;
            effects.event = Some(next_changed(model));
        }
        PlayoutJob::MoveNextPart {
            delta_parts,
            delta_segments,
        } => {
            let changed = playout::move_next(model, *delta_parts, *delta_segments, now)?;
            effects.recompute_timeline = changed;
            if changed {
                effects.event = Some(next_changed(model));
            }
            output = PlayoutJobOutput::NextMoved { changed };
        }
        PlayoutJob::QueueNextSegment { segment_id } => {
            playout::queue_next_segment(model, segment_id.as_ref(), now)?;
            effects.event = Some(next_changed(model));
        }
        PlayoutJob::SetQuickLoopMarkers { markers } => {
            playout::set_quick_loop_markers(model, markers.clone(), now)?;
            effects.event = Some((
                names::QUICK_LOOP_CHANGED,
                json!({
                    "quickLoop": model.playlist.quick_loop,
                    "nextPartInstanceId": model.playlist.next_part_instance_id(),
                }),
            ));
        }
        PlayoutJob::Take {
            from_part_instance_id,
            ignore_quickloop,
        } => {
            let debounce = ctx.config.take_debounce_for(&model.studio.settings);
            let taken = playout::take(
                model,
                from_part_instance_id.as_ref(),
                now,
                debounce,
                *ignore_quickloop,
            )?;
            effects.event = Some(taken_event(&taken.part_instance_id, false));
            output = PlayoutJobOutput::Taken {
                part_instance_id: taken.part_instance_id,
            };
        }
        PlayoutJob::AutoNext {
            from_part_instance_id,
            ignore_quickloop,
        } => {
            let taken = playout::take(model, Some(from_part_instance_id), now, 0, *ignore_quickloop)?;
            effects.event = Some(taken_event(&taken.part_instance_id, true));
            output = PlayoutJobOutput::Taken {
                part_instance_id: taken.part_instance_id,
            };
        }
        PlayoutJob::OnPartPlaybackStarted {
            part_instance_id,
            started_at,
        } => {
            playout::on_part_playback_started(model, part_instance_id, *started_at)?;
            effects.event = Some((
                names::PART_PLAYBACK_STARTED,
                json!({ "partInstanceId": part_instance_id, "time": started_at }),
            ));
        }
        PlayoutJob::OnPartPlaybackStopped {
            part_instance_id,
            stopped_at,
        } => {
            playout::on_part_playback_stopped(model, part_instance_id, *stopped_at)?;
            effects.recompute_timeline = false;
            effects.event = Some((
                names::PART_PLAYBACK_STOPPED,
                json!({ "partInstanceId": part_instance_id, "time": stopped_at }),
            ));
        }
        PlayoutJob::ExecuteAction {
            action_id,
            user_data,
        } => {
            let notes = playout::execute_action(
                model,
                ctx.action_blueprint.as_ref(),
                action_id,
                user_data,
                now,
            )?;
            effects.blueprint_notes = Some(notes);
            effects.event = Some((names::ACTION_EXECUTED, json!({ "actionId": action_id })));
        }
        PlayoutJob::SwitchRouteSet { .. } | PlayoutJob::UpdateTimeline => {}
        PlayoutJob::SyncIngestChanges => {
            if playout::sync_ingest_changes(model, now)? {
                effects.event = Some(next_changed(model));
            }
        }
    }
    Ok((output, effects))
}

fn next_changed(model: &PlayoutModel) -> (&'static str, Value) {
    (
        names::NEXT_PART_CHANGED,
        json!({ "partInstanceId": model.playlist.next_part_instance_id() }),
    )
}

fn taken_event(part_instance_id: &PartInstanceId, auto: bool) -> (&'static str, Value) {
    (
        names::PART_TAKEN,
        json!({ "partInstanceId": part_instance_id, "auto": auto }),
    )
}

async fn other_active_playlists(
    ctx: &WorkerContext,
    playlist: &RundownPlaylist,
) -> JobResult<Vec<RundownPlaylistId>> {
    let studio_id = playlist.studio_id.clone();
    let own_id = playlist.id.clone();
    Ok(ctx
        .store
        .playlists
        .find_where(&|p: &RundownPlaylist| p.studio_id == studio_id && p.id != own_id && p.is_active())
        .await?
        .into_iter()
        .map(|p| p.id)
        .collect())
}

fn defer_effects(
    ctx: &WorkerContext,
    lock: &mut PlaylistLock,
    model: &PlayoutModel,
    effects: Effects,
    timeline: Option<TimelineUpdate>,
) {
    let studio_id = model.studio.id.clone();
    let playlist_id = model.playlist.id.clone();

    if let Some((name, payload)) = effects.event {
        let bus = ctx.bus.clone();
        let event = PlayoutEvent::new(name)
            .for_studio(studio_id.clone())
            .for_playlist(playlist_id.clone())
            .with_payload(payload);
        lock.defer(move || async move {
            bus.publish(event);
            Ok(())
        });
    }

    if let Some(update) = timeline {
        let bus = ctx.bus.clone();
        let subscribers = ctx.timeline_subscribers.clone();
        let event = PlayoutEvent::new(names::TIMELINE_UPDATED)
            .for_studio(studio_id.clone())
            .for_playlist(playlist_id.clone())
            .with_payload(json!({
                "timelineHash": update.timeline.timeline_hash,
                "objects": update.timeline.objects.len(),
            }));
        let update = Arc::new(update);
        lock.defer(move || async move {
            let delivered = subscribers.publish(studio_id.as_str(), update).await;
            tracing::debug!(studio_id = %studio_id, delivered, "Pushed timeline");
            bus.publish(event);
            Ok(())
        });

        let notes = ctx.notes.clone();
        let playout_notes = model.notes.clone();
        let id = playlist_id.clone();
        lock.defer(move || async move {
            notes.replace(&id, NoteSource::Playout, playout_notes).await;
            Ok(())
        });
    }

    if let Some(blueprint_notes) = effects.blueprint_notes {
        let notes = ctx.notes.clone();
        lock.defer(move || async move {
            notes
                .replace(&playlist_id, NoteSource::Blueprint, blueprint_notes)
                .await;
            Ok(())
        });
    }
}
