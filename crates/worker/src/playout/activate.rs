//! Activation, deactivation, reset and playback feedback.

use rundown_core::error::UserErrorMessage;
use rundown_core::ids::{ActivationId, PartInstanceId, RundownPlaylistId};
use rundown_core::models::update::{PlaylistOptionalField, PlaylistUpdate, PlaylistValue};
use rundown_core::types::Time;

use crate::error::JobResult;
use crate::model::PlayoutModel;
use crate::playout::set_next::{clear_next, select_and_set_next};

/// Activate the playlist and select its first part as next.
///
/// `other_active` are the other active playlists of the studio. An already
/// active playlist only switches between rehearsal and live.
pub fn activate(
    model: &mut PlayoutModel,
    rehearsal: bool,
    other_active: &[RundownPlaylistId],
    now: Time,
) -> JobResult<()> {
    if model.is_active() {
        if model.playlist.rehearsal != rehearsal {
            tracing::info!(playlist_id = %model.playlist.id, rehearsal, "Switched rehearsal mode");
            model.playlist.rehearsal = rehearsal;
        }
        return Ok(());
    }
    if !other_active.is_empty() && !model.studio.settings.allow_multiple_active_playlists {
        tracing::info!(
            playlist_id = %model.playlist.id,
            active = ?other_active,
            "Another playlist is already active in the studio"
        );
        return Err(UserErrorMessage::RundownAlreadyActive.into());
    }

    model.playlist.activation_id = Some(ActivationId::random());
    model.playlist.rehearsal = rehearsal;
    model.playlist.apply_all([
        PlaylistUpdate::remove(PlaylistOptionalField::CurrentPartInfo),
        PlaylistUpdate::remove(PlaylistOptionalField::NextPartInfo),
        PlaylistUpdate::remove(PlaylistOptionalField::PreviousPartInfo),
    ]);
    tracing::info!(playlist_id = %model.playlist.id, rehearsal, "Activated playlist");

    select_and_set_next(model, now)
}

/// Stop playout. Part instance history is kept.
pub fn deactivate(model: &mut PlayoutModel, now: Time) -> JobResult<()> {
    if !model.is_active() {
        return Ok(());
    }
    if let Some(current_id) = model.playlist.current_part_instance_id().cloned() {
        if let Some(current) = model.instance_mut(&current_id) {
            current.timings.planned_stopped_playback = Some(now);
        }
        for piece in model.pieces_of_mut(&current_id) {
            if piece.planned_stopped_playback.is_none() {
                piece.planned_stopped_playback = Some(now);
            }
        }
    }
    clear_next(model);
    model.playlist.apply_all([
        PlaylistUpdate::remove(PlaylistOptionalField::CurrentPartInfo),
        PlaylistUpdate::remove(PlaylistOptionalField::PreviousPartInfo),
        PlaylistUpdate::remove(PlaylistOptionalField::QueuedSegmentId),
    ]);
    model.playlist.activation_id = None;
    model.playlist.rehearsal = false;
    model.playlist.ab_session_assignments.clear();

    tracing::info!(playlist_id = %model.playlist.id, "Deactivated playlist");
    Ok(())
}

/// Hide all played instances so the show can start over. Not allowed while
/// live on air.
pub fn reset_playlist(model: &mut PlayoutModel, now: Time) -> JobResult<()> {
    if model.is_active() && !model.playlist.rehearsal {
        return Err(UserErrorMessage::RundownResetWhileActive.into());
    }

    clear_next(model);
    for instance in &mut model.part_instances {
        instance.reset = true;
    }
    for piece in model.piece_instances.values_mut().flatten() {
        piece.reset = true;
    }
    model.playlist.apply_all([
        PlaylistUpdate::remove(PlaylistOptionalField::CurrentPartInfo),
        PlaylistUpdate::remove(PlaylistOptionalField::PreviousPartInfo),
        PlaylistUpdate::remove(PlaylistOptionalField::QueuedSegmentId),
        PlaylistUpdate::remove(PlaylistOptionalField::LastTakeTime),
        PlaylistUpdate::remove(PlaylistOptionalField::StartedPlayback),
        PlaylistUpdate::set(PlaylistValue::ResetTime(now)),
    ]);
    model.playlist.ab_session_assignments.clear();
    tracing::info!(playlist_id = %model.playlist.id, "Reset playlist");

    if model.is_active() {
        select_and_set_next(model, now)?;
    }
    Ok(())
}

/// The device layer reports that a part instance started playing.
pub fn on_part_playback_started(
    model: &mut PlayoutModel,
    part_instance_id: &PartInstanceId,
    started_at: Time,
) -> JobResult<()> {
    let instance = model
        .instance_mut(part_instance_id)
        .ok_or(UserErrorMessage::PartInstanceNotFound)?;
    if instance.timings.reported_started_playback.is_some() {
        return Ok(());
    }
    instance.timings.reported_started_playback = Some(started_at);

    for piece in model.pieces_of_mut(part_instance_id) {
        if !piece.is_continuation() && piece.reported_started_playback.is_none() {
            piece.reported_started_playback = Some(started_at + piece.piece.enable.start);
        }
    }
    if model.playlist.started_playback.is_none() {
        model
            .playlist
            .apply(PlaylistUpdate::set(PlaylistValue::StartedPlayback(started_at)));
    }
    tracing::debug!(part_instance_id = %part_instance_id, started_at, "Part playback started");
    Ok(())
}

/// The device layer reports that a part instance stopped playing.
pub fn on_part_playback_stopped(
    model: &mut PlayoutModel,
    part_instance_id: &PartInstanceId,
    stopped_at: Time,
) -> JobResult<()> {
    let instance = model
        .instance_mut(part_instance_id)
        .ok_or(UserErrorMessage::PartInstanceNotFound)?;
    if instance.timings.reported_stopped_playback.is_none() {
        instance.timings.reported_stopped_playback = Some(stopped_at);
        tracing::debug!(part_instance_id = %part_instance_id, stopped_at, "Part playback stopped");
    }
    Ok(())
}
