//! Choosing and instantiating the next part.

use rundown_core::error::UserErrorMessage;
use rundown_core::ids::{PartId, PartInstanceId, SegmentId};
use rundown_core::models::instances::PartInstance;
use rundown_core::models::playlist::{QuickLoopMarker, QuickLoopMarkers, SelectedPartInstance};
use rundown_core::models::rundown::{Part, Piece, RundownOrphanedReason};
use rundown_core::models::update::{PlaylistOptionalField, PlaylistUpdate, PlaylistValue};
use rundown_core::playout::{
    build_part_instance_pieces, move_next_part, select_next_part, PreviousPartInstance,
    SelectNextPartContext,
};
use rundown_core::types::Time;

use crate::error::JobResult;
use crate::model::PlayoutModel;

/// Set `part_id` as next, or clear next with `None`.
pub fn set_next_part(
    model: &mut PlayoutModel,
    part_id: Option<&PartId>,
    manual: bool,
    now: Time,
) -> JobResult<()> {
    if !model.is_active() {
        return Err(UserErrorMessage::InactiveRundown.into());
    }
    let Some(part_id) = part_id else {
        clear_next(model);
        return Ok(());
    };

    let part = model
        .part(part_id)
        .cloned()
        .ok_or(UserErrorMessage::PartNotFound)?;
    if !part.is_playable() {
        return Err(UserErrorMessage::PartNotPlayable.into());
    }
    if !model.playlist.contains_rundown(&part.rundown_id) {
        return Err(UserErrorMessage::SetNextRundownNotInPlaylist.into());
    }
    let moving = model
        .rundown(&part.rundown_id)
        .is_some_and(|r| r.orphaned == Some(RundownOrphanedReason::Moving));
    if moving && model.current_instance().is_some() {
        return Err(UserErrorMessage::SetNextRundownOrphaned.into());
    }

    set_next_instance(model, part, None, manual, false, now)?;
    Ok(())
}

/// Point next at an instance of `part`.
///
/// An untaken next instance of the same, unchanged part is kept. Otherwise
/// the old next is dropped and a new instance is built, carrying infinites
/// from the current part. `pieces` replaces the part's stored pieces, for
/// parts that only exist as an instance.
pub(crate) fn set_next_instance(
    model: &mut PlayoutModel,
    part: Part,
    pieces: Option<Vec<Piece>>,
    manual: bool,
    consumes_queued_segment_id: bool,
    now: Time,
) -> JobResult<PartInstanceId> {
    let activation_id = model
        .playlist
        .activation_id
        .clone()
        .ok_or(UserErrorMessage::InactiveRundown)?;

    if let Some(existing) = model.next_instance() {
        if !existing.is_taken && existing.part == part && pieces.is_none() {
            let id = existing.id.clone();
            let rundown_id = existing.rundown_id.clone();
            model.playlist.apply(PlaylistUpdate::set(PlaylistValue::NextPartInfo(
                SelectedPartInstance {
                    part_instance_id: id.clone(),
                    rundown_id,
                    manually_selected: manual,
                    consumes_queued_segment_id,
                },
            )));
            if let Some(instance) = model.instance_mut(&id) {
                instance.consumes_queued_segment_id = consumes_queued_segment_id;
            }
            return Ok(id);
        }
    }
    clear_next(model);

    let mut instance = PartInstance::new(part, activation_id, model.playlist.take_count + 1);
    instance.consumes_queued_segment_id = consumes_queued_segment_id;
    instance.timings.set_as_next = Some(now);

    let piece_instances = {
        let stored: Vec<Piece>;
        let candidates: &[Piece] = match &pieces {
            Some(pieces) => pieces,
            None => {
                stored = model.pieces_for_part(&instance.part.id).cloned().collect();
                &stored
            }
        };
        let position = model.position(&instance.part)?;
        let source_layers = model.source_layers(&instance.rundown_id)?;
        let previous = match model.current_instance() {
            Some(current) => Some(PreviousPartInstance {
                instance: current,
                pieces: model.pieces_of(&current.id),
                position: model.position(&current.part)?,
            }),
            None => None,
        };
        build_part_instance_pieces(&instance, candidates, &position, previous, source_layers)
    };

    let info = SelectedPartInstance {
        part_instance_id: instance.id.clone(),
        rundown_id: instance.rundown_id.clone(),
        manually_selected: manual,
        consumes_queued_segment_id,
    };
    tracing::info!(
        playlist_id = %model.playlist.id,
        part_id = %instance.part.id,
        part_instance_id = %instance.id,
        pieces = piece_instances.len(),
        manual,
        "Set next part"
    );
    let id = instance.id.clone();
    model.insert_instance(instance, piece_instances);
    model
        .playlist
        .apply(PlaylistUpdate::set(PlaylistValue::NextPartInfo(info)));
    Ok(id)
}

/// Unset next, dropping its instance if it never went on air.
pub fn clear_next(model: &mut PlayoutModel) {
    let untaken = model
        .next_instance()
        .filter(|i| !i.is_taken)
        .map(|i| i.id.clone());
    if let Some(id) = untaken {
        model.remove_instance(&id);
    }
    model
        .playlist
        .apply(PlaylistUpdate::remove(PlaylistOptionalField::NextPartInfo));
}

/// Let next-part selection pick what follows the current part.
pub fn select_and_set_next(model: &mut PlayoutModel, now: Time) -> JobResult<()> {
    select_and_set_next_with(model, now, false)
}

/// [`select_and_set_next`], optionally running past the quick-loop end
/// marker instead of looping back.
pub fn select_and_set_next_with(
    model: &mut PlayoutModel,
    now: Time,
    ignore_quickloop: bool,
) -> JobResult<()> {
    let selected = {
        let previous = model.current_instance().map(|i| &i.part);
        let order = model.order();
        let ctx = SelectNextPartContext {
            ignore_quickloop,
            ..SelectNextPartContext::from_playlist(&model.playlist, previous)
        };
        select_next_part(&order, &ctx).map(|s| (s.part.clone(), s.consumes_queued_segment_id))
    };

    match selected {
        Some((part, consumes)) => {
            set_next_instance(model, part, None, false, consumes, now)?;
        }
        None => {
            tracing::debug!(playlist_id = %model.playlist.id, "No next part to select");
            clear_next(model);
        }
    }
    Ok(())
}

/// Move next by whole parts or segments. Returns whether next changed.
pub fn move_next(
    model: &mut PlayoutModel,
    delta_parts: i32,
    delta_segments: i32,
    now: Time,
) -> JobResult<bool> {
    if !model.is_active() {
        return Err(UserErrorMessage::InactiveRundown.into());
    }
    let reference = model
        .next_instance()
        .or_else(|| model.current_instance())
        .map(|i| i.part.id.clone())
        .ok_or(UserErrorMessage::NoCurrentPart)?;

    let target = {
        let order = model.order();
        move_next_part(&order, &reference, delta_parts, delta_segments).cloned()
    };
    let Some(target) = target else {
        return Ok(false);
    };
    if model.next_instance().is_some_and(|i| i.part.id == target.id) {
        return Ok(false);
    }
    set_next_instance(model, target, None, true, false, now)?;
    Ok(true)
}

/// Queue a segment to jump to when the current segment ends. `None`
/// clears the queue.
pub fn queue_next_segment(
    model: &mut PlayoutModel,
    segment_id: Option<&SegmentId>,
    now: Time,
) -> JobResult<()> {
    if !model.is_active() {
        return Err(UserErrorMessage::InactiveRundown.into());
    }
    match segment_id {
        Some(id) => {
            if !model.segments.iter().any(|s| s.id == *id) {
                return Err(UserErrorMessage::SegmentNotFound.into());
            }
            model
                .playlist
                .apply(PlaylistUpdate::set(PlaylistValue::QueuedSegmentId(id.clone())));
        }
        None => model
            .playlist
            .apply(PlaylistUpdate::remove(PlaylistOptionalField::QueuedSegmentId)),
    }

    let manual = model
        .playlist
        .next_part_info
        .as_ref()
        .is_some_and(|info| info.manually_selected);
    if !manual {
        select_and_set_next(model, now)?;
    }
    Ok(())
}

/// Set or clear the quick-loop markers. An automatically selected next part
/// is selected again under the new markers.
pub fn set_quick_loop_markers(
    model: &mut PlayoutModel,
    markers: Option<QuickLoopMarkers>,
    now: Time,
) -> JobResult<()> {
    match markers {
        Some(markers) => {
            for marker in [&markers.start, &markers.end] {
                match marker {
                    QuickLoopMarker::Part(id) if model.part(id).is_none() => {
                        return Err(UserErrorMessage::PartNotFound.into());
                    }
                    QuickLoopMarker::Segment(id) if !model.segments.iter().any(|s| s.id == *id) => {
                        return Err(UserErrorMessage::SegmentNotFound.into());
                    }
                    _ => {}
                }
            }
            model
                .playlist
                .apply(PlaylistUpdate::set(PlaylistValue::QuickLoop(markers)));
        }
        None => model
            .playlist
            .apply(PlaylistUpdate::remove(PlaylistOptionalField::QuickLoop)),
    }

    let manual = model
        .playlist
        .next_part_info
        .as_ref()
        .is_some_and(|info| info.manually_selected);
    if model.is_active() && !manual {
        select_and_set_next(model, now)?;
    }
    Ok(())
}
