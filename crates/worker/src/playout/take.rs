//! Take: promote next to current.

use std::collections::HashMap;

use rundown_core::error::{UserError, UserErrorMessage};
use rundown_core::ids::{PartInstanceId, PieceInstanceId};
use rundown_core::models::instances::PieceInstance;
use rundown_core::models::update::{
    PlaylistCounter, PlaylistOptionalField, PlaylistUpdate, PlaylistValue,
};
use rundown_core::models::Piece;
use rundown_core::playout::{build_part_instance_pieces, PreviousPartInstance};
use rundown_core::types::{Duration, Time};

use crate::error::JobResult;
use crate::model::PlayoutModel;
use crate::playout::set_next::select_and_set_next_with;

#[derive(Debug, Clone, PartialEq)]
pub struct TakeOutcome {
    /// The instance now on air.
    pub part_instance_id: PartInstanceId,
    /// When set, take again after this long.
    pub autonext_after: Option<Duration>,
}

/// Take the next part.
///
/// With `from`, the take only happens while that instance is still the
/// current one. Takes closer together than `debounce_ms` are rejected.
/// `ignore_quickloop` lets the following next part run past the quick-loop
/// end marker.
pub fn take(
    model: &mut PlayoutModel,
    from: Option<&PartInstanceId>,
    now: Time,
    debounce_ms: i64,
    ignore_quickloop: bool,
) -> JobResult<TakeOutcome> {
    if !model.is_active() {
        return Err(UserErrorMessage::InactiveRundown.into());
    }
    if let Some(from) = from {
        if model.playlist.current_part_instance_id() != Some(from) {
            return Err(UserErrorMessage::TakeFromIncorrectPart.into());
        }
    }
    let next = model.next_instance().ok_or(UserErrorMessage::TakeNoNextPart)?;
    if next.is_taken {
        return Err(UserErrorMessage::TakeFromIncorrectPart.into());
    }
    if let Some(last) = model.playlist.last_take_time {
        if debounce_ms > 0 && now - last < debounce_ms {
            return Err(UserError::new(UserErrorMessage::TakeRateLimit)
                .with_arg("duration", debounce_ms)
                .into());
        }
    }
    let next_id = next.id.clone();

    refresh_continuations(model, &next_id)?;

    if let Some(current_id) = model.playlist.current_part_instance_id().cloned() {
        if let Some(current) = model.instance_mut(&current_id) {
            current.timings.planned_stopped_playback = Some(now);
        }
        for piece in model.pieces_of_mut(&current_id) {
            if piece.infinite.is_none() && piece.planned_stopped_playback.is_none() {
                piece.planned_stopped_playback = Some(now);
            }
        }
    }

    let autonext_after = {
        let instance = model
            .instance_mut(&next_id)
            .ok_or(UserErrorMessage::PartInstanceNotFound)?;
        instance.is_taken = true;
        instance.timings.take = Some(now);
        instance.timings.planned_started_playback = Some(now);
        instance.part.autonext_duration()
    };
    for piece in model.pieces_of_mut(&next_id) {
        if piece.infinite.is_some() && !piece.is_continuation() {
            piece.planned_started_playback = Some(now + piece.piece.enable.start);
        }
    }

    let mut updates = Vec::new();
    if let Some(current) = model.playlist.current_part_info.clone() {
        updates.push(PlaylistUpdate::set(PlaylistValue::PreviousPartInfo(current)));
    }
    if let Some(next_info) = model.playlist.next_part_info.clone() {
        if next_info.consumes_queued_segment_id {
            updates.push(PlaylistUpdate::remove(PlaylistOptionalField::QueuedSegmentId));
        }
        updates.push(PlaylistUpdate::set(PlaylistValue::CurrentPartInfo(next_info)));
    }
    updates.push(PlaylistUpdate::remove(PlaylistOptionalField::NextPartInfo));
    updates.push(PlaylistUpdate::Increment {
        field: PlaylistCounter::TakeCount,
        by: 1,
    });
    updates.push(PlaylistUpdate::set(PlaylistValue::LastTakeTime(now)));
    if model.playlist.started_playback.is_none() {
        updates.push(PlaylistUpdate::set(PlaylistValue::StartedPlayback(now)));
    }
    model.playlist.apply_all(updates);

    tracing::info!(
        playlist_id = %model.playlist.id,
        part_instance_id = %next_id,
        take_count = model.playlist.take_count,
        "Took part"
    );

    select_and_set_next_with(model, now, ignore_quickloop)?;

    Ok(TakeOutcome {
        part_instance_id: next_id,
        autonext_after,
    })
}

/// Rebuild the infinites `next_id` carries in from the current part, since
/// the current part may have changed after next was set. Native pieces keep
/// their state.
fn refresh_continuations(model: &mut PlayoutModel, next_id: &PartInstanceId) -> JobResult<()> {
    let rebuilt = {
        let next = model
            .instance(next_id)
            .ok_or(UserErrorMessage::PartInstanceNotFound)?;
        let natives: Vec<&PieceInstance> = model
            .pieces_of(next_id)
            .iter()
            .filter(|p| !p.is_continuation())
            .collect();
        let templates: Vec<Piece> = natives.iter().map(|p| p.piece.clone()).collect();
        let mut kept: HashMap<PieceInstanceId, PieceInstance> =
            natives.into_iter().map(|p| (p.id.clone(), p.clone())).collect();

        let position = model.position(&next.part)?;
        let source_layers = model.source_layers(&next.rundown_id)?;
        let previous = match model.current_instance() {
            Some(current) => Some(PreviousPartInstance {
                instance: current,
                pieces: model.pieces_of(&current.id),
                position: model.position(&current.part)?,
            }),
            None => None,
        };

        let mut rebuilt =
            build_part_instance_pieces(next, &templates, &position, previous, source_layers);
        for piece in &mut rebuilt {
            if let Some(existing) = kept.remove(&piece.id) {
                *piece = existing;
            }
        }
        rebuilt
    };
    *model.pieces_of_mut(next_id) = rebuilt;
    Ok(())
}

/// How long until the current part should autonext, if it should.
pub fn autonext_delay(model: &PlayoutModel, now: Time) -> Option<Duration> {
    if model.playlist.next_part_info.is_none() {
        return None;
    }
    let current = model.current_instance()?;
    let duration = current.part.autonext_duration()?;
    let started = current.started_playback()?;
    Some((started + duration - now).max(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playout::set_next::set_next_part;
    use crate::playout::test_support::{active_model, infinite_piece};
    use rundown_core::ids::PartId;
    use rundown_core::models::PieceLifespan;

    fn next_is(model: &PlayoutModel, part: &str) -> bool {
        model.next_instance().is_some_and(|i| i.part.id == PartId::new(part))
    }

    // -- take --

    #[test]
    fn promotes_next_and_selects_following_part() {
        let mut model = active_model(&[&["a", "b", "c"]]);
        set_next_part(&mut model, Some(&"a".into()), false, 0).unwrap();

        let outcome = take(&mut model, None, 100, 0, false).unwrap();
        let current = model.current_instance().unwrap();
        assert_eq!(current.id, outcome.part_instance_id);
        assert!(current.is_taken);
        assert_eq!(current.timings.take, Some(100));
        assert_eq!(current.started_playback(), Some(100));
        assert!(next_is(&model, "b"));
        assert_eq!(model.playlist.take_count, 1);
        assert_eq!(model.playlist.last_take_time, Some(100));
        assert_eq!(model.playlist.started_playback, Some(100));

        take(&mut model, None, 200, 0, false).unwrap();
        let previous = model.playlist.previous_part_instance_id().unwrap();
        assert_eq!(previous, &outcome.part_instance_id);
        assert_eq!(
            model.instance(previous).unwrap().timings.planned_stopped_playback,
            Some(200)
        );
    }

    #[test]
    fn take_without_next_is_rejected() {
        let mut model = active_model(&[&["a"]]);
        set_next_part(&mut model, Some(&"a".into()), false, 0).unwrap();
        take(&mut model, None, 0, 0, false).unwrap();
        let err = take(&mut model, None, 10, 0, false).unwrap_err();
        assert!(err.is_user_message(UserErrorMessage::TakeNoNextPart));
    }

    #[test]
    fn stale_take_is_rejected() {
        let mut model = active_model(&[&["a", "b", "c"]]);
        set_next_part(&mut model, Some(&"a".into()), false, 0).unwrap();
        let first = take(&mut model, None, 0, 0, false).unwrap();
        take(&mut model, None, 10, 0, false).unwrap();

        let err = take(&mut model, Some(&first.part_instance_id), 20, 0, false).unwrap_err();
        assert!(err.is_user_message(UserErrorMessage::TakeFromIncorrectPart));
        assert!(next_is(&model, "c"));
    }

    #[test]
    fn takes_inside_debounce_window_are_rate_limited() {
        let mut model = active_model(&[&["a", "b", "c"]]);
        set_next_part(&mut model, Some(&"a".into()), false, 0).unwrap();
        take(&mut model, None, 1_000, 500, false).unwrap();

        let err = take(&mut model, None, 1_200, 500, false).unwrap_err();
        let user = err.user_error().unwrap();
        assert_eq!(user.message, UserErrorMessage::TakeRateLimit);
        assert_eq!(user.args["duration"], 500);

        take(&mut model, None, 1_600, 500, false).unwrap();
    }

    #[test]
    fn consuming_take_clears_queued_segment() {
        let mut model = active_model(&[&["a"], &["b"], &["c"]]);
        set_next_part(&mut model, Some(&"a".into()), false, 0).unwrap();
        take(&mut model, None, 0, 0, false).unwrap();
        let target = model.segments[2].id.clone();
        crate::playout::set_next::queue_next_segment(&mut model, Some(&target), 0).unwrap();
        assert!(next_is(&model, "c"));

        take(&mut model, None, 10, 0, false).unwrap();
        assert!(model.playlist.queued_segment_id.is_none());
    }

    #[test]
    fn segment_infinite_is_carried_into_next_part() {
        let mut model = active_model(&[&["a", "b"]]);
        model.pieces.push(infinite_piece("logo", "a", PieceLifespan::OutOnSegmentEnd));
        set_next_part(&mut model, Some(&"a".into()), false, 0).unwrap();
        take(&mut model, None, 1_000, 0, false).unwrap();

        let next = model.next_instance().unwrap().id.clone();
        let carried: Vec<_> = model
            .pieces_of(&next)
            .iter()
            .filter(|p| p.is_continuation())
            .collect();
        assert_eq!(carried.len(), 1);
        assert_eq!(carried[0].piece.name, "logo");
        assert_eq!(carried[0].planned_started_playback, Some(1_000));
    }

    // -- autonext_delay --

    #[test]
    fn autonext_delay_counts_down_from_start() {
        let mut model = active_model(&[&["a", "b"]]);
        model.parts[0].autonext = true;
        model.parts[0].expected_duration = Some(5_000);
        set_next_part(&mut model, Some(&"a".into()), false, 0).unwrap();
        let outcome = take(&mut model, None, 1_000, 0, false).unwrap();

        assert_eq!(outcome.autonext_after, Some(5_000));
        assert_eq!(autonext_delay(&model, 3_000), Some(3_000));
        assert_eq!(autonext_delay(&model, 9_000), Some(0));
    }
}
