//! Bringing an active playlist in line with freshly ingested content.

use rundown_core::models::instances::PartInstanceOrphaned;
use rundown_core::models::{Part, Piece};
use rundown_core::types::Time;

use crate::error::JobResult;
use crate::model::PlayoutModel;
use crate::playout::set_next::{clear_next, select_and_set_next, set_next_instance};

/// Reconcile the current and next instances with the stored parts.
///
/// The current instance is never rebuilt while on air; it is only marked
/// orphaned when its part is gone. An untaken next instance is rebuilt
/// when its part or pieces changed, and replaced by the following part
/// when its part was removed. Returns whether anything changed.
pub fn sync_ingest_changes(model: &mut PlayoutModel, now: Time) -> JobResult<bool> {
    if !model.is_active() {
        return Ok(false);
    }
    let mut changed = false;

    if let Some(current_id) = model.playlist.current_part_instance_id().cloned() {
        let part_exists = model
            .instance(&current_id)
            .is_some_and(|i| model.part(&i.part.id).is_some());
        if let Some(current) = model.instance_mut(&current_id) {
            match (current.orphaned, part_exists) {
                (None, false) => {
                    tracing::info!(part_instance_id = %current_id, "Current part was removed by ingest");
                    current.orphaned = Some(PartInstanceOrphaned::Deleted);
                    changed = true;
                }
                (Some(PartInstanceOrphaned::Deleted), true) => {
                    current.orphaned = None;
                    changed = true;
                }
                _ => {}
            }
        }
    }

    let next = model
        .next_instance()
        .filter(|i| !i.is_taken && i.orphaned != Some(PartInstanceOrphaned::AdlibPart))
        .map(|i| (i.part.clone(), model.playlist.next_part_info.clone()));

    match next {
        Some((instance_part, Some(info))) => match model.part(&instance_part.id).cloned() {
            Some(part) if part.is_playable() => {
                if is_stale(model, &instance_part, &part) {
                    tracing::info!(part_id = %part.id, "Rebuilding next part after ingest");
                    clear_next(model);
                    set_next_instance(
                        model,
                        part,
                        None,
                        info.manually_selected,
                        info.consumes_queued_segment_id,
                        now,
                    )?;
                    changed = true;
                }
            }
            _ => {
                tracing::info!(part_id = %instance_part.id, "Next part is gone, selecting another");
                clear_next(model);
                select_and_set_next(model, now)?;
                changed = true;
            }
        },
        _ => {
            if model.playlist.next_part_info.is_none() {
                select_and_set_next(model, now)?;
                changed |= model.playlist.next_part_info.is_some();
            }
        }
    }

    Ok(changed)
}

fn is_stale(model: &PlayoutModel, instance_part: &Part, part: &Part) -> bool {
    if instance_part != part {
        return true;
    }
    let Some(next) = model.next_instance() else {
        return false;
    };
    let mut instantiated: Vec<&Piece> = model
        .pieces_of(&next.id)
        .iter()
        .filter(|p| p.dynamically_inserted.is_none())
        .filter(|p| p.infinite.as_ref().map_or(true, |i| !i.from_previous_part))
        .map(|p| &p.piece)
        .collect();
    let mut stored: Vec<&Piece> = model.pieces_for_part(&part.id).collect();
    instantiated.sort_by(|a, b| a.id.cmp(&b.id));
    stored.sort_by(|a, b| a.id.cmp(&b.id));
    instantiated != stored
}
