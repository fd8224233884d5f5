//! Timeline recomputation for one playlist.
//!
//! Lookahead objects are built first and appended to the part groups, then
//! players are assigned and layers routed. AB assignments are stored on
//! the playlist so players stay stable between recomputations.

use serde::Serialize;

use rundown_core::models::show_style::SourceLayers;
use rundown_core::models::studio::MappingsExt;
use rundown_core::models::timeline::{TimelineComplete, TimelineObject};
use rundown_core::notes::TrackedNote;
use rundown_core::playout::{find_lookahead_objects, resolve_active_pieces, LookaheadInput, LookaheadPart};
use rundown_core::timeline::{
    apply_ab_assignments, assign_ab_sessions, available_ab_players, build_timeline,
    collect_ab_sessions, get_active_routes, get_routed_mappings, get_routed_timeline,
    PartInstanceWithPieces, TimelineBuildInput,
};
use rundown_core::types::Time;

use crate::error::JobResult;
use crate::model::PlayoutModel;

/// What the device layer needs after a recomputation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineUpdate {
    pub timeline: TimelineComplete,
    /// Mappings with the active routes applied.
    pub mappings: MappingsExt,
}

/// Rebuild the playlist's timeline. An inactive playlist gets an empty one.
pub fn update_timeline(
    model: &mut PlayoutModel,
    lookahead_distance: usize,
    now: Time,
) -> JobResult<TimelineUpdate> {
    let mappings = model.studio.resolved_mappings()?;
    let route_sets = model.studio.resolved_route_sets()?;

    let (mut objects, notes) = if model.is_active() {
        build_objects(model, &mappings, lookahead_distance, now)?
    } else {
        (Vec::new(), Vec::new())
    };
    model.notes.extend(notes);

    let sessions = collect_ab_sessions(&objects);
    if !sessions.is_empty() || !model.playlist.ab_session_assignments.is_empty() {
        let players = available_ab_players(&model.studio.ab_player_pools, &route_sets);
        let result = assign_ab_sessions(
            &players,
            &sessions,
            &model.playlist.ab_session_assignments,
            now,
        );
        apply_ab_assignments(&mut objects, &result.assignments);
        model.playlist.ab_session_assignments = result.assignments;
        model.notes.extend(result.notes);
    }

    let routes = get_active_routes(&route_sets);
    let objects = get_routed_timeline(objects, &routes);
    let mappings = get_routed_mappings(&mappings, &routes);

    let timeline = TimelineComplete::new(
        model.studio.id.clone(),
        model.playlist.id.clone(),
        now,
        objects,
    )?;
    tracing::info!(
        playlist_id = %model.playlist.id,
        objects = timeline.objects.len(),
        hash = %timeline.timeline_hash,
        "Updated timeline"
    );
    Ok(TimelineUpdate { timeline, mappings })
}

fn build_objects(
    model: &PlayoutModel,
    mappings: &MappingsExt,
    lookahead_distance: usize,
    now: Time,
) -> JobResult<(Vec<TimelineObject>, Vec<TrackedNote>)> {
    let current = model.current_instance();
    let next = model.next_instance();
    let empty = SourceLayers::new();
    let source_layers = match current.or(next) {
        Some(instance) => model.source_layers(&instance.rundown_id)?,
        None => &empty,
    };

    let mut upcoming = Vec::new();
    if let Some(next) = next {
        upcoming.push(LookaheadPart::new(
            model
                .pieces_of(&next.id)
                .iter()
                .filter(|p| !p.is_continuation())
                .map(|p| &p.piece),
        ));
    }
    let order = model.order();
    let after = next.or(current).and_then(|i| order.position_of(&i.part.id));
    let start = match (after, current.or(next)) {
        (Some(index), _) => index + 1,
        (None, Some(_)) => order.parts.len(),
        (None, None) => 0,
    };
    upcoming.extend(
        order.parts[start.min(order.parts.len())..]
            .iter()
            .filter(|p| p.is_playable())
            .take(lookahead_distance)
            .map(|p| LookaheadPart::new(model.pieces_for_part(&p.id))),
    );

    let lookahead = find_lookahead_objects(&LookaheadInput {
        mappings,
        current: current.map(|c| LookaheadPart::new(model.pieces_of(&c.id).iter().map(|p| &p.piece))),
        upcoming,
        default_max_search_distance: lookahead_distance,
    });

    let objects = build_timeline(&TimelineBuildInput {
        now,
        current: current.map(|instance| PartInstanceWithPieces {
            instance,
            pieces: model.pieces_of(&instance.id),
        }),
        next: next.map(|instance| PartInstanceWithPieces {
            instance,
            pieces: model.pieces_of(&instance.id),
        }),
        source_layers,
        lookahead,
    });

    let notes = match current {
        Some(instance) => {
            let playhead = now - instance.started_playback().unwrap_or(now);
            resolve_active_pieces(model.pieces_of(&instance.id), source_layers, playhead).notes
        }
        None => Vec::new(),
    };
    Ok((objects, notes))
}
