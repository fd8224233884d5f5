//! The playout state machine.
//!
//! Every operation here works on a loaded [`PlayoutModel`](crate::model::PlayoutModel)
//! and is synchronous; locking, persistence and events are the job layer's
//! business.

pub mod actions;
pub mod activate;
pub mod route_sets;
pub mod set_next;
pub mod sync;
pub mod take;
pub mod timeline;

pub use actions::{execute_action, ActionExecutionContext};
pub use activate::{
    activate, deactivate, on_part_playback_started, on_part_playback_stopped, reset_playlist,
};
pub use set_next::{
    clear_next, move_next, queue_next_segment, select_and_set_next, select_and_set_next_with,
    set_next_part, set_quick_loop_markers,
};
pub use sync::sync_ingest_changes;
pub use take::{autonext_delay, take, TakeOutcome};
pub use timeline::{update_timeline, TimelineUpdate};

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::BTreeMap;

    use rundown_core::ids::{ActivationId, SegmentId, StudioId};
    use rundown_core::models::rundown::{PieceEnable, PieceLifespan, RundownSource};
    use rundown_core::models::show_style::{ResolvedShowStyle, SourceLayers};
    use rundown_core::models::timeline::{TimelineEnable, TimelineObject};
    use rundown_core::models::{Part, Piece, Rundown, RundownPlaylist, Segment, Studio};
    use serde_json::Value;

    use crate::model::PlayoutModel;

    pub fn piece(id: &str, part: &str, layer: &str, lifespan: PieceLifespan) -> Piece {
        Piece {
            id: id.into(),
            start_part_id: part.into(),
            external_id: id.into(),
            name: id.into(),
            source_layer_id: layer.into(),
            output_layer_id: "pgm".into(),
            lifespan,
            enable: PieceEnable {
                start: 0,
                duration: None,
            },
            content: Value::Null,
            timeline_objects: vec![TimelineObject::new(
                "obj",
                layer,
                TimelineEnable::starting_at(0),
            )],
            ab_sessions: Vec::new(),
            virtual_piece: false,
        }
    }

    /// An infinite on a source layer of its own.
    pub fn infinite_piece(name: &str, part: &str, lifespan: PieceLifespan) -> Piece {
        piece(name, part, name, lifespan)
    }

    /// One rundown; each inner slice is a segment of part ids. Every part
    /// has one camera piece. The playlist is active with nothing selected.
    pub fn active_model(segments: &[&[&str]]) -> PlayoutModel {
        let mut playlist = RundownPlaylist::new("pl".into(), "pl", "studio".into(), "Show");
        playlist.rundown_ids_in_order = vec!["r".into()];
        playlist.activation_id = Some(ActivationId::new("act"));

        let rundown = Rundown {
            id: "r".into(),
            name: "Rundown".into(),
            studio_id: "studio".into(),
            show_style_base_id: "base".into(),
            show_style_variant_id: "variant".into(),
            playlist_id: "pl".into(),
            source: RundownSource {
                nrcs_type: "mos".into(),
                external_id: "r".into(),
            },
            orphaned: None,
            metadata: Value::Null,
        };
        let show_style = ResolvedShowStyle {
            base_id: "base".into(),
            variant_id: "variant".into(),
            source_layers: SourceLayers::new(),
            output_layers: BTreeMap::new(),
            blueprint_config: Value::Null,
        };

        let mut model_segments = Vec::new();
        let mut parts = Vec::new();
        let mut pieces = Vec::new();
        for (segment_rank, part_ids) in segments.iter().enumerate() {
            let segment_id = format!("s{segment_rank}");
            model_segments.push(Segment {
                id: segment_id.as_str().into(),
                rundown_id: "r".into(),
                external_id: segment_id.clone(),
                name: segment_id.clone(),
                rank: segment_rank as f64,
                budget_duration: None,
                countdown_type: None,
                is_hidden: false,
                user_edit_operations: Vec::new(),
                notes: Vec::new(),
            });
            for (rank, id) in part_ids.iter().enumerate() {
                parts.push(Part {
                    id: (*id).into(),
                    segment_id: segment_id.as_str().into(),
                    rundown_id: "r".into(),
                    external_id: (*id).into(),
                    title: (*id).into(),
                    rank: rank as f64,
                    expected_duration: None,
                    autonext: false,
                    untimed: false,
                    invalid: false,
                    floated: false,
                    user_edit_operations: Vec::new(),
                    notes: Vec::new(),
                });
                pieces.push(piece(&format!("{id}_cam"), id, "cam", PieceLifespan::WithinPart));
            }
        }

        PlayoutModel {
            studio: Studio::new(StudioId::new("studio"), "Studio"),
            playlist,
            rundowns: vec![rundown],
            show_styles: BTreeMap::from([("variant".into(), show_style)]),
            segments: model_segments,
            parts,
            pieces,
            part_instances: Vec::new(),
            piece_instances: BTreeMap::new(),
            notes: Vec::new(),
            removed_part_instances: Vec::new(),
            persisted: Default::default(),
        }
    }

    pub fn segment_ids(model: &PlayoutModel) -> Vec<SegmentId> {
        model.segments.iter().map(|s| s.id.clone()).collect()
    }
}
