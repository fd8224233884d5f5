//! The rundown playlist: the unit that is activated and played.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{
    ActivationId, PartId, PartInstanceId, RundownId, RundownPlaylistId, SegmentId, StudioId,
};
use crate::types::Time;

/// A pointer to a part instance held by the playlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedPartInstance {
    pub part_instance_id: PartInstanceId,
    pub rundown_id: RundownId,
    /// Chosen by the operator rather than by next-part selection.
    #[serde(default)]
    pub manually_selected: bool,
    #[serde(default)]
    pub consumes_queued_segment_id: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum QuickLoopMarker {
    Part(PartId),
    Segment(SegmentId),
}

/// Loop between two markers instead of running to the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickLoopMarkers {
    pub start: QuickLoopMarker,
    pub end: QuickLoopMarker,
    #[serde(default)]
    pub running: bool,
}

/// A player assigned to an AB session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbSessionAssignment {
    pub player_id: String,
    /// Only used by lookahead objects so far.
    #[serde(default)]
    pub lookahead: bool,
    /// When the player was given to this session.
    pub assigned_at: Time,
}

/// Per pool, per session name.
pub type AbSessionAssignments = BTreeMap<String, BTreeMap<String, AbSessionAssignment>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RundownPlaylist {
    pub id: RundownPlaylistId,
    pub external_id: String,
    pub studio_id: StudioId,
    pub name: String,
    pub rundown_ids_in_order: Vec<RundownId>,
    /// Set while active; changes on every activation.
    #[serde(default)]
    pub activation_id: Option<ActivationId>,
    #[serde(default)]
    pub rehearsal: bool,
    #[serde(default)]
    pub current_part_info: Option<SelectedPartInstance>,
    #[serde(default)]
    pub next_part_info: Option<SelectedPartInstance>,
    #[serde(default)]
    pub previous_part_info: Option<SelectedPartInstance>,
    #[serde(default)]
    pub loop_playlist: bool,
    #[serde(default)]
    pub quick_loop: Option<QuickLoopMarkers>,
    /// Jump to this segment when the current segment ends.
    #[serde(default)]
    pub queued_segment_id: Option<SegmentId>,
    #[serde(default)]
    pub last_take_time: Option<Time>,
    #[serde(default)]
    pub reset_time: Option<Time>,
    #[serde(default)]
    pub started_playback: Option<Time>,
    /// Counts takes within the activation; feeds part instance ordering.
    #[serde(default)]
    pub take_count: u64,
    #[serde(default)]
    pub ab_session_assignments: AbSessionAssignments,
}

impl RundownPlaylist {
    pub fn new(
        id: RundownPlaylistId,
        external_id: impl Into<String>,
        studio_id: StudioId,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            external_id: external_id.into(),
            studio_id,
            name: name.into(),
            rundown_ids_in_order: Vec::new(),
            activation_id: None,
            rehearsal: false,
            current_part_info: None,
            next_part_info: None,
            previous_part_info: None,
            loop_playlist: false,
            quick_loop: None,
            queued_segment_id: None,
            last_take_time: None,
            reset_time: None,
            started_playback: None,
            take_count: 0,
            ab_session_assignments: AbSessionAssignments::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.activation_id.is_some()
    }

    pub fn current_part_instance_id(&self) -> Option<&PartInstanceId> {
        self.current_part_info.as_ref().map(|info| &info.part_instance_id)
    }

    pub fn next_part_instance_id(&self) -> Option<&PartInstanceId> {
        self.next_part_info.as_ref().map(|info| &info.part_instance_id)
    }

    pub fn previous_part_instance_id(&self) -> Option<&PartInstanceId> {
        self.previous_part_info
            .as_ref()
            .map(|info| &info.part_instance_id)
    }

    pub fn contains_rundown(&self, rundown_id: &RundownId) -> bool {
        self.rundown_ids_in_order.contains(rundown_id)
    }

    /// Position of a rundown in play order.
    pub fn rundown_rank(&self, rundown_id: &RundownId) -> Option<usize> {
        self.rundown_ids_in_order
            .iter()
            .position(|id| id == rundown_id)
    }
}
