//! Typed patch operations.
//!
//! Blueprints and playout jobs change part instances and playlists through
//! these operations instead of replacing whole documents. Each update is one
//! of set / increment / remove on a named field, and the `apply` methods are
//! the only interpreter.

use serde::{Deserialize, Serialize};

use crate::ids::SegmentId;
use crate::models::instances::{PartInstance, PartInstanceOrphaned};
use crate::models::playlist::{QuickLoopMarkers, RundownPlaylist, SelectedPartInstance};
use crate::types::{Duration, Time};

// ---------------------------------------------------------------------------
// PartInstance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum PartInstanceValue {
    Title(String),
    ExpectedDuration(Duration),
    Autonext(bool),
    Untimed(bool),
    PlannedStartedPlayback(Time),
    PlannedStoppedPlayback(Time),
    ReportedStartedPlayback(Time),
    ReportedStoppedPlayback(Time),
    Orphaned(PartInstanceOrphaned),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartInstanceCounter {
    /// An unset duration counts as 0.
    ExpectedDuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartInstanceOptionalField {
    ExpectedDuration,
    PlannedStoppedPlayback,
    ReportedStoppedPlayback,
    Orphaned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PartInstanceUpdate {
    Set { value: PartInstanceValue },
    Increment { field: PartInstanceCounter, by: i64 },
    Remove { field: PartInstanceOptionalField },
}

impl PartInstance {
    pub fn apply(&mut self, update: PartInstanceUpdate) {
        match update {
            PartInstanceUpdate::Set { value } => match value {
                PartInstanceValue::Title(title) => self.part.title = title,
                PartInstanceValue::ExpectedDuration(d) => self.part.expected_duration = Some(d),
                PartInstanceValue::Autonext(v) => self.part.autonext = v,
                PartInstanceValue::Untimed(v) => self.part.untimed = v,
                PartInstanceValue::PlannedStartedPlayback(t) => {
                    self.timings.planned_started_playback = Some(t)
                }
                PartInstanceValue::PlannedStoppedPlayback(t) => {
                    self.timings.planned_stopped_playback = Some(t)
                }
                PartInstanceValue::ReportedStartedPlayback(t) => {
                    self.timings.reported_started_playback = Some(t)
                }
                PartInstanceValue::ReportedStoppedPlayback(t) => {
                    self.timings.reported_stopped_playback = Some(t)
                }
                PartInstanceValue::Orphaned(reason) => self.orphaned = Some(reason),
            },
            PartInstanceUpdate::Increment { field, by } => match field {
                PartInstanceCounter::ExpectedDuration => {
                    let current = self.part.expected_duration.unwrap_or(0);
                    self.part.expected_duration = Some(current.saturating_add(by));
                }
            },
            PartInstanceUpdate::Remove { field } => match field {
                PartInstanceOptionalField::ExpectedDuration => self.part.expected_duration = None,
                PartInstanceOptionalField::PlannedStoppedPlayback => {
                    self.timings.planned_stopped_playback = None
                }
                PartInstanceOptionalField::ReportedStoppedPlayback => {
                    self.timings.reported_stopped_playback = None
                }
                PartInstanceOptionalField::Orphaned => self.orphaned = None,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// RundownPlaylist
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum PlaylistValue {
    CurrentPartInfo(SelectedPartInstance),
    NextPartInfo(SelectedPartInstance),
    PreviousPartInfo(SelectedPartInstance),
    QueuedSegmentId(SegmentId),
    QuickLoop(QuickLoopMarkers),
    LoopPlaylist(bool),
    LastTakeTime(Time),
    StartedPlayback(Time),
    ResetTime(Time),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaylistCounter {
    TakeCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaylistOptionalField {
    CurrentPartInfo,
    NextPartInfo,
    PreviousPartInfo,
    QueuedSegmentId,
    QuickLoop,
    LastTakeTime,
    StartedPlayback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PlaylistUpdate {
    Set { value: PlaylistValue },
    Increment { field: PlaylistCounter, by: u64 },
    Remove { field: PlaylistOptionalField },
}

impl PlaylistUpdate {
    pub fn set(value: PlaylistValue) -> Self {
        Self::Set { value }
    }

    pub fn remove(field: PlaylistOptionalField) -> Self {
        Self::Remove { field }
    }
}

impl RundownPlaylist {
    pub fn apply(&mut self, update: PlaylistUpdate) {
        match update {
            PlaylistUpdate::Set { value } => match value {
                PlaylistValue::CurrentPartInfo(info) => self.current_part_info = Some(info),
                PlaylistValue::NextPartInfo(info) => self.next_part_info = Some(info),
                PlaylistValue::PreviousPartInfo(info) => self.previous_part_info = Some(info),
                PlaylistValue::QueuedSegmentId(id) => self.queued_segment_id = Some(id),
                PlaylistValue::QuickLoop(markers) => self.quick_loop = Some(markers),
                PlaylistValue::LoopPlaylist(v) => self.loop_playlist = v,
                PlaylistValue::LastTakeTime(t) => self.last_take_time = Some(t),
                PlaylistValue::StartedPlayback(t) => self.started_playback = Some(t),
                PlaylistValue::ResetTime(t) => self.reset_time = Some(t),
            },
            PlaylistUpdate::Increment { field, by } => match field {
                PlaylistCounter::TakeCount => {
                    self.take_count = self.take_count.saturating_add(by)
                }
            },
            PlaylistUpdate::Remove { field } => match field {
                PlaylistOptionalField::CurrentPartInfo => self.current_part_info = None,
                PlaylistOptionalField::NextPartInfo => self.next_part_info = None,
                PlaylistOptionalField::PreviousPartInfo => self.previous_part_info = None,
                PlaylistOptionalField::QueuedSegmentId => self.queued_segment_id = None,
                PlaylistOptionalField::QuickLoop => self.quick_loop = None,
                PlaylistOptionalField::LastTakeTime => self.last_take_time = None,
                PlaylistOptionalField::StartedPlayback => self.started_playback = None,
            },
        }
    }

    pub fn apply_all(&mut self, updates: impl IntoIterator<Item = PlaylistUpdate>) {
        for update in updates {
            self.apply(update);
        }
    }
}
