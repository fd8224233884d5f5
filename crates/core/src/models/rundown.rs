//! Rundown content: rundowns, segments, parts and pieces.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{
    PartId, PieceId, RundownId, RundownPlaylistId, SegmentId, ShowStyleBaseId,
    ShowStyleVariantId, StudioId,
};
use crate::models::timeline::{AbSessionRequest, TimelineObject};
use crate::notes::GenericNote;
use crate::types::Duration;

// ---------------------------------------------------------------------------
// Rundown
// ---------------------------------------------------------------------------

/// Which external system a rundown came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RundownSource {
    /// E.g. `"mos"`, `"inews"`, `"spreadsheet"`.
    pub nrcs_type: String,
    pub external_id: String,
}

/// Why a rundown is still around although the NRCS no longer wants it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RundownOrphanedReason {
    /// Deleted by the NRCS while on air.
    Deleted,
    /// Being moved to another playlist while on air.
    Moving,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rundown {
    pub id: RundownId,
    pub name: String,
    pub studio_id: StudioId,
    pub show_style_base_id: ShowStyleBaseId,
    pub show_style_variant_id: ShowStyleVariantId,
    pub playlist_id: RundownPlaylistId,
    pub source: RundownSource,
    #[serde(default)]
    pub orphaned: Option<RundownOrphanedReason>,
    #[serde(default)]
    pub metadata: Value,
}

impl Rundown {
    pub fn external_id(&self) -> &str {
        &self.source.external_id
    }
}

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountdownType {
    PartExpectedDuration,
    SegmentBudgetDuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserEditTarget {
    Segment,
    Part,
    Piece,
}

/// An edit the operator may apply from the UI, declared by the blueprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEditOperation {
    pub id: String,
    pub label: String,
    pub target: UserEditTarget,
    /// The `user_edit_states` key toggled by this operation.
    #[serde(default)]
    pub state_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub rundown_id: RundownId,
    pub external_id: String,
    pub name: String,
    pub rank: f64,
    #[serde(default)]
    pub budget_duration: Option<Duration>,
    #[serde(default)]
    pub countdown_type: Option<CountdownType>,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default)]
    pub user_edit_operations: Vec<UserEditOperation>,
    #[serde(default)]
    pub notes: Vec<GenericNote>,
}

// ---------------------------------------------------------------------------
// Part
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub id: PartId,
    pub segment_id: SegmentId,
    pub rundown_id: RundownId,
    pub external_id: String,
    pub title: String,
    pub rank: f64,
    #[serde(default)]
    pub expected_duration: Option<Duration>,
    /// Take the next part automatically when the expected duration elapses.
    #[serde(default)]
    pub autonext: bool,
    #[serde(default)]
    pub untimed: bool,
    /// Cannot be played, e.g. the blueprint rejected its content.
    #[serde(default)]
    pub invalid: bool,
    /// Temporarily taken out of the running order by the operator.
    #[serde(default)]
    pub floated: bool,
    #[serde(default)]
    pub user_edit_operations: Vec<UserEditOperation>,
    #[serde(default)]
    pub notes: Vec<GenericNote>,
}

impl Part {
    pub fn is_playable(&self) -> bool {
        !self.invalid && !self.floated
    }

    /// Expected duration when it should drive an autonext.
    pub fn autonext_duration(&self) -> Option<Duration> {
        match self.expected_duration {
            Some(duration) if self.autonext && duration > 0 => Some(duration),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Piece
// ---------------------------------------------------------------------------

/// How far a piece may live past its own part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PieceLifespan {
    WithinPart,
    OutOnSegmentChange,
    OutOnSegmentEnd,
    OutOnRundownChange,
    OutOnRundownEnd,
    OutOnShowStyleEnd,
}

/// The boundary a lifespan is bounded by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifespanScope {
    Part,
    Segment,
    Rundown,
    ShowStyle,
}

impl LifespanScope {
    /// Specificity, narrowest highest. Used to order infinites that start at
    /// the same time so the narrower scope ends up on top.
    pub fn specificity(self) -> u8 {
        match self {
            Self::Part => 3,
            Self::Segment => 2,
            Self::Rundown => 1,
            Self::ShowStyle => 0,
        }
    }
}

impl PieceLifespan {
    pub fn scope(self) -> LifespanScope {
        match self {
            Self::WithinPart => LifespanScope::Part,
            Self::OutOnSegmentChange | Self::OutOnSegmentEnd => LifespanScope::Segment,
            Self::OutOnRundownChange | Self::OutOnRundownEnd => LifespanScope::Rundown,
            Self::OutOnShowStyleEnd => LifespanScope::ShowStyle,
        }
    }

    /// Whether the piece may continue into later parts.
    pub fn is_infinite(self) -> bool {
        !matches!(self, Self::WithinPart)
    }

    /// Whether a later piece on the same layer ends this piece for good.
    ///
    /// The "change" lifespans survive being covered by a piece confined to
    /// its part and become visible again once uncovered. A newer infinite on
    /// the same layer still ends them.
    pub fn ends_when_preempted(self) -> bool {
        !matches!(self, Self::OutOnSegmentChange | Self::OutOnRundownChange)
    }
}

/// Timing of a piece relative to the start of its part.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceEnable {
    pub start: Duration,
    #[serde(default)]
    pub duration: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Piece {
    pub id: PieceId,
    /// The part the piece was placed in.
    pub start_part_id: PartId,
    pub external_id: String,
    pub name: String,
    pub source_layer_id: String,
    pub output_layer_id: String,
    pub lifespan: PieceLifespan,
    #[serde(default)]
    pub enable: PieceEnable,
    #[serde(default)]
    pub content: Value,
    /// Templates, timed relative to the piece start.
    #[serde(default)]
    pub timeline_objects: Vec<TimelineObject>,
    #[serde(default)]
    pub ab_sessions: Vec<AbSessionRequest>,
    /// Placeholder pieces that only stop an infinite.
    #[serde(default)]
    pub virtual_piece: bool,
}

// ---------------------------------------------------------------------------
// Ranks
// ---------------------------------------------------------------------------

/// Anything ordered by a floating-point rank.
pub trait Ranked {
    fn rank(&self) -> f64;
    fn set_rank(&mut self, rank: f64);
}

impl Ranked for Segment {
    fn rank(&self) -> f64 {
        self.rank
    }
    fn set_rank(&mut self, rank: f64) {
        self.rank = rank;
    }
}

impl Ranked for Part {
    fn rank(&self) -> f64 {
        self.rank
    }
    fn set_rank(&mut self, rank: f64) {
        self.rank = rank;
    }
}

/// Sort by rank and make ranks strictly increasing.
///
/// The sort is stable, so items of equal rank keep their insertion order.
/// If any two ranks tie (or are NaN), every item is renumbered to its index.
/// Returns whether ranks were rewritten.
pub fn normalize_ranks<T: Ranked>(items: &mut [T]) -> bool {
    items.sort_by(|a, b| a.rank().total_cmp(&b.rank()));

    let strictly_increasing = items.iter().all(|item| !item.rank().is_nan())
        && items.windows(2).all(|pair| pair[0].rank() < pair[1].rank());
    if strictly_increasing {
        return false;
    }

    for (index, item) in items.iter_mut().enumerate() {
        item.set_rank(index as f64);
    }
    true
}
