//! Part and piece instances: the played realisation of parts and pieces.
//!
//! A part instance copies its part when it is set as next, so later ingest
//! edits to the part do not disturb what is on air. The same part may get
//! several instances over a show (replays after a reset or a loop).

use serde::{Deserialize, Serialize};

use crate::ids::{
    ActivationId, PartInstanceId, PieceId, PieceInstanceId, PieceInstanceInfiniteId, RundownId,
    SegmentId,
};
use crate::models::rundown::{Part, Piece};
use crate::types::Time;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartInstanceOrphaned {
    /// The part was removed by ingest while the instance was playing.
    Deleted,
    /// The part only exists as this instance (queued by an action).
    AdlibPart,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartInstanceTimings {
    pub set_as_next: Option<Time>,
    pub take: Option<Time>,
    pub planned_started_playback: Option<Time>,
    pub planned_stopped_playback: Option<Time>,
    pub reported_started_playback: Option<Time>,
    pub reported_stopped_playback: Option<Time>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartInstance {
    pub id: PartInstanceId,
    pub rundown_id: RundownId,
    pub segment_id: SegmentId,
    pub playlist_activation_id: ActivationId,
    /// Monotonic per playlist activation; orders instances by take.
    pub take_count: u64,
    pub part: Part,
    #[serde(default)]
    pub is_taken: bool,
    /// Hidden from playout after a playlist reset, kept for history.
    #[serde(default)]
    pub reset: bool,
    #[serde(default)]
    pub orphaned: Option<PartInstanceOrphaned>,
    /// Set when this instance took over the playlist's queued segment.
    #[serde(default)]
    pub consumes_queued_segment_id: bool,
    #[serde(default)]
    pub timings: PartInstanceTimings,
}

impl PartInstance {
    pub fn new(part: Part, activation_id: ActivationId, take_count: u64) -> Self {
        let id = PartInstanceId::from_hash(&[
            activation_id.as_str(),
            part.id.as_str(),
            &take_count.to_string(),
        ]);
        Self {
            id,
            rundown_id: part.rundown_id.clone(),
            segment_id: part.segment_id.clone(),
            playlist_activation_id: activation_id,
            take_count,
            part,
            is_taken: false,
            reset: false,
            orphaned: None,
            consumes_queued_segment_id: false,
            timings: PartInstanceTimings::default(),
        }
    }

    /// Best known playback start: reported by the device layer, else
    /// planned by the take.
    pub fn started_playback(&self) -> Option<Time> {
        self.timings
            .reported_started_playback
            .or(self.timings.planned_started_playback)
    }
}

/// Links the continuations of one infinite piece across part instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceInstanceInfinite {
    pub infinite_instance_id: PieceInstanceInfiniteId,
    /// 0 in the part that started it, +1 per continuation.
    pub infinite_instance_index: u32,
    pub infinite_piece_id: PieceId,
    /// Carried over from the previous part instance.
    pub from_previous_part: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PieceInstance {
    pub id: PieceInstanceId,
    pub rundown_id: RundownId,
    pub part_instance_id: PartInstanceId,
    pub playlist_activation_id: ActivationId,
    pub piece: Piece,
    #[serde(default)]
    pub infinite: Option<PieceInstanceInfinite>,
    /// Inserted during playout by an action rather than by ingest.
    #[serde(default)]
    pub dynamically_inserted: Option<Time>,
    #[serde(default)]
    pub planned_started_playback: Option<Time>,
    #[serde(default)]
    pub planned_stopped_playback: Option<Time>,
    #[serde(default)]
    pub reported_started_playback: Option<Time>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub reset: bool,
}

impl PieceInstance {
    /// Instantiate a piece of `part_instance`'s own part.
    pub fn from_piece(piece: Piece, part_instance: &PartInstance) -> Self {
        let id = PieceInstanceId::from_hash(&[part_instance.id.as_str(), piece.id.as_str()]);
        let infinite = piece.lifespan.is_infinite().then(|| PieceInstanceInfinite {
            infinite_instance_id: PieceInstanceInfiniteId::from_hash(&[
                part_instance.id.as_str(),
                piece.id.as_str(),
                "infinite",
            ]),
            infinite_instance_index: 0,
            infinite_piece_id: piece.id.clone(),
            from_previous_part: false,
        });
        Self {
            id,
            rundown_id: part_instance.rundown_id.clone(),
            part_instance_id: part_instance.id.clone(),
            playlist_activation_id: part_instance.playlist_activation_id.clone(),
            piece,
            infinite,
            dynamically_inserted: None,
            planned_started_playback: None,
            planned_stopped_playback: None,
            reported_started_playback: None,
            disabled: false,
            reset: false,
        }
    }

    /// The continuation of this infinite in the following part instance.
    /// Returns `None` for pieces that are not infinite.
    pub fn continuation(&self, part_instance: &PartInstance) -> Option<Self> {
        let infinite = self.infinite.as_ref()?;
        Some(Self {
            id: PieceInstanceId::from_hash(&[
                part_instance.id.as_str(),
                infinite.infinite_instance_id.as_str(),
            ]),
            rundown_id: part_instance.rundown_id.clone(),
            part_instance_id: part_instance.id.clone(),
            playlist_activation_id: part_instance.playlist_activation_id.clone(),
            piece: self.piece.clone(),
            infinite: Some(PieceInstanceInfinite {
                infinite_instance_id: infinite.infinite_instance_id.clone(),
                infinite_instance_index: infinite.infinite_instance_index + 1,
                infinite_piece_id: infinite.infinite_piece_id.clone(),
                from_previous_part: true,
            }),
            dynamically_inserted: self.dynamically_inserted,
            planned_started_playback: self.planned_started_playback,
            planned_stopped_playback: None,
            reported_started_playback: self.reported_started_playback,
            disabled: self.disabled,
            reset: false,
        })
    }

    pub fn is_continuation(&self) -> bool {
        self.infinite
            .as_ref()
            .is_some_and(|infinite| infinite.from_previous_part)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rundown::{PieceEnable, PieceLifespan};

    fn part() -> Part {
        Part {
            id: "p1".into(),
            segment_id: "s1".into(),
            rundown_id: "r1".into(),
            external_id: "p1".into(),
            title: "Part".into(),
            rank: 0.0,
            expected_duration: None,
            autonext: false,
            untimed: false,
            invalid: false,
            floated: false,
            user_edit_operations: Vec::new(),
            notes: Vec::new(),
        }
    }

    fn piece(lifespan: PieceLifespan) -> Piece {
        Piece {
            id: "pc1".into(),
            start_part_id: "p1".into(),
            external_id: "pc1".into(),
            name: "Piece".into(),
            source_layer_id: "cam".into(),
            output_layer_id: "pgm".into(),
            lifespan,
            enable: PieceEnable::default(),
            content: serde_json::Value::Null,
            timeline_objects: Vec::new(),
            ab_sessions: Vec::new(),
            virtual_piece: false,
        }
    }

    #[test]
    fn instance_ids_differ_per_take() {
        let a = PartInstance::new(part(), "act".into(), 1);
        let b = PartInstance::new(part(), "act".into(), 2);
        assert_ne!(a.id, b.id);
        assert_eq!(a.segment_id, SegmentId::new("s1"));
    }

    #[test]
    fn within_part_piece_is_not_infinite() {
        let pi = PartInstance::new(part(), "act".into(), 1);
        let instance = PieceInstance::from_piece(piece(PieceLifespan::WithinPart), &pi);
        assert!(instance.infinite.is_none());
        assert!(instance.continuation(&pi).is_none());
    }

    #[test]
    fn continuation_keeps_infinite_instance_id() {
        let first = PartInstance::new(part(), "act".into(), 1);
        let second = PartInstance::new(part(), "act".into(), 2);
        let origin = PieceInstance::from_piece(piece(PieceLifespan::OutOnSegmentEnd), &first);
        let next = origin.continuation(&second).unwrap();

        let (a, b) = (origin.infinite.unwrap(), next.infinite.clone().unwrap());
        assert_eq!(a.infinite_instance_id, b.infinite_instance_id);
        assert_eq!(b.infinite_instance_index, 1);
        assert!(next.is_continuation());
        assert_eq!(next.part_instance_id, second.id);
    }
}
