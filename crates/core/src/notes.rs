//! User-facing notes.
//!
//! Ingest, playout and blueprints all report anomalies as notes. A note
//! carries a translatable message and an origin pointing at the rundown
//! entity it concerns, so the UI can show it next to that entity.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::{PartId, PieceId, RundownId, SegmentId};

/// Severity, ordered most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteSeverity {
    Error,
    Warning,
    Info,
}

/// A message key plus arguments. The key is what the UI translates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatableMessage {
    pub key: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub args: Map<String, Value>,
}

impl TranslatableMessage {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            args: Map::new(),
        }
    }

    pub fn with_arg(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.args.insert(name.to_string(), value.into());
        self
    }
}

/// A note stored on a segment or part document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericNote {
    pub severity: NoteSeverity,
    pub message: TranslatableMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteOriginKind {
    Playlist,
    Rundown,
    Segment,
    Part,
    Piece,
}

/// Where a note points to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteOrigin {
    pub kind: NoteOriginKind,
    pub rundown_id: Option<RundownId>,
    pub segment_id: Option<SegmentId>,
    pub part_id: Option<PartId>,
    pub piece_id: Option<PieceId>,
    /// Display name of the entity, for notes whose entity may be gone.
    pub name: Option<String>,
}

impl NoteOrigin {
    pub fn playlist() -> Self {
        Self {
            kind: NoteOriginKind::Playlist,
            rundown_id: None,
            segment_id: None,
            part_id: None,
            piece_id: None,
            name: None,
        }
    }

    pub fn rundown(rundown_id: RundownId) -> Self {
        Self {
            kind: NoteOriginKind::Rundown,
            rundown_id: Some(rundown_id),
            ..Self::playlist()
        }
    }

    pub fn segment(rundown_id: RundownId, segment_id: SegmentId) -> Self {
        Self {
            kind: NoteOriginKind::Segment,
            segment_id: Some(segment_id),
            ..Self::rundown(rundown_id)
        }
    }

    pub fn part(rundown_id: RundownId, segment_id: SegmentId, part_id: PartId) -> Self {
        Self {
            kind: NoteOriginKind::Part,
            part_id: Some(part_id),
            ..Self::segment(rundown_id, segment_id)
        }
    }

    pub fn piece(
        rundown_id: RundownId,
        segment_id: SegmentId,
        part_id: PartId,
        piece_id: PieceId,
    ) -> Self {
        Self {
            kind: NoteOriginKind::Piece,
            piece_id: Some(piece_id),
            ..Self::part(rundown_id, segment_id, part_id)
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Sort position of the origin in the running order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteRank {
    pub rundown: usize,
    pub segment: f64,
    pub part: f64,
}

impl NoteRank {
    fn cmp_total(&self, other: &Self) -> Ordering {
        self.rundown
            .cmp(&other.rundown)
            .then(self.segment.total_cmp(&other.segment))
            .then(self.part.total_cmp(&other.part))
    }
}

/// A note with its origin, as shown in the notification panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedNote {
    pub severity: NoteSeverity,
    pub message: TranslatableMessage,
    pub origin: NoteOrigin,
    #[serde(default)]
    pub rank: NoteRank,
}

impl TrackedNote {
    pub fn new(severity: NoteSeverity, message: TranslatableMessage, origin: NoteOrigin) -> Self {
        Self {
            severity,
            message,
            origin,
            rank: NoteRank::default(),
        }
    }

    pub fn with_rank(mut self, rank: NoteRank) -> Self {
        self.rank = rank;
        self
    }
}

/// Collects notes during one operation.
#[derive(Debug, Default, Clone)]
pub struct NoteCollector {
    notes: Vec<TrackedNote>,
}

impl NoteCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, note: TrackedNote) {
        self.notes.push(note);
    }

    pub fn add(&mut self, severity: NoteSeverity, message: TranslatableMessage, origin: NoteOrigin) {
        self.push(TrackedNote::new(severity, message, origin));
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn notes(&self) -> &[TrackedNote] {
        &self.notes
    }

    pub fn into_notes(self) -> Vec<TrackedNote> {
        self.notes
    }
}

impl Extend<TrackedNote> for NoteCollector {
    fn extend<I: IntoIterator<Item = TrackedNote>>(&mut self, iter: I) {
        self.notes.extend(iter);
    }
}

/// Merge notes from several sources into display order.
///
/// Sorted by severity (errors first), then by the origin's position in the
/// running order. A note repeating the origin and message of an earlier
/// (more severe) one is dropped.
pub fn aggregate_notes<I>(sources: I) -> Vec<TrackedNote>
where
    I: IntoIterator<Item = Vec<TrackedNote>>,
{
    let mut all: Vec<TrackedNote> = sources.into_iter().flatten().collect();
    all.sort_by(|a, b| {
        a.severity
            .cmp(&b.severity)
            .then_with(|| a.rank.cmp_total(&b.rank))
    });

    let mut seen: HashSet<(NoteOrigin, String, String)> = HashSet::new();
    all.retain(|note| {
        let args = Value::Object(note.message.args.clone()).to_string();
        seen.insert((note.origin.clone(), note.message.key.clone(), args))
    });
    all
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(severity: NoteSeverity, key: &str, part: &str, rank: f64) -> TrackedNote {
        TrackedNote::new(
            severity,
            TranslatableMessage::new(key),
            NoteOrigin::part("r1".into(), "s1".into(), part.into()),
        )
        .with_rank(NoteRank {
            rundown: 0,
            segment: 0.0,
            part: rank,
        })
    }

    #[test]
    fn errors_sort_before_warnings() {
        let merged = aggregate_notes(vec![
            vec![note(NoteSeverity::Info, "c", "p1", 0.0)],
            vec![note(NoteSeverity::Error, "a", "p2", 5.0)],
            vec![note(NoteSeverity::Warning, "b", "p1", 0.0)],
        ]);
        let keys: Vec<_> = merged.iter().map(|n| n.message.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn same_severity_sorts_by_running_order() {
        let merged = aggregate_notes(vec![vec![
            note(NoteSeverity::Warning, "late", "p2", 2.0),
            note(NoteSeverity::Warning, "early", "p1", 1.0),
        ]]);
        assert_eq!(merged[0].message.key, "early");
    }

    #[test]
    fn duplicates_keep_most_severe() {
        let merged = aggregate_notes(vec![
            vec![note(NoteSeverity::Warning, "dup", "p1", 0.0)],
            vec![note(NoteSeverity::Error, "dup", "p1", 0.0)],
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].severity, NoteSeverity::Error);
    }

    #[test]
    fn same_key_different_args_is_kept() {
        let mut a = note(NoteSeverity::Info, "k", "p1", 0.0);
        a.message = a.message.with_arg("n", 1);
        let mut b = note(NoteSeverity::Info, "k", "p1", 0.0);
        b.message = b.message.with_arg("n", 2);
        assert_eq!(aggregate_notes(vec![vec![a, b]]).len(), 2);
    }

    #[test]
    fn collector_accumulates() {
        let mut collector = NoteCollector::new();
        collector.add(
            NoteSeverity::Info,
            TranslatableMessage::new("x"),
            NoteOrigin::playlist(),
        );
        assert_eq!(collector.len(), 1);
        assert_eq!(collector.into_notes()[0].origin.kind, NoteOriginKind::Playlist);
    }
}
