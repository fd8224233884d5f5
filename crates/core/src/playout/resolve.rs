//! Resolving which piece instances of a part instance are alive when.
//!
//! Pieces compete per [`PieceKey`]: the source layer's exclusive group (or
//! the source layer itself) together with the output layer. Within a key,
//! pieces are ordered so that later entries take precedence:
//!
//! 1. continuations from earlier parts come before anything native to this
//!    part, so a native piece always pre-empts a carried infinite;
//! 2. then by start offset;
//! 3. on a tie, the narrower lifespan scope comes last and wins.
//!
//! Pieces whose lifespan ends when pre-empted are capped at the start of
//! the next piece in that order. "Change" lifespans are only capped by a
//! newer infinite; under anything else they stay alive and are reported as
//! covered.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use serde_json::json;

use crate::ids::PieceId;
use crate::models::instances::PieceInstance;
use crate::models::rundown::Piece;
use crate::models::show_style::SourceLayers;
use crate::notes::{NoteOrigin, NoteOriginKind, NoteSeverity, TrackedNote, TranslatableMessage};
use crate::types::Duration;

/// What pieces compete for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PieceKey {
    pub group: String,
    pub output_layer_id: String,
}

pub fn piece_key(piece: &Piece, source_layers: &SourceLayers) -> PieceKey {
    let group = source_layers
        .get(&piece.source_layer_id)
        .and_then(|layer| layer.exclusive_group.clone())
        .unwrap_or_else(|| piece.source_layer_id.clone());
    PieceKey {
        group,
        output_layer_id: piece.output_layer_id.clone(),
    }
}

/// A piece instance with its resolved window, relative to the part start.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPieceInstance<'a> {
    pub instance: &'a PieceInstance,
    pub key: PieceKey,
    pub start: Duration,
    /// `None` means open-ended.
    pub end: Option<Duration>,
}

impl ResolvedPieceInstance<'_> {
    pub fn is_alive_at(&self, playhead: Duration) -> bool {
        self.start <= playhead && self.end.map_or(true, |end| end > playhead)
    }
}

type OrderKey = (u8, Duration, Reverse<u32>, Duration, u8);

fn order_key(instance: &PieceInstance) -> OrderKey {
    let specificity = instance.piece.lifespan.scope().specificity();
    match &instance.infinite {
        Some(infinite) if infinite.from_previous_part => (
            0,
            0,
            Reverse(infinite.infinite_instance_index),
            instance.piece.enable.start,
            specificity,
        ),
        _ => (1, instance.piece.enable.start, Reverse(0), 0, specificity),
    }
}

fn start_in_part(instance: &PieceInstance) -> Duration {
    if instance.is_continuation() {
        0
    } else {
        instance.piece.enable.start
    }
}

/// Resolve start and end of every enabled piece instance, grouped by key
/// and in precedence order within each key.
pub fn resolve_piece_timings<'a>(
    instances: &'a [PieceInstance],
    source_layers: &SourceLayers,
) -> BTreeMap<PieceKey, Vec<ResolvedPieceInstance<'a>>> {
    let mut by_key: BTreeMap<PieceKey, Vec<&'a PieceInstance>> = BTreeMap::new();
    for instance in instances.iter().filter(|i| !i.disabled && !i.reset) {
        by_key
            .entry(piece_key(&instance.piece, source_layers))
            .or_default()
            .push(instance);
    }

    by_key
        .into_iter()
        .map(|(key, mut group)| {
            group.sort_by_key(|instance| order_key(instance));
            let starts: Vec<Duration> = group.iter().map(|i| start_in_part(i)).collect();

            let resolved = group
                .iter()
                .enumerate()
                .map(|(index, instance)| {
                    let start = starts[index];
                    let natural_end = instance.piece.enable.duration.map(|d| start + d);
                    let cap = if instance.piece.lifespan.ends_when_preempted() {
                        starts.get(index + 1).copied()
                    } else {
                        group
                            .iter()
                            .zip(&starts)
                            .skip(index + 1)
                            .find(|(later, _)| later.piece.lifespan.is_infinite())
                            .map(|(_, start)| *start)
                    };
                    let end = match (natural_end, cap) {
                        (Some(a), Some(b)) => Some(a.min(b)),
                        (a, b) => a.or(b),
                    };
                    ResolvedPieceInstance {
                        instance,
                        key: key.clone(),
                        start,
                        end,
                    }
                })
                .collect();
            (key, resolved)
        })
        .collect()
}

/// The pieces alive on one key.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveLayer<'a> {
    /// The piece that is seen.
    pub visible: ResolvedPieceInstance<'a>,
    /// Alive underneath `visible`, in precedence order.
    pub covered: Vec<ResolvedPieceInstance<'a>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivePieces<'a> {
    pub layers: BTreeMap<PieceKey, ActiveLayer<'a>>,
    pub notes: Vec<TrackedNote>,
}

impl ActivePieces<'_> {
    /// Whether the piece is alive (visible or covered).
    pub fn contains(&self, piece_id: &PieceId) -> bool {
        self.layers.values().any(|layer| {
            layer.visible.instance.piece.id == *piece_id
                || layer
                    .covered
                    .iter()
                    .any(|resolved| resolved.instance.piece.id == *piece_id)
        })
    }

    pub fn is_visible(&self, piece_id: &PieceId) -> bool {
        self.layers
            .values()
            .any(|layer| layer.visible.instance.piece.id == *piece_id)
    }
}

/// The pieces alive at `playhead` (ms since the part started).
pub fn resolve_active_pieces<'a>(
    instances: &'a [PieceInstance],
    source_layers: &SourceLayers,
    playhead: Duration,
) -> ActivePieces<'a> {
    let resolved = resolve_piece_timings(instances, source_layers);
    let notes = find_lifespan_conflicts(&resolved);

    let layers = resolved
        .into_iter()
        .filter_map(|(key, group)| {
            let mut alive: Vec<_> = group
                .into_iter()
                .filter(|piece| piece.is_alive_at(playhead))
                .collect();
            let visible = alive.pop()?;
            Some((
                key,
                ActiveLayer {
                    visible,
                    covered: alive,
                },
            ))
        })
        .collect();

    ActivePieces { layers, notes }
}

/// Warn about infinites on one key that end when pre-empted and start at
/// the same time: their precedence is decided by scope alone.
pub fn find_lifespan_conflicts(
    resolved: &BTreeMap<PieceKey, Vec<ResolvedPieceInstance<'_>>>,
) -> Vec<TrackedNote> {
    let mut notes = Vec::new();
    for group in resolved.values() {
        for pair in group.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let both_infinite = [a, b].iter().all(|p| {
                let lifespan = p.instance.piece.lifespan;
                lifespan.is_infinite() && lifespan.ends_when_preempted()
            });
            let same_origin = a.instance.is_continuation() == b.instance.is_continuation();
            if both_infinite && same_origin && a.start == b.start {
                notes.push(conflict_note(a.instance, b.instance));
            }
        }
    }
    notes
}

fn conflict_note(loser: &PieceInstance, winner: &PieceInstance) -> TrackedNote {
    let message = TranslatableMessage::new("playout.lifespanConflict")
        .with_arg("piece", winner.piece.name.as_str())
        .with_arg("hidden", loser.piece.name.as_str())
        .with_arg("lifespans", json!([loser.piece.lifespan, winner.piece.lifespan]));
    let origin = NoteOrigin {
        kind: NoteOriginKind::Piece,
        part_id: Some(winner.piece.start_part_id.clone()),
        piece_id: Some(winner.piece.id.clone()),
        ..NoteOrigin::rundown(winner.rundown_id.clone())
    }
    .with_name(winner.piece.name.as_str());
    TrackedNote::new(NoteSeverity::Warning, message, origin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::instances::PartInstance;
    use crate::models::rundown::{Part, PieceEnable, PieceLifespan};
    use crate::models::show_style::SourceLayer;

    fn part_instance(id: &str) -> PartInstance {
        let part = Part {
            id: id.into(),
            segment_id: "s1".into(),
            rundown_id: "r1".into(),
            external_id: id.into(),
            title: id.into(),
            rank: 0.0,
            expected_duration: None,
            autonext: false,
            untimed: false,
            invalid: false,
            floated: false,
            user_edit_operations: Vec::new(),
            notes: Vec::new(),
        };
        PartInstance::new(part, "act".into(), 1)
    }

    fn piece(id: &str, layer: &str, lifespan: PieceLifespan, start: i64) -> Piece {
        Piece {
            id: id.into(),
            start_part_id: "p1".into(),
            external_id: id.into(),
            name: id.into(),
            source_layer_id: layer.into(),
            output_layer_id: "pgm".into(),
            lifespan,
            enable: PieceEnable {
                start,
                duration: None,
            },
            content: serde_json::Value::Null,
            timeline_objects: Vec::new(),
            ab_sessions: Vec::new(),
            virtual_piece: false,
        }
    }

    fn instances(pieces: Vec<Piece>) -> Vec<PieceInstance> {
        let pi = part_instance("p1");
        pieces
            .into_iter()
            .map(|p| PieceInstance::from_piece(p, &pi))
            .collect()
    }

    fn carried(piece: Piece) -> PieceInstance {
        let origin = PieceInstance::from_piece(piece, &part_instance("p0"));
        origin.continuation(&part_instance("p1")).unwrap()
    }

    // -- piece_key ------------------------------------------------------------

    #[test]
    fn exclusive_group_merges_source_layers() {
        let mut layers = SourceLayers::new();
        for id in ["cam", "vt"] {
            layers.insert(
                id.into(),
                SourceLayer {
                    name: id.into(),
                    rank: 0,
                    layer_type: Default::default(),
                    exclusive_group: Some("main".into()),
                    is_hidden: false,
                },
            );
        }
        let a = piece_key(&piece("a", "cam", PieceLifespan::WithinPart, 0), &layers);
        let b = piece_key(&piece("b", "vt", PieceLifespan::WithinPart, 0), &layers);
        let c = piece_key(&piece("c", "gfx", PieceLifespan::WithinPart, 0), &layers);
        assert_eq!(a, b);
        assert_eq!(c.group, "gfx");
    }

    // -- resolve_piece_timings ------------------------------------------------

    #[test]
    fn later_piece_caps_earlier_within_part_piece() {
        let list = instances(vec![
            piece("a", "cam", PieceLifespan::WithinPart, 0),
            piece("b", "cam", PieceLifespan::WithinPart, 2000),
        ]);
        let resolved = resolve_piece_timings(&list, &SourceLayers::new());
        let group = resolved.values().next().unwrap();
        assert_eq!(group[0].end, Some(2000));
        assert_eq!(group[1].end, None);
    }

    #[test]
    fn natural_duration_shorter_than_cap_wins() {
        let mut a = piece("a", "cam", PieceLifespan::WithinPart, 0);
        a.enable.duration = Some(500);
        let list = instances(vec![a, piece("b", "cam", PieceLifespan::WithinPart, 2000)]);
        let resolved = resolve_piece_timings(&list, &SourceLayers::new());
        assert_eq!(resolved.values().next().unwrap()[0].end, Some(500));
    }

    #[test]
    fn disabled_instances_are_ignored() {
        let mut list = instances(vec![
            piece("a", "cam", PieceLifespan::WithinPart, 0),
            piece("b", "cam", PieceLifespan::WithinPart, 1000),
        ]);
        list[1].disabled = true;
        let resolved = resolve_piece_timings(&list, &SourceLayers::new());
        let group = resolved.values().next().unwrap();
        assert_eq!(group.len(), 1);
        assert_eq!(group[0].end, None);
    }

    // -- resolve_active_pieces ------------------------------------------------

    #[test]
    fn native_piece_preempts_carried_end_infinite() {
        let mut list = vec![carried(piece("inf", "cam", PieceLifespan::OutOnSegmentEnd, 0))];
        list.extend(instances(vec![piece("native", "cam", PieceLifespan::WithinPart, 1000)]));

        let before = resolve_active_pieces(&list, &SourceLayers::new(), 500);
        assert!(before.is_visible(&"inf".into()));

        let after = resolve_active_pieces(&list, &SourceLayers::new(), 1500);
        assert!(after.is_visible(&"native".into()));
        assert!(!after.contains(&"inf".into()));
    }

    #[test]
    fn change_lifespan_is_covered_not_ended() {
        let mut list = vec![carried(piece("inf", "cam", PieceLifespan::OutOnRundownChange, 0))];
        let mut native = piece("native", "cam", PieceLifespan::WithinPart, 1000);
        native.enable.duration = Some(1000);
        list.extend(instances(vec![native]));

        let during = resolve_active_pieces(&list, &SourceLayers::new(), 1500);
        let layer = during.layers.values().next().unwrap();
        assert_eq!(layer.visible.instance.piece.id, PieceId::new("native"));
        assert_eq!(layer.covered[0].instance.piece.id, PieceId::new("inf"));

        let after = resolve_active_pieces(&list, &SourceLayers::new(), 2500);
        assert!(after.is_visible(&"inf".into()));
    }

    #[test]
    fn native_at_zero_beats_carried_at_zero() {
        let mut list = vec![carried(piece("inf", "cam", PieceLifespan::OutOnRundownChange, 0))];
        list.extend(instances(vec![piece("native", "cam", PieceLifespan::WithinPart, 0)]));
        let active = resolve_active_pieces(&list, &SourceLayers::new(), 0);
        assert!(active.is_visible(&"native".into()));
        assert!(active.contains(&"inf".into()));
    }

    #[test]
    fn later_start_wins_between_infinites() {
        let list = instances(vec![
            piece("rundown", "cam", PieceLifespan::OutOnRundownEnd, 1000),
            piece("segment", "cam", PieceLifespan::OutOnSegmentEnd, 0),
        ]);
        let active = resolve_active_pieces(&list, &SourceLayers::new(), 1500);
        assert!(active.is_visible(&"rundown".into()));
        assert!(!active.contains(&"segment".into()));
    }

    #[test]
    fn equal_start_narrower_scope_wins_and_warns() {
        let list = instances(vec![
            piece("segment", "cam", PieceLifespan::OutOnSegmentEnd, 0),
            piece("showstyle", "cam", PieceLifespan::OutOnShowStyleEnd, 0),
        ]);
        let active = resolve_active_pieces(&list, &SourceLayers::new(), 10);
        assert!(active.is_visible(&"segment".into()));
        assert_eq!(active.notes.len(), 1);
        assert_eq!(active.notes[0].message.key, "playout.lifespanConflict");
        assert_eq!(active.notes[0].severity, NoteSeverity::Warning);
    }

    #[test]
    fn newer_continuation_ends_older_change_infinite() {
        let old = carried(piece("old", "cam", PieceLifespan::OutOnRundownChange, 0));
        let newer_origin = PieceInstance::from_piece(
            piece("new", "cam", PieceLifespan::OutOnSegmentChange, 500),
            &part_instance("p0b"),
        );
        let mut older = old.clone();
        if let Some(infinite) = older.infinite.as_mut() {
            infinite.infinite_instance_index = 3;
        }
        let newer = newer_origin.continuation(&part_instance("p1")).unwrap();
        let list = vec![newer, older];
        let active = resolve_active_pieces(&list, &SourceLayers::new(), 0);
        assert!(active.is_visible(&"new".into()));
        assert!(!active.contains(&"old".into()));
    }

    #[test]
    fn native_infinite_ends_carried_change_infinite_when_it_starts() {
        let mut list = vec![carried(piece("inf", "cam", PieceLifespan::OutOnRundownChange, 0))];
        list.extend(instances(vec![piece("next", "cam", PieceLifespan::OutOnRundownChange, 1000)]));

        let resolved = resolve_piece_timings(&list, &SourceLayers::new());
        let group = resolved.values().next().unwrap();
        assert_eq!(group[0].instance.piece.id, PieceId::new("inf"));
        assert_eq!(group[0].end, Some(1000));

        let after = resolve_active_pieces(&list, &SourceLayers::new(), 1500);
        let layer = after.layers.values().next().unwrap();
        assert_eq!(layer.visible.instance.piece.id, PieceId::new("next"));
        assert!(layer.covered.is_empty());
    }

    #[test]
    fn different_keys_do_not_interact() {
        let list = instances(vec![
            piece("a", "cam", PieceLifespan::WithinPart, 0),
            piece("b", "gfx", PieceLifespan::WithinPart, 1000),
        ]);
        let active = resolve_active_pieces(&list, &SourceLayers::new(), 1500);
        assert_eq!(active.layers.len(), 2);
    }
}
