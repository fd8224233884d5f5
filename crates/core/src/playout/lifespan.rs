//! Carrying infinite pieces from one part instance into the next.

use std::collections::HashSet;

use crate::ids::{RundownId, SegmentId, ShowStyleVariantId};
use crate::models::instances::{PartInstance, PieceInstance};
use crate::models::rundown::{Piece, PieceLifespan};
use crate::models::show_style::SourceLayers;
use crate::playout::resolve::{piece_key, resolve_piece_timings, PieceKey};

/// Where a part sits, for lifespan scope checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartPosition<'a> {
    pub segment_id: &'a SegmentId,
    pub rundown_id: &'a RundownId,
    pub show_style_variant_id: &'a ShowStyleVariantId,
}

/// Whether a piece with `lifespan` placed at `from` is still in scope at
/// `to`.
pub fn continues_into(lifespan: PieceLifespan, from: &PartPosition<'_>, to: &PartPosition<'_>) -> bool {
    match lifespan {
        PieceLifespan::WithinPart => false,
        PieceLifespan::OutOnSegmentChange | PieceLifespan::OutOnSegmentEnd => {
            from.rundown_id == to.rundown_id && from.segment_id == to.segment_id
        }
        PieceLifespan::OutOnRundownChange | PieceLifespan::OutOnRundownEnd => {
            from.rundown_id == to.rundown_id
        }
        PieceLifespan::OutOnShowStyleEnd => {
            from.show_style_variant_id == to.show_style_variant_id
        }
    }
}

/// The part instance being left, with its pieces.
#[derive(Debug, Clone, Copy)]
pub struct PreviousPartInstance<'a> {
    pub instance: &'a PartInstance,
    pub pieces: &'a [PieceInstance],
    pub position: PartPosition<'a>,
}

/// Build the piece instances of a new part instance: its own pieces plus
/// the infinites continuing from `previous`.
///
/// An infinite from the previous part is carried when its scope reaches
/// the new part and it had not ended there already. It is also dropped when
/// the new part has its own piece on the same key at offset 0; for "change"
/// lifespans that piece must itself be infinite. A piece native to the new
/// part is never carried in as well, so each key carries at most the newest
/// infinite.
pub fn build_part_instance_pieces(
    new_instance: &PartInstance,
    pieces: &[Piece],
    position: &PartPosition<'_>,
    previous: Option<PreviousPartInstance<'_>>,
    source_layers: &SourceLayers,
) -> Vec<PieceInstance> {
    let mut result: Vec<PieceInstance> = pieces
        .iter()
        .filter(|piece| piece.start_part_id == new_instance.part.id)
        .map(|piece| PieceInstance::from_piece(piece.clone(), new_instance))
        .collect();

    let Some(previous) = previous else {
        return result;
    };

    let native_ids: HashSet<_> = result.iter().map(|p| p.piece.id.clone()).collect();
    let blocked_at_start: HashSet<PieceKey> = result
        .iter()
        .filter(|p| p.piece.enable.start == 0)
        .map(|p| piece_key(&p.piece, source_layers))
        .collect();
    let superseded_at_start: HashSet<PieceKey> = result
        .iter()
        .filter(|p| p.piece.enable.start == 0 && p.piece.lifespan.is_infinite())
        .map(|p| piece_key(&p.piece, source_layers))
        .collect();

    let resolved = resolve_piece_timings(previous.pieces, source_layers);
    let mut carried = Vec::new();

    for candidate in resolved.values().flatten() {
        let instance = candidate.instance;
        let lifespan = instance.piece.lifespan;
        if !lifespan.is_infinite() || native_ids.contains(&instance.piece.id) {
            continue;
        }
        if !continues_into(lifespan, &previous.position, position) {
            continue;
        }
        // Capped by its duration, a later piece or a newer infinite.
        if candidate.end.is_some() {
            continue;
        }
        let replaced = if lifespan.ends_when_preempted() {
            &blocked_at_start
        } else {
            &superseded_at_start
        };
        if replaced.contains(&candidate.key) {
            continue;
        }
        if let Some(continuation) = instance.continuation(new_instance) {
            carried.push(continuation);
        }
    }

    tracing::debug!(
        part_instance_id = %new_instance.id,
        native = result.len(),
        carried = carried.len(),
        "Built piece instances",
    );

    result.extend(carried);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::PartId;
    use crate::models::rundown::{Part, PieceEnable};
    use crate::playout::resolve::resolve_active_pieces;

    fn part(id: &str, segment: &str) -> Part {
        Part {
            id: id.into(),
            segment_id: segment.into(),
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
        }
    }

    fn piece(id: &str, part: &str, lifespan: PieceLifespan, start: i64) -> Piece {
        Piece {
            id: id.into(),
            start_part_id: part.into(),
            external_id: id.into(),
            name: id.into(),
            source_layer_id: "cam".into(),
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

    struct Fixture {
        instance: PartInstance,
        segment: SegmentId,
        rundown: RundownId,
        variant: ShowStyleVariantId,
    }

    impl Fixture {
        fn new(part: Part, take: u64) -> Self {
            Self {
                segment: part.segment_id.clone(),
                rundown: part.rundown_id.clone(),
                variant: "variant".into(),
                instance: PartInstance::new(part, "act".into(), take),
            }
        }

        fn position(&self) -> PartPosition<'_> {
            PartPosition {
                segment_id: &self.segment,
                rundown_id: &self.rundown,
                show_style_variant_id: &self.variant,
            }
        }
    }

    fn play(
        first: &Fixture,
        first_pieces: &[Piece],
        second: &Fixture,
        second_pieces: &[Piece],
    ) -> Vec<PieceInstance> {
        let previous_pieces =
            build_part_instance_pieces(&first.instance, first_pieces, &first.position(), None, &SourceLayers::new());
        build_part_instance_pieces(
            &second.instance,
            second_pieces,
            &second.position(),
            Some(PreviousPartInstance {
                instance: &first.instance,
                pieces: &previous_pieces,
                position: first.position(),
            }),
            &SourceLayers::new(),
        )
    }

    // -- continues_into -------------------------------------------------------

    #[test]
    fn scopes_bound_continuation() {
        let (s1, s2): (SegmentId, SegmentId) = ("s1".into(), "s2".into());
        let (r1, r2): (RundownId, RundownId) = ("r1".into(), "r2".into());
        let v: ShowStyleVariantId = "v".into();
        let a = PartPosition { segment_id: &s1, rundown_id: &r1, show_style_variant_id: &v };
        let same_rundown = PartPosition { segment_id: &s2, rundown_id: &r1, show_style_variant_id: &v };
        let other_rundown = PartPosition { segment_id: &s2, rundown_id: &r2, show_style_variant_id: &v };

        assert!(!continues_into(PieceLifespan::WithinPart, &a, &a));
        assert!(continues_into(PieceLifespan::OutOnSegmentEnd, &a, &a));
        assert!(!continues_into(PieceLifespan::OutOnSegmentChange, &a, &same_rundown));
        assert!(continues_into(PieceLifespan::OutOnRundownEnd, &a, &same_rundown));
        assert!(!continues_into(PieceLifespan::OutOnRundownChange, &a, &other_rundown));
        assert!(continues_into(PieceLifespan::OutOnShowStyleEnd, &a, &other_rundown));
    }

    // -- build_part_instance_pieces -------------------------------------------

    #[test]
    fn within_part_piece_is_never_carried() {
        let first = Fixture::new(part("p1", "s1"), 1);
        let second = Fixture::new(part("p2", "s1"), 2);
        let pieces = play(&first, &[piece("a", "p1", PieceLifespan::WithinPart, 0)], &second, &[]);
        assert!(pieces.is_empty());
    }

    #[test]
    fn segment_infinite_carries_within_segment_only() {
        let first = Fixture::new(part("p1", "s1"), 1);
        let inf = [piece("inf", "p1", PieceLifespan::OutOnSegmentEnd, 0)];

        let same = Fixture::new(part("p2", "s1"), 2);
        let carried = play(&first, &inf, &same, &[]);
        assert_eq!(carried.len(), 1);
        assert!(carried[0].is_continuation());

        let other = Fixture::new(part("p2", "s2"), 2);
        assert!(play(&first, &inf, &other, &[]).is_empty());
    }

    #[test]
    fn preempted_end_infinite_is_not_carried() {
        let first = Fixture::new(part("p1", "s1"), 1);
        let second = Fixture::new(part("p2", "s1"), 2);
        let pieces = play(
            &first,
            &[
                piece("inf", "p1", PieceLifespan::OutOnSegmentEnd, 0),
                piece("cut", "p1", PieceLifespan::WithinPart, 3000),
            ],
            &second,
            &[],
        );
        assert!(pieces.is_empty());
    }

    #[test]
    fn covered_change_infinite_is_carried() {
        let first = Fixture::new(part("p1", "s1"), 1);
        let second = Fixture::new(part("p2", "s1"), 2);
        let pieces = play(
            &first,
            &[
                piece("inf", "p1", PieceLifespan::OutOnSegmentChange, 0),
                piece("cut", "p1", PieceLifespan::WithinPart, 3000),
            ],
            &second,
            &[],
        );
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].piece.id.as_str(), "inf");
    }

    #[test]
    fn native_piece_at_zero_blocks_end_infinite() {
        let first = Fixture::new(part("p1", "s1"), 1);
        let second = Fixture::new(part("p2", "s1"), 2);
        let pieces = play(
            &first,
            &[piece("inf", "p1", PieceLifespan::OutOnSegmentEnd, 0)],
            &second,
            &[piece("p2cam", "p2", PieceLifespan::OutOnSegmentEnd, 0)],
        );
        let ids: Vec<_> = pieces.iter().map(|p| p.piece.id.as_str()).collect();
        assert_eq!(ids, vec!["p2cam"]);
    }

    #[test]
    fn preemption_after_take() {
        // P1 (segment end, part N) and P2 (same layer, part N+1): after the
        // take P1 is gone and P2 is alive.
        let first = Fixture::new(part("pN", "s1"), 1);
        let second = Fixture::new(part("pN1", "s1"), 2);
        let pieces = play(
            &first,
            &[piece("P1", "pN", PieceLifespan::OutOnSegmentEnd, 0)],
            &second,
            &[piece("P2", "pN1", PieceLifespan::WithinPart, 0)],
        );
        let active = resolve_active_pieces(&pieces, &SourceLayers::new(), 0);
        assert!(!active.contains(&"P1".into()));
        assert!(active.is_visible(&"P2".into()));
    }

    #[test]
    fn change_infinites_do_not_stack_across_parts() {
        let fixtures: Vec<Fixture> = (0..5)
            .map(|n| Fixture::new(part(&format!("p{n}"), "s1"), n + 1))
            .collect();

        let mut previous: Option<(usize, Vec<PieceInstance>)> = None;
        for (n, fixture) in fixtures.iter().enumerate() {
            let own = [piece(&format!("gfx{n}"), &format!("p{n}"), PieceLifespan::OutOnRundownChange, 0)];
            let built = build_part_instance_pieces(
                &fixture.instance,
                &own,
                &fixture.position(),
                previous.as_ref().map(|(index, pieces)| PreviousPartInstance {
                    instance: &fixtures[*index].instance,
                    pieces,
                    position: fixtures[*index].position(),
                }),
                &SourceLayers::new(),
            );
            assert!(built.len() <= 2, "part {n} holds {} pieces", built.len());
            previous = Some((n, built));
        }

        let (_, last) = previous.unwrap();
        let active = resolve_active_pieces(&last, &SourceLayers::new(), 0);
        assert!(active.is_visible(&"gfx4".into()));
        assert!(!active.contains(&"gfx3".into()));
    }

    #[test]
    fn change_infinite_outlives_a_later_infinite_that_starts_mid_part() {
        let first = Fixture::new(part("p1", "s1"), 1);
        let second = Fixture::new(part("p2", "s1"), 2);
        let pieces = play(
            &first,
            &[piece("inf", "p1", PieceLifespan::OutOnRundownChange, 0)],
            &second,
            &[piece("late", "p2", PieceLifespan::OutOnRundownChange, 2000)],
        );
        let ids: Vec<_> = pieces.iter().map(|p| p.piece.id.as_str()).collect();
        assert_eq!(ids, vec!["late", "inf"]);

        let third = Fixture::new(part("p3", "s1"), 3);
        let next = build_part_instance_pieces(
            &third.instance,
            &[],
            &third.position(),
            Some(PreviousPartInstance {
                instance: &second.instance,
                pieces: &pieces,
                position: second.position(),
            }),
            &SourceLayers::new(),
        );
        let ids: Vec<_> = next.iter().map(|p| p.piece.id.as_str()).collect();
        assert_eq!(ids, vec!["late"]);
    }

    #[test]
    fn pieces_of_other_parts_are_ignored() {
        let first = Fixture::new(part("p1", "s1"), 1);
        let stray = piece("stray", "elsewhere", PieceLifespan::WithinPart, 0);
        let pieces = build_part_instance_pieces(
            &first.instance,
            &[stray],
            &first.position(),
            None,
            &SourceLayers::new(),
        );
        assert!(pieces.is_empty());
        assert_eq!(first.instance.part.id, PartId::new("p1"));
    }
}
