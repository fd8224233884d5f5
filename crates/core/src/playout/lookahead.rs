//! Lookahead: cueing what is coming up on a layer before it is taken.

use crate::models::rundown::Piece;
use crate::models::studio::{LookaheadMode, Mapping, MappingsExt};
use crate::models::timeline::{TimelineEnable, TimelineObject};

/// Objects looked ahead for per layer, unless the mapping says otherwise.
pub const DEFAULT_LOOKAHEAD_DEPTH: usize = 1;

/// Parts searched per layer, unless the mapping or studio says otherwise.
pub const DEFAULT_LOOKAHEAD_MAX_SEARCH_DISTANCE: usize = 10;

/// Below every real object.
pub const LOOKAHEAD_PRIORITY: f64 = 0.1;

/// Pieces of one part, in the order their objects should be considered.
#[derive(Debug, Clone)]
pub struct LookaheadPart<'a> {
    pub pieces: Vec<&'a Piece>,
}

impl<'a> LookaheadPart<'a> {
    pub fn new(pieces: impl IntoIterator<Item = &'a Piece>) -> Self {
        let mut pieces: Vec<&'a Piece> = pieces.into_iter().collect();
        pieces.sort_by_key(|piece| piece.enable.start);
        Self { pieces }
    }

    fn first_object_on(&self, layer: &str) -> Option<(&'a Piece, &'a TimelineObject)> {
        self.pieces.iter().copied().find_map(|piece| {
            piece
                .timeline_objects
                .iter()
                .find(|obj| obj.layer == layer)
                .map(|obj| (piece, obj))
        })
    }

    fn occupies(&self, layer: &str) -> bool {
        self.first_object_on(layer).is_some()
    }
}

#[derive(Debug, Clone)]
pub struct LookaheadInput<'a> {
    pub mappings: &'a MappingsExt,
    /// The part on air.
    pub current: Option<LookaheadPart<'a>>,
    /// The next part first, then the parts after it in playout order.
    pub upcoming: Vec<LookaheadPart<'a>>,
    /// Studio setting, used when a mapping has none.
    pub default_max_search_distance: usize,
}

/// Lookahead objects for every mapping with lookahead enabled.
pub fn find_lookahead_objects(input: &LookaheadInput<'_>) -> Vec<TimelineObject> {
    let mut objects = Vec::new();

    for (layer, mapping) in input.mappings {
        if mapping.lookahead == LookaheadMode::None {
            continue;
        }
        if mapping.lookahead == LookaheadMode::WhenClear
            && input.current.as_ref().is_some_and(|part| part.occupies(layer))
        {
            continue;
        }

        let found = find_for_layer(layer, mapping, input);
        tracing::debug!(layer = %layer, found = found.len(), "Lookahead search");
        objects.extend(
            found
                .into_iter()
                .map(|(piece, obj)| lookahead_object(layer, mapping.lookahead, piece, obj)),
        );
    }

    objects
}

fn find_for_layer<'a>(
    layer: &str,
    mapping: &Mapping,
    input: &LookaheadInput<'a>,
) -> Vec<(&'a Piece, &'a TimelineObject)> {
    let depth = mapping.lookahead_depth.unwrap_or(DEFAULT_LOOKAHEAD_DEPTH);
    let distance = mapping
        .lookahead_max_search_distance
        .unwrap_or(input.default_max_search_distance);

    input
        .upcoming
        .iter()
        .take(distance)
        .filter_map(|part| part.first_object_on(layer))
        .take(depth)
        .collect()
}

fn lookahead_object(
    layer: &str,
    mode: LookaheadMode,
    piece: &Piece,
    obj: &TimelineObject,
) -> TimelineObject {
    let mut lookahead = TimelineObject::new(
        format!("lookahead_{}_{}", piece.id, obj.id),
        layer,
        TimelineEnable::always(),
    )
    .with_content(obj.content.clone())
    .with_priority(LOOKAHEAD_PRIORITY);

    lookahead.is_lookahead = true;
    lookahead.classes = obj.classes.clone();
    lookahead.ab_session = obj.ab_session.clone();
    lookahead.keyframes = obj
        .keyframes
        .iter()
        .filter(|kf| kf.preserve_for_lookahead)
        .cloned()
        .collect();

    if mode == LookaheadMode::Preload {
        lookahead.layer = format!("{layer}_lookahead");
        lookahead.lookahead_for_layer = Some(layer.to_string());
    }
    lookahead
}
