//! Choosing the next part.

use std::cmp::Ordering;

use crate::ids::{PartId, SegmentId};
use crate::models::playlist::{QuickLoopMarker, QuickLoopMarkers, RundownPlaylist};
use crate::models::rundown::{Part, Segment};

/// The segments and parts of a playlist in playout order.
///
/// Parts of hidden segments and of rundowns outside the playlist are left
/// out.
#[derive(Debug, Clone, Default)]
pub struct PlayoutOrder<'a> {
    pub segments: Vec<&'a Segment>,
    pub parts: Vec<&'a Part>,
}

impl<'a> PlayoutOrder<'a> {
    pub fn position_of(&self, part_id: &PartId) -> Option<usize> {
        self.parts.iter().position(|p| p.id == *part_id)
    }

    fn segment_position(&self, segment_id: &SegmentId) -> Option<usize> {
        self.segments.iter().position(|s| s.id == *segment_id)
    }

    fn first_playable_from(&self, start: usize) -> Option<(usize, &'a Part)> {
        self.parts
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, p)| p.is_playable())
            .map(|(i, p)| (i, *p))
    }

    fn first_playable_in_segment(&self, segment_id: &SegmentId) -> Option<(usize, &'a Part)> {
        self.parts
            .iter()
            .enumerate()
            .find(|(_, p)| p.segment_id == *segment_id && p.is_playable())
            .map(|(i, p)| (i, *p))
    }

    /// Where to continue searching after `part`, which may no longer exist.
    fn search_start_after(&self, part: &Part) -> usize {
        if let Some(index) = self.position_of(&part.id) {
            return index + 1;
        }
        // Deleted part: continue from the first part ordered after it.
        let Some(segment_index) = self.segment_position(&part.segment_id) else {
            return 0;
        };
        self.parts
            .iter()
            .position(|p| {
                let p_segment = self.segment_position(&p.segment_id).unwrap_or(usize::MAX);
                match p_segment.cmp(&segment_index) {
                    Ordering::Greater => true,
                    Ordering::Equal => p.rank > part.rank,
                    Ordering::Less => false,
                }
            })
            .unwrap_or(self.parts.len())
    }

    fn marker_bounds(&self, marker: &QuickLoopMarker) -> Option<(usize, usize)> {
        match marker {
            QuickLoopMarker::Part(id) => self.position_of(id).map(|i| (i, i)),
            QuickLoopMarker::Segment(id) => {
                let first = self.parts.iter().position(|p| p.segment_id == *id)?;
                let last = self.parts.iter().rposition(|p| p.segment_id == *id)?;
                Some((first, last))
            }
        }
    }
}

/// Sort `segments` and `parts` into the playlist's running order.
pub fn playlist_order<'a>(
    playlist: &RundownPlaylist,
    segments: &'a [Segment],
    parts: &'a [Part],
) -> PlayoutOrder<'a> {
    let mut ordered_segments: Vec<(usize, &'a Segment)> = segments
        .iter()
        .filter(|s| !s.is_hidden)
        .filter_map(|s| playlist.rundown_rank(&s.rundown_id).map(|rank| (rank, s)))
        .collect();
    ordered_segments.sort_by(|(ra, a), (rb, b)| ra.cmp(rb).then(a.rank.total_cmp(&b.rank)));
    let segments: Vec<&'a Segment> = ordered_segments.into_iter().map(|(_, s)| s).collect();

    let mut ordered_parts: Vec<(usize, &'a Part)> = parts
        .iter()
        .filter_map(|p| {
            segments
                .iter()
                .position(|s| s.id == p.segment_id)
                .map(|index| (index, p))
        })
        .collect();
    ordered_parts.sort_by(|(sa, a), (sb, b)| sa.cmp(sb).then(a.rank.total_cmp(&b.rank)));

    PlayoutOrder {
        segments,
        parts: ordered_parts.into_iter().map(|(_, p)| p).collect(),
    }
}

/// Inputs to [`select_next_part`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectNextPartContext<'a> {
    /// The part of the instance being left, as it was when it was taken.
    pub previous_part: Option<&'a Part>,
    pub queued_segment_id: Option<&'a SegmentId>,
    pub quick_loop: Option<&'a QuickLoopMarkers>,
    pub loop_playlist: bool,
    pub ignore_quickloop: bool,
}

impl<'a> SelectNextPartContext<'a> {
    pub fn from_playlist(playlist: &'a RundownPlaylist, previous_part: Option<&'a Part>) -> Self {
        Self {
            previous_part,
            queued_segment_id: playlist.queued_segment_id.as_ref(),
            quick_loop: playlist.quick_loop.as_ref(),
            loop_playlist: playlist.loop_playlist,
            ignore_quickloop: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectedNextPart<'a> {
    pub part: &'a Part,
    /// Position in [`PlayoutOrder::parts`].
    pub index: usize,
    pub consumes_queued_segment_id: bool,
}

/// The part that should follow `ctx.previous_part`.
pub fn select_next_part<'a>(
    order: &PlayoutOrder<'a>,
    ctx: &SelectNextPartContext<'_>,
) -> Option<SelectedNextPart<'a>> {
    let selected = |(index, part): (usize, &'a Part)| SelectedNextPart {
        part,
        index,
        consumes_queued_segment_id: false,
    };

    if let (Some(previous), Some(quick_loop), false) =
        (ctx.previous_part, ctx.quick_loop, ctx.ignore_quickloop)
    {
        if quick_loop.running {
            if let Some(looped) = quick_loop_target(order, previous, quick_loop) {
                return Some(selected(looped));
            }
        }
    }

    let start = ctx
        .previous_part
        .map_or(0, |previous| order.search_start_after(previous));
    let candidate = order.first_playable_from(start);

    if let Some(queued) = ctx.queued_segment_id {
        let leaving_segment = match (ctx.previous_part, candidate) {
            (None, _) | (_, None) => true,
            (Some(previous), Some((_, part))) => part.segment_id != previous.segment_id,
        };
        if leaving_segment {
            if let Some(found) = order.first_playable_in_segment(queued) {
                return Some(SelectedNextPart {
                    consumes_queued_segment_id: true,
                    ..selected(found)
                });
            }
        }
    }

    match candidate {
        Some(found) => Some(selected(found)),
        None if ctx.loop_playlist => order.first_playable_from(0).map(selected),
        None => None,
    }
}

fn quick_loop_target<'a>(
    order: &PlayoutOrder<'a>,
    previous: &Part,
    quick_loop: &QuickLoopMarkers,
) -> Option<(usize, &'a Part)> {
    let (_, end) = order.marker_bounds(&quick_loop.end)?;
    let (start, _) = order.marker_bounds(&quick_loop.start)?;
    if order.position_of(&previous.id)? != end || start > end {
        return None;
    }
    order
        .first_playable_from(start)
        .filter(|(index, _)| *index <= end)
}

/// Move relative to `reference` by whole segments, or else by playable
/// parts. Returns `None` when the move leaves the playlist.
pub fn move_next_part<'a>(
    order: &PlayoutOrder<'a>,
    reference: &PartId,
    delta_parts: i32,
    delta_segments: i32,
) -> Option<&'a Part> {
    let reference_index = order.position_of(reference)?;

    if delta_segments != 0 {
        let playable_segments: Vec<&SegmentId> = order
            .segments
            .iter()
            .map(|s| &s.id)
            .filter(|id| order.first_playable_in_segment(id).is_some())
            .collect();
        let reference_segment = &order.parts[reference_index].segment_id;
        let position = playable_segments
            .iter()
            .position(|id| *id == reference_segment)?;
        let target = offset(position, delta_segments, playable_segments.len())?;
        return order
            .first_playable_in_segment(playable_segments[target])
            .map(|(_, part)| part);
    }

    let playable: Vec<(usize, &'a Part)> = order
        .parts
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_playable())
        .map(|(i, p)| (i, *p))
        .collect();
    // An unplayable reference counts as sitting just before the next playable part.
    let (position, adjust) = match playable.iter().position(|(i, _)| *i >= reference_index) {
        Some(pos) if playable[pos].0 == reference_index => (pos, 0),
        Some(pos) => (pos, if delta_parts > 0 { -1 } else { 0 }),
        None => (playable.len(), if delta_parts > 0 { -1 } else { 0 }),
    };
    let target = offset(position, delta_parts + adjust, playable.len())?;
    Some(playable[target].1)
}

fn offset(position: usize, delta: i32, len: usize) -> Option<usize> {
    let target = position as i64 + i64::from(delta);
    (0..len as i64).contains(&target).then_some(target as usize)
}
