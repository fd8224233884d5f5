//! Turning the playing part instances into timeline objects.
//!
//! The current part gets a group starting when it started playing. Its
//! native pieces are nested groups relative to it; infinites are top-level
//! groups with absolute times so they do not restart when the part changes.
//! When the current part autonexts, the next part's group is chained to the
//! end of the current one.

use crate::models::instances::{PartInstance, PieceInstance};
use crate::models::show_style::SourceLayers;
use crate::models::timeline::{TimelineEnable, TimelineObject};
use crate::playout::resolve::{resolve_piece_timings, ResolvedPieceInstance};
use crate::types::{Duration, Time};

/// Priority of objects owned by the part they are in.
pub const NATIVE_PRIORITY: f64 = 10.0;

/// Priority of infinites carried in from an earlier part.
pub const CONTINUATION_PRIORITY: f64 = 1.0;

#[derive(Debug, Clone, Copy)]
pub struct PartInstanceWithPieces<'a> {
    pub instance: &'a PartInstance,
    pub pieces: &'a [PieceInstance],
}

#[derive(Debug, Clone)]
pub struct TimelineBuildInput<'a> {
    pub now: Time,
    pub current: Option<PartInstanceWithPieces<'a>>,
    pub next: Option<PartInstanceWithPieces<'a>>,
    pub source_layers: &'a SourceLayers,
    /// Appended as-is.
    pub lookahead: Vec<TimelineObject>,
}

pub fn part_group_id(instance: &PartInstance) -> String {
    format!("part_group_{}", instance.id)
}

/// Build the unrouted timeline for one playlist.
pub fn build_timeline(input: &TimelineBuildInput<'_>) -> Vec<TimelineObject> {
    let mut objects = Vec::new();

    if let Some(current) = input.current {
        let part_start = current.instance.started_playback().unwrap_or(input.now);
        let autonext = current.instance.part.autonext_duration();

        let mut enable = TimelineEnable::starting_at(part_start);
        if let Some(duration) = autonext {
            enable = enable.with_duration(duration);
        }
        let group_id = part_group_id(current.instance);
        objects.push(TimelineObject::group(group_id.clone(), enable));

        for resolved in resolve_piece_timings(current.pieces, input.source_layers)
            .values()
            .flatten()
        {
            if resolved.instance.infinite.is_some() {
                push_infinite(&mut objects, resolved, part_start);
            } else {
                push_piece_group(&mut objects, &group_id, resolved);
            }
        }

        if let (Some(next), Some(_)) = (input.next, autonext) {
            let next_group = part_group_id(next.instance);
            objects.push(TimelineObject::group(
                next_group.clone(),
                TimelineEnable::starting_at(format!("#{group_id}.end")),
            ));
            for resolved in resolve_piece_timings(next.pieces, input.source_layers)
                .values()
                .flatten()
                .filter(|resolved| !resolved.instance.is_continuation())
            {
                push_piece_group(&mut objects, &next_group, resolved);
            }
        }
    }

    objects.extend(input.lookahead.iter().cloned());

    tracing::debug!(objects = objects.len(), "Built timeline");
    objects
}

fn relative_enable(start: Duration, end: Option<Duration>) -> TimelineEnable {
    let enable = TimelineEnable::starting_at(start);
    match end {
        Some(end) => enable.with_duration((end - start).max(0)),
        None => enable,
    }
}

fn push_piece_group(
    objects: &mut Vec<TimelineObject>,
    part_group: &str,
    resolved: &ResolvedPieceInstance<'_>,
) {
    let instance = resolved.instance;
    let group_id = format!("piece_group_{}", instance.id);
    objects.push(
        TimelineObject::group(group_id.clone(), relative_enable(resolved.start, resolved.end))
            .in_group(part_group),
    );
    push_children(objects, &group_id, instance.id.as_str(), instance, NATIVE_PRIORITY);
}

fn push_infinite(
    objects: &mut Vec<TimelineObject>,
    resolved: &ResolvedPieceInstance<'_>,
    part_start: Time,
) {
    let instance = resolved.instance;
    let Some(infinite) = &instance.infinite else {
        return;
    };
    let start = instance
        .planned_started_playback
        .unwrap_or(part_start + resolved.start);
    let mut enable = TimelineEnable::starting_at(start);
    if let Some(end) = resolved.end {
        enable = enable.with_end(part_start + end);
    } else if let Some(duration) = instance.piece.enable.duration {
        enable = enable.with_duration(duration);
    }

    let group_id = format!("piece_group_{}", infinite.infinite_instance_id);
    objects.push(TimelineObject::group(group_id.clone(), enable));

    let priority = if infinite.from_previous_part {
        CONTINUATION_PRIORITY
    } else {
        NATIVE_PRIORITY
    };
    push_children(
        objects,
        &group_id,
        infinite.infinite_instance_id.as_str(),
        instance,
        priority,
    );
}

fn push_children(
    objects: &mut Vec<TimelineObject>,
    group_id: &str,
    prefix: &str,
    instance: &PieceInstance,
    priority: f64,
) {
    for obj in &instance.piece.timeline_objects {
        let mut child = obj.clone();
        child.id = format!("{prefix}_{}", obj.id);
        child.in_group = Some(group_id.to_string());
        child.priority = priority;
        objects.push(child);
    }
}
