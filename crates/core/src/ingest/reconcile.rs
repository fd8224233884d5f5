//! Three-way merge of NRCS data into Sofie's working copy.
//!
//! Segments and parts are matched by `external_id`. Anything the operator
//! has locked through `user_edit_states` keeps its local value; when the
//! NRCS disagrees, a notification is raised instead of overwriting.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::diff::DiffStatus;
use crate::error::CoreError;
use crate::ingest::model::{
    IngestPart, IngestRundown, IngestSegment, SofieIngestPart, SofieIngestRundown,
    SofieIngestSegment, USER_EDIT_NAME, USER_EDIT_PAYLOAD, USER_EDIT_RANK,
};
use crate::notes::TranslatableMessage;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentChange {
    pub status: DiffStatus,
    /// Part changes by part external id. Unchanged parts are omitted.
    pub parts: BTreeMap<String, DiffStatus>,
}

/// What changed, for the caller to regenerate or remove.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestChangeSet {
    pub rundown_changed: bool,
    /// By segment external id. Unchanged segments are omitted.
    pub segments: BTreeMap<String, SegmentChange>,
}

impl IngestChangeSet {
    pub fn is_empty(&self) -> bool {
        !self.rundown_changed && self.segments.is_empty()
    }

    /// Segments whose content must be (re)generated.
    pub fn segments_to_regenerate(&self) -> impl Iterator<Item = &str> {
        self.segments
            .iter()
            .filter(|(_, change)| change.status.needs_regeneration())
            .map(|(id, _)| id.as_str())
    }

    pub fn removed_segments(&self) -> impl Iterator<Item = &str> {
        self.segments
            .iter()
            .filter(|(_, change)| change.status == DiffStatus::Removed)
            .map(|(id, _)| id.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestNotificationKind {
    /// A single locked field differs from the NRCS value.
    LockedFieldChanged,
    /// A locked segment or part differs from the NRCS version.
    LockedContentChanged,
    /// The NRCS removed a locked segment or part; it was kept.
    LockedContentRemoved,
}

/// Raised when local edits win over NRCS data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestNotification {
    pub kind: IngestNotificationKind,
    pub segment_external_id: Option<String>,
    pub part_external_id: Option<String>,
    pub field: Option<String>,
}

impl IngestNotification {
    pub fn message(&self) -> TranslatableMessage {
        let key = match self.kind {
            IngestNotificationKind::LockedFieldChanged => "ingest.lockedFieldChanged",
            IngestNotificationKind::LockedContentChanged => "ingest.lockedContentChanged",
            IngestNotificationKind::LockedContentRemoved => "ingest.lockedContentRemoved",
        };
        let mut message = TranslatableMessage::new(key);
        if let Some(segment) = &self.segment_external_id {
            message = message.with_arg("segment", segment.as_str());
        }
        if let Some(part) = &self.part_external_id {
            message = message.with_arg("part", part.as_str());
        }
        if let Some(field) = &self.field {
            message = message.with_arg("field", field.as_str());
        }
        message
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestMergeResult {
    pub rundown: SofieIngestRundown,
    pub changes: IngestChangeSet,
    pub notifications: Vec<IngestNotification>,
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Merge `incoming` NRCS data into the `previous` working copy.
///
/// The whole rundown is validated first; a malformed tree is rejected
/// without producing any partial result.
pub fn reconcile_rundown(
    previous: Option<&SofieIngestRundown>,
    incoming: &IngestRundown,
) -> Result<IngestMergeResult, CoreError> {
    incoming.validate()?;

    let Some(previous) = previous else {
        return Ok(fresh_rundown(incoming));
    };

    let mut notes = Notifier::default();

    let mut rundown = SofieIngestRundown {
        external_id: incoming.external_id.clone(),
        name: notes.field(
            previous.is_field_locked(USER_EDIT_NAME),
            &previous.name,
            &incoming.name,
            None,
            None,
            USER_EDIT_NAME,
        ),
        rundown_type: incoming.rundown_type.clone(),
        payload: notes.field(
            previous.is_field_locked(USER_EDIT_PAYLOAD),
            &previous.payload,
            &incoming.payload,
            None,
            None,
            USER_EDIT_PAYLOAD,
        ),
        segments: Vec::with_capacity(incoming.segments.len()),
        user_edit_states: previous.user_edit_states.clone(),
    };

    let mut changes = IngestChangeSet {
        rundown_changed: rundown.name != previous.name || rundown.payload != previous.payload,
        segments: BTreeMap::new(),
    };

    let incoming_ids: HashSet<&str> = incoming
        .segments
        .iter()
        .map(|s| s.external_id.as_str())
        .collect();

    for segment in &incoming.segments {
        match previous.segment(&segment.external_id) {
            None => {
                changes.segments.insert(
                    segment.external_id.clone(),
                    SegmentChange {
                        status: DiffStatus::Added,
                        parts: all_parts(&segment.parts, DiffStatus::Added),
                    },
                );
                rundown.segments.push(SofieIngestSegment::from(segment));
            }
            Some(local) if local.is_locked() => {
                if local.to_ingest() != *segment {
                    notes.push(
                        IngestNotificationKind::LockedContentChanged,
                        Some(local.external_id.as_str()),
                        None,
                        None,
                    );
                }
                rundown.segments.push(local.clone());
            }
            Some(local) => {
                let merged = merge_segment(local, segment, &mut notes, &mut changes);
                rundown.segments.push(merged);
            }
        }
    }

    for local in &previous.segments {
        if incoming_ids.contains(local.external_id.as_str()) {
            continue;
        }
        if local.is_locked() {
            notes.push(
                IngestNotificationKind::LockedContentRemoved,
                Some(local.external_id.as_str()),
                None,
                None,
            );
            rundown.segments.push(local.clone());
        } else {
            let removed_parts = local
                .parts
                .iter()
                .map(|p| (p.external_id.clone(), DiffStatus::Removed))
                .collect();
            changes.segments.insert(
                local.external_id.clone(),
                SegmentChange {
                    status: DiffStatus::Removed,
                    parts: removed_parts,
                },
            );
        }
    }

    rundown
        .segments
        .sort_by(|a, b| a.rank.total_cmp(&b.rank));

    tracing::debug!(
        rundown = %rundown.external_id,
        changed_segments = changes.segments.len(),
        notifications = notes.items.len(),
        "Reconciled ingest rundown",
    );

    Ok(IngestMergeResult {
        rundown,
        changes,
        notifications: notes.items,
    })
}

fn fresh_rundown(incoming: &IngestRundown) -> IngestMergeResult {
    let segments = incoming
        .segments
        .iter()
        .map(|segment| {
            (
                segment.external_id.clone(),
                SegmentChange {
                    status: DiffStatus::Added,
                    parts: all_parts(&segment.parts, DiffStatus::Added),
                },
            )
        })
        .collect();

    let mut rundown = SofieIngestRundown::from(incoming);
    rundown
        .segments
        .sort_by(|a, b| a.rank.total_cmp(&b.rank));

    IngestMergeResult {
        rundown,
        changes: IngestChangeSet {
            rundown_changed: true,
            segments,
        },
        notifications: Vec::new(),
    }
}

fn all_parts(parts: &[IngestPart], status: DiffStatus) -> BTreeMap<String, DiffStatus> {
    parts
        .iter()
        .map(|p| (p.external_id.clone(), status))
        .collect()
}

fn merge_segment(
    local: &SofieIngestSegment,
    incoming: &IngestSegment,
    notes: &mut Notifier,
    changes: &mut IngestChangeSet,
) -> SofieIngestSegment {
    let segment_id = Some(local.external_id.as_str());
    let mut part_changes = BTreeMap::new();

    let mut merged = SofieIngestSegment {
        external_id: local.external_id.clone(),
        name: notes.field(
            local.is_field_locked(USER_EDIT_NAME),
            &local.name,
            &incoming.name,
            segment_id,
            None,
            USER_EDIT_NAME,
        ),
        rank: notes.field(
            local.is_field_locked(USER_EDIT_RANK),
            &local.rank,
            &incoming.rank,
            segment_id,
            None,
            USER_EDIT_RANK,
        ),
        payload: notes.field(
            local.is_field_locked(USER_EDIT_PAYLOAD),
            &local.payload,
            &incoming.payload,
            segment_id,
            None,
            USER_EDIT_PAYLOAD,
        ),
        parts: Vec::with_capacity(incoming.parts.len()),
        user_edit_states: local.user_edit_states.clone(),
    };

    let incoming_ids: HashSet<&str> = incoming
        .parts
        .iter()
        .map(|p| p.external_id.as_str())
        .collect();

    for part in &incoming.parts {
        match local.part(&part.external_id) {
            None => {
                part_changes.insert(part.external_id.clone(), DiffStatus::Added);
                merged.parts.push(SofieIngestPart::from(part));
            }
            Some(local_part) if local_part.is_locked() => {
                if local_part.to_ingest() != *part {
                    notes.push(
                        IngestNotificationKind::LockedContentChanged,
                        segment_id,
                        Some(local_part.external_id.as_str()),
                        None,
                    );
                }
                merged.parts.push(local_part.clone());
            }
            Some(local_part) => {
                let merged_part = merge_part(local_part, part, segment_id, notes);
                if merged_part != *local_part {
                    part_changes.insert(part.external_id.clone(), DiffStatus::Changed);
                }
                merged.parts.push(merged_part);
            }
        }
    }

    for local_part in &local.parts {
        if incoming_ids.contains(local_part.external_id.as_str()) {
            continue;
        }
        if local_part.is_locked() {
            notes.push(
                IngestNotificationKind::LockedContentRemoved,
                segment_id,
                Some(local_part.external_id.as_str()),
                None,
            );
            merged.parts.push(local_part.clone());
        } else {
            part_changes.insert(local_part.external_id.clone(), DiffStatus::Removed);
        }
    }

    merged.parts.sort_by(|a, b| a.rank.total_cmp(&b.rank));

    if merged != *local {
        changes.segments.insert(
            local.external_id.clone(),
            SegmentChange {
                status: DiffStatus::Changed,
                parts: part_changes,
            },
        );
    }
    merged
}

fn merge_part(
    local: &SofieIngestPart,
    incoming: &IngestPart,
    segment_id: Option<&str>,
    notes: &mut Notifier,
) -> SofieIngestPart {
    let part_id = Some(local.external_id.as_str());
    SofieIngestPart {
        external_id: local.external_id.clone(),
        name: notes.field(
            local.is_field_locked(USER_EDIT_NAME),
            &local.name,
            &incoming.name,
            segment_id,
            part_id,
            USER_EDIT_NAME,
        ),
        rank: notes.field(
            local.is_field_locked(USER_EDIT_RANK),
            &local.rank,
            &incoming.rank,
            segment_id,
            part_id,
            USER_EDIT_RANK,
        ),
        payload: notes.field(
            local.is_field_locked(USER_EDIT_PAYLOAD),
            &local.payload,
            &incoming.payload,
            segment_id,
            part_id,
            USER_EDIT_PAYLOAD,
        ),
        user_edit_states: local.user_edit_states.clone(),
    }
}

#[derive(Default)]
struct Notifier {
    items: Vec<IngestNotification>,
}

impl Notifier {
    fn push(
        &mut self,
        kind: IngestNotificationKind,
        segment: Option<&str>,
        part: Option<&str>,
        field: Option<&str>,
    ) {
        self.items.push(IngestNotification {
            kind,
            segment_external_id: segment.map(str::to_string),
            part_external_id: part.map(str::to_string),
            field: field.map(str::to_string),
        });
    }

    /// Pick the local value for a locked field, the incoming one otherwise.
    fn field<T: PartialEq + Clone>(
        &mut self,
        locked: bool,
        local: &T,
        incoming: &T,
        segment: Option<&str>,
        part: Option<&str>,
        name: &str,
    ) -> T {
        if !locked {
            return incoming.clone();
        }
        if local != incoming {
            self.push(
                IngestNotificationKind::LockedFieldChanged,
                segment,
                part,
                Some(name),
            );
        }
        local.clone()
    }
}
