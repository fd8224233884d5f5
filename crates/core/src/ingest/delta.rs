//! Incremental NRCS updates.
//!
//! Gateways that support it send single-segment or single-part changes
//! instead of whole rundowns. Deltas are applied to the cached NRCS tree;
//! the result is then reconciled like a full update. Each delta is
//! validated on its own, and a bad delta is rejected without affecting the
//! others in the batch.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::ingest::model::{IngestPart, IngestRundown, IngestSegment};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IngestDelta {
    UpdateRundownMetadata {
        name: String,
        #[serde(default)]
        payload: Value,
    },
    UpsertSegment {
        segment: IngestSegment,
    },
    RemoveSegment {
        segment_external_id: String,
    },
    UpsertPart {
        segment_external_id: String,
        part: IngestPart,
    },
    RemovePart {
        segment_external_id: String,
        part_external_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedDelta {
    /// Position of the delta in the batch.
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeltaApplyResult {
    pub rundown: IngestRundown,
    pub applied: usize,
    pub rejected: Vec<RejectedDelta>,
}

/// Apply `deltas` in order to a copy of `rundown`.
pub fn apply_ingest_deltas(rundown: &IngestRundown, deltas: &[IngestDelta]) -> DeltaApplyResult {
    let mut rundown = rundown.clone();
    let mut applied = 0;
    let mut rejected = Vec::new();

    for (index, delta) in deltas.iter().enumerate() {
        match apply_delta(&mut rundown, delta) {
            Ok(()) => applied += 1,
            Err(reason) => {
                tracing::debug!(index, %reason, "Rejected ingest delta");
                rejected.push(RejectedDelta { index, reason });
            }
        }
    }

    DeltaApplyResult {
        rundown,
        applied,
        rejected,
    }
}

fn apply_delta(rundown: &mut IngestRundown, delta: &IngestDelta) -> Result<(), String> {
    match delta {
        IngestDelta::UpdateRundownMetadata { name, payload } => {
            if name.is_empty() {
                return Err("Rundown name must not be empty".to_string());
            }
            rundown.name = name.clone();
            rundown.payload = payload.clone();
        }
        IngestDelta::UpsertSegment { segment } => {
            segment.validate().map_err(|e| e.to_string())?;
            match rundown
                .segments
                .iter_mut()
                .find(|s| s.external_id == segment.external_id)
            {
                Some(existing) => *existing = segment.clone(),
                None => rundown.segments.push(segment.clone()),
            }
        }
        IngestDelta::RemoveSegment {
            segment_external_id,
        } => {
            let before = rundown.segments.len();
            rundown
                .segments
                .retain(|s| &s.external_id != segment_external_id);
            if rundown.segments.len() == before {
                return Err(format!("Segment \"{segment_external_id}\" not found"));
            }
        }
        IngestDelta::UpsertPart {
            segment_external_id,
            part,
        } => {
            part.validate().map_err(|e| e.to_string())?;
            let segment = find_segment(rundown, segment_external_id)?;
            match segment
                .parts
                .iter_mut()
                .find(|p| p.external_id == part.external_id)
            {
                Some(existing) => *existing = part.clone(),
                None => segment.parts.push(part.clone()),
            }
        }
        IngestDelta::RemovePart {
            segment_external_id,
            part_external_id,
        } => {
            let segment = find_segment(rundown, segment_external_id)?;
            let before = segment.parts.len();
            segment.parts.retain(|p| &p.external_id != part_external_id);
            if segment.parts.len() == before {
                return Err(format!("Part \"{part_external_id}\" not found"));
            }
        }
    }
    Ok(())
}

fn find_segment<'a>(
    rundown: &'a mut IngestRundown,
    external_id: &str,
) -> Result<&'a mut IngestSegment, String> {
    rundown
        .segments
        .iter_mut()
        .find(|s| s.external_id == external_id)
        .ok_or_else(|| format!("Segment \"{external_id}\" not found"))
}
