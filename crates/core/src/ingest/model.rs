//! Ingest trees.
//!
//! [`IngestRundown`] is the NRCS's view, exactly as the gateway delivered
//! it. [`SofieIngestRundown`] is the working copy after reconciliation: the
//! same shape plus `user_edit_states`, the flags recording which fields the
//! operator has taken ownership of.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

/// Locks the whole entity (and, for segments, its parts) against ingest.
pub const USER_EDIT_LOCKED: &str = "locked";
pub const USER_EDIT_NAME: &str = "name";
pub const USER_EDIT_RANK: &str = "rank";
pub const USER_EDIT_PAYLOAD: &str = "payload";

// ---------------------------------------------------------------------------
// NRCS trees
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct IngestPart {
    #[validate(length(min = 1))]
    pub external_id: String,
    #[validate(length(min = 1))]
    pub name: String,
    pub rank: f64,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct IngestSegment {
    #[validate(length(min = 1))]
    pub external_id: String,
    #[validate(length(min = 1))]
    pub name: String,
    pub rank: f64,
    #[serde(default)]
    pub payload: Value,
    #[validate(nested)]
    #[serde(default)]
    pub parts: Vec<IngestPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct IngestRundown {
    #[validate(length(min = 1))]
    pub external_id: String,
    #[validate(length(min = 1))]
    pub name: String,
    /// NRCS type, e.g. `"mos"`.
    pub rundown_type: String,
    #[serde(default)]
    pub payload: Value,
    #[validate(nested)]
    #[serde(default)]
    pub segments: Vec<IngestSegment>,
}

// ---------------------------------------------------------------------------
// Working copies
// ---------------------------------------------------------------------------

pub type UserEditStates = BTreeMap<String, bool>;

fn flag(states: &UserEditStates, key: &str) -> bool {
    states.get(key).copied().unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SofieIngestPart {
    pub external_id: String,
    pub name: String,
    pub rank: f64,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub user_edit_states: UserEditStates,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SofieIngestSegment {
    pub external_id: String,
    pub name: String,
    pub rank: f64,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub parts: Vec<SofieIngestPart>,
    #[serde(default)]
    pub user_edit_states: UserEditStates,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SofieIngestRundown {
    pub external_id: String,
    pub name: String,
    pub rundown_type: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub segments: Vec<SofieIngestSegment>,
    #[serde(default)]
    pub user_edit_states: UserEditStates,
}

impl SofieIngestPart {
    pub fn is_locked(&self) -> bool {
        flag(&self.user_edit_states, USER_EDIT_LOCKED)
    }

    pub fn is_field_locked(&self, field: &str) -> bool {
        self.is_locked() || flag(&self.user_edit_states, field)
    }

    /// Content as the NRCS would describe it, without local edit flags.
    pub fn to_ingest(&self) -> IngestPart {
        IngestPart {
            external_id: self.external_id.clone(),
            name: self.name.clone(),
            rank: self.rank,
            payload: self.payload.clone(),
        }
    }
}

impl SofieIngestSegment {
    pub fn is_locked(&self) -> bool {
        flag(&self.user_edit_states, USER_EDIT_LOCKED)
    }

    pub fn is_field_locked(&self, field: &str) -> bool {
        self.is_locked() || flag(&self.user_edit_states, field)
    }

    pub fn part(&self, external_id: &str) -> Option<&SofieIngestPart> {
        self.parts.iter().find(|p| p.external_id == external_id)
    }

    pub fn to_ingest(&self) -> IngestSegment {
        IngestSegment {
            external_id: self.external_id.clone(),
            name: self.name.clone(),
            rank: self.rank,
            payload: self.payload.clone(),
            parts: self.parts.iter().map(SofieIngestPart::to_ingest).collect(),
        }
    }
}

impl SofieIngestRundown {
    pub fn is_field_locked(&self, field: &str) -> bool {
        flag(&self.user_edit_states, USER_EDIT_LOCKED) || flag(&self.user_edit_states, field)
    }

    pub fn segment(&self, external_id: &str) -> Option<&SofieIngestSegment> {
        self.segments.iter().find(|s| s.external_id == external_id)
    }

    pub fn segment_mut(&mut self, external_id: &str) -> Option<&mut SofieIngestSegment> {
        self.segments
            .iter_mut()
            .find(|s| s.external_id == external_id)
    }
}

impl From<&IngestPart> for SofieIngestPart {
    fn from(part: &IngestPart) -> Self {
        Self {
            external_id: part.external_id.clone(),
            name: part.name.clone(),
            rank: part.rank,
            payload: part.payload.clone(),
            user_edit_states: UserEditStates::new(),
        }
    }
}

impl From<&IngestSegment> for SofieIngestSegment {
    fn from(segment: &IngestSegment) -> Self {
        Self {
            external_id: segment.external_id.clone(),
            name: segment.name.clone(),
            rank: segment.rank,
            payload: segment.payload.clone(),
            parts: segment.parts.iter().map(SofieIngestPart::from).collect(),
            user_edit_states: UserEditStates::new(),
        }
    }
}

impl From<&IngestRundown> for SofieIngestRundown {
    fn from(rundown: &IngestRundown) -> Self {
        Self {
            external_id: rundown.external_id.clone(),
            name: rundown.name.clone(),
            rundown_type: rundown.rundown_type.clone(),
            payload: rundown.payload.clone(),
            segments: rundown.segments.iter().map(SofieIngestSegment::from).collect(),
            user_edit_states: UserEditStates::new(),
        }
    }
}
