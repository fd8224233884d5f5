//! Diff states for ingest reconciliation.
//!
//! Each segment and part in a merge result is tagged with how Sofie's
//! working copy changed relative to the previous cached copy.

use serde::{Deserialize, Serialize};

/// The status of an item in a diff comparison.
///
/// - `Added`     -- present only in the merged (new) copy.
/// - `Removed`   -- present only in the previous copy.
/// - `Changed`   -- present in both with different content.
/// - `Unchanged` -- present in both with identical content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStatus {
    Added,
    Removed,
    Changed,
    Unchanged,
}

impl DiffStatus {
    /// Compare an optional previous and next value.
    ///
    /// Returns `None` when the item exists on neither side.
    pub fn between<T: PartialEq>(previous: Option<&T>, next: Option<&T>) -> Option<Self> {
        match (previous, next) {
            (None, None) => None,
            (None, Some(_)) => Some(Self::Added),
            (Some(_), None) => Some(Self::Removed),
            (Some(a), Some(b)) if a == b => Some(Self::Unchanged),
            (Some(_), Some(_)) => Some(Self::Changed),
        }
    }

    /// Whether downstream consumers need to regenerate the item.
    pub fn needs_regeneration(self) -> bool {
        matches!(self, Self::Added | Self::Changed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Changed => "changed",
            Self::Unchanged => "unchanged",
        }
    }
}

impl std::fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
