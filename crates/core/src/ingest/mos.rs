//! Grouping flat MOS story lists into segments.
//!
//! MOS rundowns have no segment level: the gateway sends a flat list of
//! stories. Stories are grouped by the part of their name before a
//! separator (`"Weather;Intro"` and `"Weather;Map"` share the segment
//! `"Weather"`). Only consecutive stories are grouped, so a repeated name
//! later in the show starts a new segment.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ingest::model::{IngestPart, IngestSegment};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MosGroupingConfig {
    pub separator: String,
    #[serde(default = "default_true")]
    pub trim_whitespace: bool,
    #[serde(default)]
    pub case_insensitive: bool,
}

fn default_true() -> bool {
    true
}

impl Default for MosGroupingConfig {
    fn default() -> Self {
        Self {
            separator: ";".to_string(),
            trim_whitespace: true,
            case_insensitive: false,
        }
    }
}

impl MosGroupingConfig {
    pub fn with_separator(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
            ..Self::default()
        }
    }

    /// Display name of the segment a story belongs to.
    fn segment_name<'a>(&self, story_name: &'a str) -> &'a str {
        let prefix = if self.separator.is_empty() {
            story_name
        } else {
            story_name
                .split(self.separator.as_str())
                .next()
                .unwrap_or(story_name)
        };
        let prefix = if self.trim_whitespace {
            prefix.trim()
        } else {
            prefix
        };
        if prefix.is_empty() {
            story_name
        } else {
            prefix
        }
    }

    fn grouping_key(&self, segment_name: &str) -> String {
        if self.case_insensitive {
            segment_name.to_lowercase()
        } else {
            segment_name.to_string()
        }
    }
}

/// Group consecutive stories into segments.
///
/// Segment ids are `{rundown}_{segment name}_{first story id}`, which stays
/// stable when stories are appended to or removed from the end of a group.
/// Segment and part ranks are renumbered from 0.
pub fn group_mos_parts_into_ingest_segments(
    rundown_external_id: &str,
    stories: &[IngestPart],
    config: &MosGroupingConfig,
) -> Vec<IngestSegment> {
    let mut groups: Vec<(String, String, Vec<IngestPart>)> = Vec::new();

    for story in stories {
        let name = config.segment_name(&story.name);
        let key = config.grouping_key(name);
        match groups.last_mut() {
            Some((last_key, _, parts)) if *last_key == key => parts.push(story.clone()),
            _ => groups.push((key, name.to_string(), vec![story.clone()])),
        }
    }

    groups
        .into_iter()
        .enumerate()
        .map(|(index, (_, name, mut parts))| {
            for (rank, part) in parts.iter_mut().enumerate() {
                part.rank = rank as f64;
            }
            let first_story = parts
                .first()
                .map(|p| p.external_id.as_str())
                .unwrap_or_default();
            IngestSegment {
                external_id: format!("{rundown_external_id}_{name}_{first_story}"),
                name,
                rank: index as f64,
                payload: Value::Null,
                parts,
            }
        })
        .collect()
}
