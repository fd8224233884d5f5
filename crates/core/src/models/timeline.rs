//! Timeline objects: the flat, device-ready output of the engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::hashing::hash_json;
use crate::ids::{RundownPlaylistId, StudioId};
use crate::types::{Duration, Time};

/// Either an absolute/relative number of milliseconds or a reference
/// expression such as `#part_group_abc.end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnableValue {
    Time(i64),
    Expression(String),
}

impl From<i64> for EnableValue {
    fn from(value: i64) -> Self {
        Self::Time(value)
    }
}

impl From<&str> for EnableValue {
    fn from(value: &str) -> Self {
        Self::Expression(value.to_string())
    }
}

impl From<String> for EnableValue {
    fn from(value: String) -> Self {
        Self::Expression(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineEnable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<EnableValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<EnableValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<EnableValue>,
    #[serde(rename = "while", default, skip_serializing_if = "Option::is_none")]
    pub while_: Option<EnableValue>,
}

impl TimelineEnable {
    pub fn starting_at(start: impl Into<EnableValue>) -> Self {
        Self {
            start: Some(start.into()),
            ..Self::default()
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(EnableValue::Time(duration));
        self
    }

    pub fn with_end(mut self, end: impl Into<EnableValue>) -> Self {
        self.end = Some(end.into());
        self
    }

    pub fn always() -> Self {
        Self {
            while_: Some(EnableValue::Expression("1".to_string())),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineKeyframe {
    pub id: String,
    pub enable: TimelineEnable,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub preserve_for_lookahead: bool,
}

/// Requests a player from an AB pool for the object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AbSessionRequest {
    pub pool_name: String,
    pub session_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineObject {
    pub id: String,
    /// Output layer. Empty for groups.
    #[serde(default)]
    pub layer: String,
    pub enable: TimelineEnable,
    #[serde(default)]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keyframes: Vec<TimelineKeyframe>,
    #[serde(default)]
    pub priority: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(default)]
    pub is_group: bool,
    /// Id of the enclosing group; the enable of a grouped object is relative
    /// to its group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_group: Option<String>,
    #[serde(default)]
    pub is_lookahead: bool,
    /// For preload lookahead objects: the real layer being looked ahead for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookahead_for_layer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ab_session: Option<AbSessionRequest>,
}

impl TimelineObject {
    pub fn new(id: impl Into<String>, layer: impl Into<String>, enable: TimelineEnable) -> Self {
        Self {
            id: id.into(),
            layer: layer.into(),
            enable,
            content: Value::Null,
            keyframes: Vec::new(),
            priority: 0.0,
            classes: Vec::new(),
            is_group: false,
            in_group: None,
            is_lookahead: false,
            lookahead_for_layer: None,
            ab_session: None,
        }
    }

    pub fn group(id: impl Into<String>, enable: TimelineEnable) -> Self {
        Self {
            is_group: true,
            ..Self::new(id, "", enable)
        }
    }

    pub fn with_content(mut self, content: Value) -> Self {
        self.content = content;
        self
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    pub fn in_group(mut self, group_id: impl Into<String>) -> Self {
        self.in_group = Some(group_id.into());
        self
    }

    /// The layer routing and mapping lookups should use.
    pub fn effective_layer(&self) -> &str {
        match (&self.lookahead_for_layer, self.is_lookahead) {
            (Some(layer), true) => layer,
            _ => &self.layer,
        }
    }
}

/// The saved timeline of one playlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineComplete {
    pub studio_id: StudioId,
    pub playlist_id: RundownPlaylistId,
    pub generated: Time,
    /// SHA-256 over the serialised objects; equal hashes mean an identical
    /// timeline.
    pub timeline_hash: String,
    pub objects: Vec<TimelineObject>,
}

impl TimelineComplete {
    pub fn new(
        studio_id: StudioId,
        playlist_id: RundownPlaylistId,
        generated: Time,
        objects: Vec<TimelineObject>,
    ) -> Result<Self, CoreError> {
        let timeline_hash = hash_json(&objects)
            .map_err(|e| CoreError::Internal(format!("Failed to hash timeline: {e}")))?;
        Ok(Self {
            studio_id,
            playlist_id,
            generated,
            timeline_hash,
            objects,
        })
    }
}
