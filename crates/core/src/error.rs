//! Error taxonomy shared by the core and the worker.
//!
//! [`UserError`] is the expected, operator-facing failure: it carries a stable
//! message key, structured arguments for localisation and a numeric code.
//! Everything else is a [`CoreError`] variant and is treated as a system
//! failure by the job layer.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Stable keys for every user-facing error. The key is what the UI
/// translates; the default message is English only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserErrorMessage {
    InactiveRundown,
    RundownAlreadyActive,
    PlaylistNotFound,
    RundownNotFound,
    SegmentNotFound,
    PartNotFound,
    PartNotPlayable,
    PartInstanceNotFound,
    NoCurrentPart,
    TakeNoNextPart,
    TakeRateLimit,
    TakeFromIncorrectPart,
    SetNextRundownNotInPlaylist,
    SetNextRundownOrphaned,
    RundownResetWhileActive,
    RouteSetNotFound,
    RouteSetActivateOnly,
    ActionNotFound,
    ActionFailed,
    RundownOnAir,
    ValidationFailed,
    InternalError,
}

impl UserErrorMessage {
    /// The stable message key, used by translation tables.
    pub fn key(self) -> &'static str {
        match self {
            Self::InactiveRundown => "InactiveRundown",
            Self::RundownAlreadyActive => "RundownAlreadyActive",
            Self::PlaylistNotFound => "PlaylistNotFound",
            Self::RundownNotFound => "RundownNotFound",
            Self::SegmentNotFound => "SegmentNotFound",
            Self::PartNotFound => "PartNotFound",
            Self::PartNotPlayable => "PartNotPlayable",
            Self::PartInstanceNotFound => "PartInstanceNotFound",
            Self::NoCurrentPart => "NoCurrentPart",
            Self::TakeNoNextPart => "TakeNoNextPart",
            Self::TakeRateLimit => "TakeRateLimit",
            Self::TakeFromIncorrectPart => "TakeFromIncorrectPart",
            Self::SetNextRundownNotInPlaylist => "SetNextRundownNotInPlaylist",
            Self::SetNextRundownOrphaned => "SetNextRundownOrphaned",
            Self::RundownResetWhileActive => "RundownResetWhileActive",
            Self::RouteSetNotFound => "RouteSetNotFound",
            Self::RouteSetActivateOnly => "RouteSetActivateOnly",
            Self::ActionNotFound => "ActionNotFound",
            Self::ActionFailed => "ActionFailed",
            Self::RundownOnAir => "RundownOnAir",
            Self::ValidationFailed => "ValidationFailed",
            Self::InternalError => "InternalError",
        }
    }

    /// English template. `{{name}}` placeholders are filled from the args.
    pub fn template(self) -> &'static str {
        match self {
            Self::InactiveRundown => "Rundown must be active!",
            Self::RundownAlreadyActive => {
                "Rundown Playlist is active, please deactivate before preparing it for broadcast"
            }
            Self::PlaylistNotFound => "Rundown Playlist not found!",
            Self::RundownNotFound => "Rundown not found!",
            Self::SegmentNotFound => "Segment not found!",
            Self::PartNotFound => "The selected Part was not found",
            Self::PartNotPlayable => "The selected Part cannot be played",
            Self::PartInstanceNotFound => "PartInstance not found!",
            Self::NoCurrentPart => "There is no Current Part!",
            Self::TakeNoNextPart => "No Next point found, please set a part as Next before doing a TAKE.",
            Self::TakeRateLimit => "Ignoring TAKES that are too quick after eachother ({{duration}} ms)",
            Self::TakeFromIncorrectPart => {
                "Ignoring take as playing part has changed since TAKE was requested."
            }
            Self::SetNextRundownNotInPlaylist => "The selected Part is not in this Rundown Playlist",
            Self::SetNextRundownOrphaned => {
                "The selected Part belongs to a Rundown that is being removed from the playlist"
            }
            Self::RundownResetWhileActive => {
                "RundownPlaylist is active but not in rehearsal, please deactivate it or set in in rehearsal to be able to reset it."
            }
            Self::RouteSetNotFound => "Route Set \"{{id}}\" not found",
            Self::RouteSetActivateOnly => "Route Set \"{{id}}\" can only be activated",
            Self::ActionNotFound => "The selected action \"{{id}}\" was not found",
            Self::ActionFailed => "The action failed: {{reason}}",
            Self::RundownOnAir => "Rundown \"{{name}}\" is on air and cannot be removed",
            Self::ValidationFailed => "Invalid data: {{reason}}",
            Self::InternalError => "An internal error occured!",
        }
    }

    /// Numeric code, HTTP-like, for API surfaces.
    pub fn default_code(self) -> u16 {
        match self {
            Self::PlaylistNotFound
            | Self::RundownNotFound
            | Self::SegmentNotFound
            | Self::PartNotFound
            | Self::PartInstanceNotFound
            | Self::RouteSetNotFound
            | Self::ActionNotFound => 404,
            Self::RundownAlreadyActive | Self::RundownOnAir => 409,
            Self::InactiveRundown
            | Self::NoCurrentPart
            | Self::TakeNoNextPart
            | Self::RundownResetWhileActive => 412,
            Self::TakeRateLimit | Self::TakeFromIncorrectPart => 425,
            Self::InternalError => 500,
            _ => 400,
        }
    }
}

impl fmt::Display for UserErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// An expected, translatable failure shown to the operator verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserError {
    pub message: UserErrorMessage,
    #[serde(default)]
    pub args: Map<String, Value>,
    pub code: u16,
}

impl UserError {
    pub fn new(message: UserErrorMessage) -> Self {
        Self {
            message,
            args: Map::new(),
            code: message.default_code(),
        }
    }

    /// Attach a structured argument used by the message template.
    pub fn with_arg(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.args.insert(name.to_string(), value.into());
        self
    }

    /// The English message with all `{{arg}}` placeholders substituted.
    pub fn render(&self) -> String {
        let mut out = self.message.template().to_string();
        for (name, value) in &self.args {
            let replacement = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out = out.replace(&format!("{{{{{name}}}}}"), &replacement);
        }
        out
    }
}

impl fmt::Display for UserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl std::error::Error for UserError {}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    User(#[from] UserError),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// A programming invariant was violated, e.g. `next` pointing at a
    /// part instance that does not exist.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether the error is operator-facing rather than a system failure.
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::User(_))
    }
}

impl From<UserErrorMessage> for CoreError {
    fn from(message: UserErrorMessage) -> Self {
        Self::User(UserError::new(message))
    }
}

impl From<validator::ValidationErrors> for CoreError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}
