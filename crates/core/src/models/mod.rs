//! Documents the engine reads and writes.

pub mod instances;
pub mod playlist;
pub mod rundown;
pub mod show_style;
pub mod studio;
pub mod timeline;
pub mod update;

pub use instances::{PartInstance, PieceInstance};
pub use playlist::RundownPlaylist;
pub use rundown::{Part, Piece, PieceLifespan, Rundown, Segment};
pub use show_style::{ResolvedShowStyle, ShowStyleBase, ShowStyleVariant};
pub use studio::Studio;
pub use timeline::{TimelineComplete, TimelineObject};
