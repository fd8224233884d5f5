//! Playout event bus and notification infrastructure.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`PlayoutEvent`]: the event envelope; names live in [`names`].
//! - [`SubscriberRegistry`]: enumerable per-subscriber channels, used for
//!   pushing timelines to the device layer.
//! - [`NotificationCenter`]: aggregated user-facing notes per playlist.

pub mod bus;
pub mod names;
pub mod notes;
pub mod subscribers;

pub use bus::{EventBus, PlayoutEvent};
pub use notes::{NoteSource, NotificationCenter};
pub use subscribers::SubscriberRegistry;
