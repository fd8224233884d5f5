//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`PlayoutEvent`]s. It is
//! shared via `Arc<EventBus>` between the worker's jobs and whatever
//! consumes playout changes.

use chrono::{DateTime, Utc};
use rundown_core::ids::{RundownPlaylistId, StudioId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// PlayoutEvent
// ---------------------------------------------------------------------------

/// Something that happened to a studio or playlist.
///
/// Constructed via [`PlayoutEvent::new`] and enriched with the builder
/// methods [`for_playlist`](PlayoutEvent::for_playlist),
/// [`for_studio`](PlayoutEvent::for_studio) and
/// [`with_payload`](PlayoutEvent::with_payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayoutEvent {
    /// Dot-separated event name, see [`crate::names`].
    pub event_type: String,

    pub studio_id: Option<StudioId>,

    pub playlist_id: Option<RundownPlaylistId>,

    /// Event-specific data.
    pub payload: serde_json::Value,

    pub timestamp: DateTime<Utc>,
}

impl PlayoutEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            studio_id: None,
            playlist_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn for_studio(mut self, studio_id: StudioId) -> Self {
        self.studio_id = Some(studio_id);
        self
    }

    pub fn for_playlist(mut self, playlist_id: RundownPlaylistId) -> Self {
        self.playlist_id = Some(playlist_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
pub const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`PlayoutEvent`].
///
/// # Usage
///
/// ```rust
/// use rundown_events::bus::{EventBus, PlayoutEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(PlayoutEvent::new("playlist.activated"));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<PlayoutEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed events are dropped
    /// and slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to all current subscribers. Returns how many
    /// received it; with no subscribers the event is dropped.
    pub fn publish(&self, event: PlayoutEvent) -> usize {
        tracing::debug!(event_type = %event.event_type, "Publishing event");
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayoutEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let event = PlayoutEvent::new("playout.take")
            .for_studio("studio0".into())
            .for_playlist("pl1".into())
            .with_payload(serde_json::json!({"part_instance_id": "abc"}));

        assert_eq!(bus.publish(event), 1);

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.event_type, "playout.take");
        assert_eq!(received.studio_id, Some(StudioId::new("studio0")));
        assert_eq!(received.playlist_id, Some(RundownPlaylistId::new("pl1")));
        assert_eq!(received.payload["part_instance_id"], "abc");
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(PlayoutEvent::new("timeline.updated"));

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");

        assert_eq!(e1.event_type, "timeline.updated");
        assert_eq!(e2.event_type, "timeline.updated");
    }

    #[tokio::test]
    async fn slow_subscriber_observes_lag() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for i in 0..4 {
            bus.publish(PlayoutEvent::new(format!("event.{i}")));
        }
        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(2))));
        assert_eq!(rx.recv().await.unwrap().event_type, "event.2");
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(PlayoutEvent::new("orphan.event")), 0);
    }

    #[test]
    fn default_event_has_empty_optional_fields() {
        let event = PlayoutEvent::new("bare.event");
        assert!(event.studio_id.is_none());
        assert!(event.playlist_id.is_none());
        assert!(event.payload.is_object());
    }
}
