//! Per-playlist store of user-facing notes.
//!
//! Notes come from several sources (ingest, playout, blueprints). Each
//! source replaces its own set as a whole; readers get the aggregated,
//! de-duplicated list. A change publishes [`NOTES_UPDATED`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rundown_core::ids::RundownPlaylistId;
use rundown_core::notes::{aggregate_notes, NoteSeverity, TrackedNote};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;

use crate::bus::{EventBus, PlayoutEvent};
use crate::names::NOTES_UPDATED;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteSource {
    Ingest,
    Playout,
    Blueprint,
}

type PlaylistNotes = BTreeMap<NoteSource, Vec<TrackedNote>>;

pub struct NotificationCenter {
    notes: RwLock<HashMap<RundownPlaylistId, PlaylistNotes>>,
    bus: Arc<EventBus>,
}

impl NotificationCenter {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            notes: RwLock::new(HashMap::new()),
            bus,
        }
    }

    /// Replace everything `source` reported for the playlist.
    ///
    /// Returns whether anything changed; only then is an event published.
    pub async fn replace(
        &self,
        playlist_id: &RundownPlaylistId,
        source: NoteSource,
        notes: Vec<TrackedNote>,
    ) -> bool {
        let changed = {
            let mut all = self.notes.write().await;
            let playlist = all.entry(playlist_id.clone()).or_default();
            let previous = playlist.get(&source).map(Vec::as_slice).unwrap_or_default();
            if previous == notes.as_slice() {
                false
            } else {
                if notes.is_empty() {
                    playlist.remove(&source);
                } else {
                    playlist.insert(source, notes);
                }
                true
            }
        };

        if changed {
            let counts = self.severity_counts(playlist_id).await;
            self.bus.publish(
                PlayoutEvent::new(NOTES_UPDATED)
                    .for_playlist(playlist_id.clone())
                    .with_payload(json!({ "source": source, "counts": counts })),
            );
        }
        changed
    }

    /// All notes of the playlist, most severe first.
    pub async fn notes_for(&self, playlist_id: &RundownPlaylistId) -> Vec<TrackedNote> {
        let all = self.notes.read().await;
        match all.get(playlist_id) {
            Some(sources) => aggregate_notes(sources.values().cloned()),
            None => Vec::new(),
        }
    }

    pub async fn clear_playlist(&self, playlist_id: &RundownPlaylistId) {
        if self.notes.write().await.remove(playlist_id).is_some() {
            self.bus.publish(
                PlayoutEvent::new(NOTES_UPDATED)
                    .for_playlist(playlist_id.clone())
                    .with_payload(json!({ "cleared": true })),
            );
        }
    }

    async fn severity_counts(&self, playlist_id: &RundownPlaylistId) -> BTreeMap<NoteSeverity, usize> {
        let mut counts = BTreeMap::new();
        for note in self.notes_for(playlist_id).await {
            *counts.entry(note.severity).or_insert(0) += 1;
        }
        counts
    }
}
