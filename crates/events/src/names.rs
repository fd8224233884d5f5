//! Event type names published on the bus.

pub const PLAYLIST_ACTIVATED: &str = "playlist.activated";
pub const PLAYLIST_DEACTIVATED: &str = "playlist.deactivated";
pub const PLAYLIST_RESET: &str = "playlist.reset";

pub const PART_TAKEN: &str = "playout.take";
pub const NEXT_PART_CHANGED: &str = "playout.next_changed";
pub const PART_PLAYBACK_STARTED: &str = "playout.part_started";
pub const PART_PLAYBACK_STOPPED: &str = "playout.part_stopped";
pub const ACTION_EXECUTED: &str = "playout.action_executed";
pub const QUICK_LOOP_CHANGED: &str = "playout.quick_loop_changed";

pub const TIMELINE_UPDATED: &str = "timeline.updated";
pub const ROUTE_SET_SWITCHED: &str = "studio.route_set_switched";

pub const RUNDOWN_INGESTED: &str = "ingest.rundown_updated";
pub const RUNDOWN_REMOVED: &str = "ingest.rundown_removed";

pub const NOTES_UPDATED: &str = "notes.updated";
