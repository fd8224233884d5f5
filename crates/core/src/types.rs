/// All wall-clock timestamps stored on documents are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Milliseconds since the Unix epoch. Timeline and playout timings use this
/// representation because the device layer resolves plain numbers.
pub type Time = i64;

/// Durations and part-relative offsets, in milliseconds.
pub type Duration = i64;

/// Current wall-clock time as [`Time`].
pub fn now_millis() -> Time {
    chrono::Utc::now().timestamp_millis()
}
