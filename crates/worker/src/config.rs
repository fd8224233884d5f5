use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use rundown_core::ingest::MosGroupingConfig;
use rundown_core::models::studio::StudioSettings;
use rundown_core::playout::lookahead::DEFAULT_LOOKAHEAD_MAX_SEARCH_DISTANCE;
use rundown_events::bus::DEFAULT_CAPACITY;

/// Worker configuration loaded from environment variables.
///
/// Studio settings take precedence over these where both define a value.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Timeout of a single job attempt.
    pub job_timeout: Duration,
    /// Retry a job once after a fatal failure.
    pub retry_fatal: bool,
    /// How long a job lane with nothing queued stays alive.
    pub lane_idle_timeout: Duration,
    /// Minimum time between two takes, in ms.
    pub take_debounce_ms: i64,
    pub lookahead_max_search_distance: usize,
    pub mos_segment_separator: String,
    pub event_bus_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            job_timeout: Duration::from_millis(10_000),
            retry_fatal: true,
            lane_idle_timeout: Duration::from_millis(60_000),
            take_debounce_ms: 1_000,
            lookahead_max_search_distance: DEFAULT_LOOKAHEAD_MAX_SEARCH_DISTANCE,
            mos_segment_separator: ";".into(),
            event_bus_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default |
    /// |---------------------------------|---------|
    /// | `JOB_TIMEOUT_MS`                | `10000` |
    /// | `JOB_RETRY_FATAL`               | `true`  |
    /// | `JOB_LANE_IDLE_MS`              | `60000` |
    /// | `TAKE_DEBOUNCE_MS`              | `1000`  |
    /// | `LOOKAHEAD_MAX_SEARCH_DISTANCE` | `10`    |
    /// | `MOS_SEGMENT_SEPARATOR`         | `;`     |
    /// | `EVENT_BUS_CAPACITY`            | `1024`  |
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let job_timeout_ms: u64 = env_or("JOB_TIMEOUT_MS", 10_000)?;
        let lane_idle_ms: u64 = env_or("JOB_LANE_IDLE_MS", 60_000)?;
        let mos_segment_separator =
            std::env::var("MOS_SEGMENT_SEPARATOR").unwrap_or(defaults.mos_segment_separator);

        Ok(Self {
            job_timeout: Duration::from_millis(job_timeout_ms),
            retry_fatal: env_or("JOB_RETRY_FATAL", defaults.retry_fatal)?,
            lane_idle_timeout: Duration::from_millis(lane_idle_ms),
            take_debounce_ms: env_or("TAKE_DEBOUNCE_MS", defaults.take_debounce_ms)?,
            lookahead_max_search_distance: env_or(
                "LOOKAHEAD_MAX_SEARCH_DISTANCE",
                defaults.lookahead_max_search_distance,
            )?,
            mos_segment_separator,
            event_bus_capacity: env_or("EVENT_BUS_CAPACITY", defaults.event_bus_capacity)?,
        })
    }

    pub fn take_debounce_for(&self, settings: &StudioSettings) -> i64 {
        settings.take_debounce_ms.unwrap_or(self.take_debounce_ms)
    }

    pub fn lookahead_distance_for(&self, settings: &StudioSettings) -> usize {
        settings
            .lookahead_max_search_distance
            .unwrap_or(self.lookahead_max_search_distance)
    }

    pub fn mos_grouping_for(&self, settings: &StudioSettings) -> MosGroupingConfig {
        settings
            .mos_grouping
            .clone()
            .unwrap_or_else(|| MosGroupingConfig::with_separator(self.mos_segment_separator.clone()))
    }
}

fn env_or<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{name} must be a valid {}", std::any::type_name::<T>())),
        Err(_) => Ok(default),
    }
}
