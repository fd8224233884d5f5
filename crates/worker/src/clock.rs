use rundown_core::types::{now_millis, Time};

/// Source of the current time for playout decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> Time;
}

/// Wall-clock time at construction, advanced by the tokio clock.
///
/// Under a paused tokio runtime the time only moves when tokio's does, so
/// timer-driven behaviour (autonext, take debounce) is deterministic.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin_time: Time,
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self::starting_at(now_millis())
    }

    pub fn starting_at(origin_time: Time) -> Self {
        Self {
            origin_time,
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Time {
        self.origin_time + self.origin.elapsed().as_millis() as Time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn follows_tokio_time() {
        let clock = TokioClock::starting_at(1_000);
        assert_eq!(clock.now(), 1_000);
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(clock.now(), 3_500);
    }
}
