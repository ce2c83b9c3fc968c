use chrono::{DateTime, NaiveDateTime, Utc};
use std::time::Duration;
use tracing::{debug, info};

/// What a tick saw relative to the previous one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickObservation {
    /// No previous tick to compare against
    First,
    Healthy,
    /// The host slept or the process stalled since `last_wall`, the last live instant.
    Gap {
        last_wall: NaiveDateTime,
        monotonic_elapsed: Duration,
        wall_elapsed: Duration,
    },
}

/// Heartbeat state for the whole run: the wall, UTC and monotonic readings of the last tick.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    threshold: Duration,
    suspend_tolerance: Duration,
    last_tick_wall: Option<NaiveDateTime>,
    last_tick_utc: Option<DateTime<Utc>>,
    last_tick_monotonic: Option<Duration>,
}

impl HeartbeatMonitor {
    pub fn new(threshold: Duration, suspend_tolerance: Duration) -> Self {
        Self {
            threshold,
            suspend_tolerance,
            last_tick_wall: None,
            last_tick_utc: None,
            last_tick_monotonic: None,
        }
    }

    pub fn last_tick_wall(&self) -> Option<NaiveDateTime> {
        self.last_tick_wall
    }

    /// Classify this tick, then record it as the new baseline.
    ///
    /// A gap is either a monotonic stall of at least the threshold, or wall time
    /// running ahead of monotonic time by more than the suspend tolerance
    /// (platforms whose monotonic clock keeps counting through suspend show the
    /// first, the rest show the second). Wall elapsed is measured in UTC; the
    /// local `wall` reading is only kept as the last live instant.
    pub fn observe(
        &mut self,
        wall: NaiveDateTime,
        utc: DateTime<Utc>,
        monotonic: Duration,
    ) -> TickObservation {
        let last = (self.last_tick_wall, self.last_tick_utc, self.last_tick_monotonic);
        let observation = match last {
            (Some(last_wall), Some(last_utc), Some(last_monotonic)) => {
                let monotonic_elapsed = monotonic.saturating_sub(last_monotonic);
                let wall_elapsed = (utc - last_utc).to_std().unwrap_or(Duration::ZERO);
                let unaccounted = wall_elapsed.saturating_sub(monotonic_elapsed);

                if monotonic_elapsed >= self.threshold || unaccounted > self.suspend_tolerance {
                    info!(
                        "[HEARTBEAT] Gap detected: monotonic {:?}, wall {:?} since {}",
                        monotonic_elapsed, wall_elapsed, last_wall
                    );
                    TickObservation::Gap {
                        last_wall,
                        monotonic_elapsed,
                        wall_elapsed,
                    }
                } else {
                    TickObservation::Healthy
                }
            }
            _ => {
                debug!("[HEARTBEAT] First tick at {}", wall);
                TickObservation::First
            }
        };

        self.last_tick_wall = Some(wall);
        self.last_tick_utc = Some(utc);
        self.last_tick_monotonic = Some(monotonic);
        observation
    }
}
