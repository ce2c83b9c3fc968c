use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Source of wall-clock timestamps (local time, for display and logging),
/// the same instant in UTC and a monotonic counter.
///
/// Heartbeat gap detection compares `utc_now` against `monotonic`, so a
/// timezone or DST change of the local reading never looks like a suspend.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
    fn utc_now(&self) -> DateTime<Utc>;
    fn monotonic(&self) -> Duration;
}

pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic(&self) -> Duration {
        self.origin.elapsed()
    }
}

#[derive(Debug, Clone, Copy)]
struct ManualReading {
    wall: NaiveDateTime,
    utc: DateTime<Utc>,
    monotonic: Duration,
}

/// Hand-driven clock. `advance` moves every counter together,
/// `jump_wall` moves only wall time the way a suspended host does and
/// `shift_local` moves only the local reading, like a DST change.
pub struct ManualClock {
    reading: Mutex<ManualReading>,
}

impl ManualClock {
    pub fn new(wall: NaiveDateTime) -> Self {
        Self {
            reading: Mutex::new(ManualReading {
                wall,
                utc: Utc.from_utc_datetime(&wall),
                monotonic: Duration::ZERO,
            }),
        }
    }

    fn with_reading<T>(&self, f: impl FnOnce(&mut ManualReading) -> T) -> T {
        let mut guard = self.reading.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn advance(&self, by: Duration) {
        self.with_reading(|r| {
            r.wall += to_wall_delta(by);
            r.utc += to_wall_delta(by);
            r.monotonic += by;
        });
    }

    pub fn jump_wall(&self, by: Duration) {
        self.with_reading(|r| {
            r.wall += to_wall_delta(by);
            r.utc += to_wall_delta(by);
        });
    }

    pub fn shift_local(&self, by: chrono::Duration) {
        self.with_reading(|r| r.wall += by);
    }

    /// Moves both counters so that wall time reads `wall`. Never moves backwards.
    pub fn advance_to(&self, wall: NaiveDateTime) {
        self.with_reading(|r| {
            if let Ok(delta) = (wall - r.wall).to_std() {
                r.monotonic += delta;
                r.utc += to_wall_delta(delta);
                r.wall = wall;
            }
        });
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        self.with_reading(|r| r.wall)
    }

    fn utc_now(&self) -> DateTime<Utc> {
        self.with_reading(|r| r.utc)
    }

    fn monotonic(&self) -> Duration {
        self.with_reading(|r| r.monotonic)
    }
}

fn to_wall_delta(d: Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(d.as_millis().min(i64::MAX as u128) as i64)
}
