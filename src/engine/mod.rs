use crate::clock::Clock;
use crate::persistence::PersistenceGateway;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

mod core;
pub mod day_split;
pub mod duration;
pub mod heartbeat;
pub mod segment;
pub mod session;

pub use self::core::{HeartbeatOutcome, StopReport};
pub use day_split::{DayLogEntry, DayTotal, TIME_TABLE};
pub use duration::{format_clock, humanize_minutes, DayDurations};
pub use heartbeat::{HeartbeatMonitor, TickObservation};
pub use segment::{Segment, SegmentAccumulator};
pub use session::Session;

/// Session status. Only the engine moves between these.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimerStatus {
    #[default]
    Stopped,
    Running,
    Paused,
}

impl fmt::Display for TimerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TimerStatus::Stopped => "STOPPED",
            TimerStatus::Running => "RUNNING",
            TimerStatus::Paused => "PAUSED",
        })
    }
}

/// Timing parameters injected at construction
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub tick_interval: Duration,
    /// Heartbeat gap threshold as a multiple of the tick interval
    pub gap_threshold_factor: f64,
    /// Allowed excess of wall elapsed over monotonic elapsed between ticks
    pub suspend_tolerance: Duration,
    pub day_check_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            gap_threshold_factor: 1.5,
            suspend_tolerance: Duration::from_secs(30),
            day_check_interval: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    /// `None` when the factor does not yield a representable duration
    pub fn checked_gap_threshold(&self) -> Option<Duration> {
        let secs = self.tick_interval.as_secs_f64() * self.gap_threshold_factor.max(1.0);
        Duration::try_from_secs_f64(secs).ok()
    }

    /// Saturates at `Duration::MAX`, which disables the monotonic stall check
    pub fn gap_threshold(&self) -> Duration {
        self.checked_gap_threshold().unwrap_or(Duration::MAX)
    }
}

/// Timer Engine: single owner of the session, its open segment and the heartbeat state.
///
/// Every mutation goes through `&mut self`; callers outside the event loop
/// submit commands through [`crate::runtime::EngineHandle`].
pub struct TimerEngine {
    pub(crate) session: Session,
    pub(crate) segments: SegmentAccumulator,
    pub(crate) heartbeat: HeartbeatMonitor,
    pub(crate) day_total: DayTotal,
    pub(crate) gateway: Arc<dyn PersistenceGateway>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: EngineConfig,
}

/// Serializable view of the engine for displays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    #[serde(flatten)]
    pub state: TimerStateForAPI,
    pub task: String,
    pub notes: String,
    /// Live display value: folded work plus the open segment, whole seconds
    pub elapsed_seconds: i64,
    pub work_seconds: i64,
    pub session_start: Option<NaiveDateTime>,
    pub day_work_minutes: i64,
    pub multiday_start: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(tag = "state")]
pub enum TimerStateForAPI {
    Stopped,
    Running { started_at: NaiveDateTime },
    Paused,
}

impl TimerEngine {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let today = clock.now().date();
        let day_total = DayTotal::load(gateway.as_ref(), today).unwrap_or_else(|e| {
            warn!("[DAY_SPLIT] Failed to load work total for {}: {}", today, e);
            DayTotal::empty(today)
        });
        let heartbeat = HeartbeatMonitor::new(config.gap_threshold(), config.suspend_tolerance);

        Self {
            session: Session::default(),
            segments: SegmentAccumulator::default(),
            heartbeat,
            day_total,
            gateway,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn status(&self) -> TimerStatus {
        self.session.status
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn day_work_minutes(&self) -> i64 {
        self.day_total.work_minutes
    }

    /// Whole seconds of work including the open segment at `at`
    pub fn elapsed_seconds_at(&self, at: NaiveDateTime) -> i64 {
        self.session.work_seconds + self.segments.live_seconds(at)
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        let now = self.clock.now();
        let state = match (self.session.status, self.segments.open_since()) {
            (TimerStatus::Running, Some(started_at)) => TimerStateForAPI::Running { started_at },
            (TimerStatus::Paused, _) => TimerStateForAPI::Paused,
            _ => TimerStateForAPI::Stopped,
        };
        TimerSnapshot {
            state,
            task: self.session.task.clone(),
            notes: self.session.notes.clone(),
            elapsed_seconds: self.elapsed_seconds_at(now),
            work_seconds: self.session.work_seconds,
            session_start: self.session.start_time,
            day_work_minutes: self.day_total.work_minutes,
            multiday_start: self.session.multiday_start_date,
        }
    }
}
