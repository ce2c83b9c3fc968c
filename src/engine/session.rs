use super::TimerStatus;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

/// The single active (or idle) unit of tracked work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Empty means no session may start
    pub task: String,
    pub notes: String,
    pub status: TimerStatus,
    /// Set on the first RUNNING transition; advanced to each midnight once that day is logged
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub work_seconds: i64,
    /// Seconds already flushed to persisted day entries
    pub work_seconds_logged: i64,
    pub multiday_start_date: Option<NaiveDate>,
    /// Pause seconds after the first midnight following `start_time`, per calendar day
    pub new_day_pause: BTreeMap<NaiveDate, i64>,
    /// Start of a pause that began after that midnight and is still open
    pub new_day_pause_start: Option<NaiveDateTime>,
    /// `end_time` was fixed by a heartbeat gap and must survive a failed stop
    pub forced_end: bool,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.status != TimerStatus::Stopped
    }

    /// Work seconds not yet written to any day entry
    pub fn unlogged_work_seconds(&self) -> i64 {
        (self.work_seconds - self.work_seconds_logged).max(0)
    }

    /// Resolved new-day pause falling on `date` or later
    pub fn new_day_pause_since(&self, date: NaiveDate) -> i64 {
        self.new_day_pause.range(date..).map(|(_, secs)| secs).sum()
    }

    /// Back to idle after a successful stop. The task stays selected.
    pub(crate) fn finish(&mut self) {
        let task = std::mem::take(&mut self.task);
        *self = Session {
            task,
            ..Session::default()
        };
    }
}
