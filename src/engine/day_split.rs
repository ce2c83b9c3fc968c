use super::duration::{self, humanize_minutes};
use super::segment::whole_seconds;
use super::{TimerEngine, TimerStatus};
use crate::error::{EngineError, PersistenceError};
use crate::persistence::{CellValue, PersistenceGateway, Record};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, error, info, warn};

/// Table receiving one row per calendar day of a session
pub const TIME_TABLE: &str = "Time";

const DATE_FORMAT: &str = "%Y-%m-%d";
const CLOCK_FORMAT: &str = "%I:%M %p";

/// One calendar day's contribution to a session. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayLogEntry {
    pub date: NaiveDate,
    pub task: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub work_minutes: i64,
    pub pause_minutes: i64,
    pub total_minutes: i64,
    pub notes: String,
    pub multiday_start: Option<NaiveDate>,
}

impl DayLogEntry {
    pub fn new(
        task: &str,
        notes: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        work_seconds: i64,
        multiday_start: Option<NaiveDate>,
    ) -> Self {
        let durations = duration::compute(start, end, work_seconds);
        Self {
            date: start.date(),
            task: task.to_string(),
            start_time: start,
            end_time: end,
            work_minutes: durations.work_minutes,
            pause_minutes: durations.pause_minutes,
            total_minutes: durations.total_minutes,
            notes: notes.to_string(),
            multiday_start,
        }
    }

    /// Row in persisted column order
    pub fn to_record(&self) -> Record {
        Record::new()
            .with("Date", self.date.format(DATE_FORMAT).to_string())
            .with("Task", self.task.as_str())
            .with("Work_Duration", humanize_minutes(self.work_minutes))
            .with("Notes", self.notes.as_str())
            .with("Pause_Duration", humanize_minutes(self.pause_minutes))
            .with("Start_Time", self.start_time.format(CLOCK_FORMAT).to_string())
            .with("End_Time", self.end_time.format(CLOCK_FORMAT).to_string())
            .with("Work_Minutes", self.work_minutes)
            .with("Pause_Minutes", self.pause_minutes)
            .with("Total_Minutes", self.total_minutes)
            .with(
                "Multiday_Start",
                self.multiday_start
                    .map(|d| d.format(DATE_FORMAT).to_string()),
            )
    }
}

/// Work minutes already logged for one calendar day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayTotal {
    pub date: NaiveDate,
    pub work_minutes: i64,
}

impl DayTotal {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            work_minutes: 0,
        }
    }

    /// Sum `Work_Minutes` over the rows dated `date`
    pub fn load(gateway: &dyn PersistenceGateway, date: NaiveDate) -> Result<Self, PersistenceError> {
        let key = CellValue::from(date.format(DATE_FORMAT).to_string());
        let work_minutes = gateway
            .select_where(TIME_TABLE, "Date", &key)?
            .iter()
            .filter_map(|r| r.get("Work_Minutes").and_then(CellValue::as_integer))
            .sum();
        Ok(Self { date, work_minutes })
    }
}

/// First midnight strictly after `t`
pub(crate) fn next_midnight(t: NaiveDateTime) -> Option<NaiveDateTime> {
    t.date().succ_opt().and_then(|d| d.and_hms_opt(0, 0, 0))
}

impl TimerEngine {
    /// Fold a pause that straddled midnight into `new_day_pause` on resume.
    ///
    /// A pause that began after the first midnight counts from its own start,
    /// one that began before counts from that midnight. The seconds are booked
    /// against each calendar day the pause covered.
    pub(crate) fn accumulate_new_day_pause(&mut self, at: NaiveDateTime) {
        let Some(start) = self.session.start_time else {
            return;
        };
        let mut from = match self.session.new_day_pause_start.take() {
            Some(pause_start) => pause_start,
            None => match next_midnight(start) {
                Some(midnight) => midnight,
                None => return,
            },
        };
        while from < at {
            let until = next_midnight(from).map_or(at, |midnight| midnight.min(at));
            let added = whole_seconds(from, until);
            *self.session.new_day_pause.entry(from.date()).or_insert(0) += added;
            debug!("[DAY_SPLIT] New-day pause +{}s on {}", added, from.date());
            from = until;
        }
    }

    /// Log one entry per calendar day that ended before `eval`'s date.
    ///
    /// Each pass closes `[start_time, next midnight)` and commits its bookkeeping
    /// only after the append succeeds, so a failure leaves the session exactly
    /// as it was after the last persisted day. Returns the entries written.
    pub(crate) fn split_elapsed_days(
        &mut self,
        eval: NaiveDateTime,
    ) -> Result<Vec<DayLogEntry>, EngineError> {
        let mut written = Vec::new();

        while let Some(start) = self.session.start_time {
            if start.date() >= eval.date() {
                break;
            }
            let Some(boundary) = next_midnight(start) else {
                break;
            };

            let pending_pause = match self.session.status {
                TimerStatus::Paused => {
                    let since = self
                        .session
                        .new_day_pause_start
                        .map_or(boundary, |p| p.max(boundary));
                    whole_seconds(since, eval)
                }
                _ => 0,
            };
            let new_day_total = whole_seconds(boundary, eval);
            let new_day_pause = self.session.new_day_pause_since(boundary.date()) + pending_pause;
            let new_day_work = (new_day_total - new_day_pause).max(0);

            let cumulative = self.session.work_seconds + self.segments.live_seconds(eval);
            let day_length = whole_seconds(start, boundary);
            let raw_prev = cumulative - self.session.work_seconds_logged - new_day_work;
            let prev_day_work = raw_prev.clamp(0, day_length);
            if prev_day_work != raw_prev {
                warn!(
                    "[DAY_SPLIT] Clock anomaly: previous-day work {}s clipped to {}s",
                    raw_prev, prev_day_work
                );
            }

            let multiday = self.session.multiday_start_date.unwrap_or(start.date());
            let entry = DayLogEntry::new(
                &self.session.task,
                &self.session.notes,
                start,
                boundary,
                prev_day_work,
                Some(multiday),
            );

            if let Err(e) = self.gateway.append(TIME_TABLE, &entry.to_record()) {
                error!(
                    "[DAY_SPLIT] Failed to log {} for '{}': {}",
                    entry.date, entry.task, e
                );
                return Err(e.into());
            }

            self.session.work_seconds_logged += prev_day_work;
            self.session.start_time = Some(boundary);
            self.session.multiday_start_date = Some(multiday);
            // Pause on later days still counts against the next pass
            if let Some(next) = next_midnight(boundary) {
                self.session.new_day_pause = self.session.new_day_pause.split_off(&next.date());
            } else {
                self.session.new_day_pause.clear();
            }
            // An open pause that began after the following midnight stays pending
            let keep_pending = matches!(
                (self.session.new_day_pause_start, next_midnight(boundary)),
                (Some(pause_start), Some(next)) if pause_start >= next
            );
            if !keep_pending {
                self.session.new_day_pause_start = None;
            }

            info!(
                "[DAY_SPLIT] Logged {} for '{}': work {}m, pause {}m, total {}m",
                entry.date, entry.task, entry.work_minutes, entry.pause_minutes, entry.total_minutes
            );
            written.push(entry);
        }

        Ok(written)
    }

    /// Split any elapsed days, then log `[start_time, end)` with the remaining work.
    pub(crate) fn log_session(&mut self, end: NaiveDateTime) -> Result<Vec<DayLogEntry>, EngineError> {
        let mut entries = self.split_elapsed_days(end)?;

        let start = self.session.start_time.unwrap_or(end);
        let entry = DayLogEntry::new(
            &self.session.task,
            &self.session.notes,
            start,
            end.max(start),
            self.session.unlogged_work_seconds(),
            self.session.multiday_start_date,
        );
        if let Err(e) = self.gateway.append(TIME_TABLE, &entry.to_record()) {
            error!(
                "[DAY_SPLIT] Failed to log final entry for '{}': {}",
                entry.task, e
            );
            return Err(e.into());
        }
        info!(
            "[DAY_SPLIT] Logged {} for '{}': work {}m, pause {}m, total {}m",
            entry.date, entry.task, entry.work_minutes, entry.pause_minutes, entry.total_minutes
        );

        self.session.work_seconds_logged = self.session.work_seconds;
        self.refresh_day_total(&entry);
        entries.push(entry);
        Ok(entries)
    }

    /// Keep today's work total current after a final entry lands.
    fn refresh_day_total(&mut self, entry: &DayLogEntry) {
        let today = self.clock.now().date();
        if self.day_total.date == today && entry.date == today {
            self.day_total.work_minutes += entry.work_minutes;
            return;
        }
        self.reload_day_total(today);
    }

    pub(crate) fn reload_day_total(&mut self, today: NaiveDate) {
        match DayTotal::load(self.gateway.as_ref(), today) {
            Ok(total) => self.day_total = total,
            Err(e) => {
                warn!("[DAY_SPLIT] Failed to reload work total for {}: {}", today, e);
                self.day_total = DayTotal::empty(today);
            }
        }
    }
}
