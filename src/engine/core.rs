use super::day_split::DayLogEntry;
use super::heartbeat::TickObservation;
use super::{TimerEngine, TimerStatus};
use crate::error::EngineError;
use chrono::NaiveDateTime;
use tracing::{debug, error, info, warn};

/// Entries persisted by a completed stop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReport {
    pub entries: Vec<DayLogEntry>,
    pub end_time: NaiveDateTime,
    /// Stop was forced by a heartbeat gap
    pub forced: bool,
}

impl StopReport {
    pub fn work_minutes(&self) -> i64 {
        self.entries.iter().map(|e| e.work_minutes).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// Not running; only the tick baseline was recorded
    Idle,
    Healthy { elapsed_seconds: i64 },
    ForcedStop(StopReport),
}

impl TimerEngine {
    fn invalid_transition(&self, action: &'static str) -> EngineError {
        warn!(
            "[FSM] Invalid transition: cannot {} while {}",
            action, self.session.status
        );
        EngineError::InvalidTransition {
            from: self.session.status,
            action,
        }
    }

    /// Choose the task for the next session. Only while STOPPED.
    pub fn select_task(&mut self, task: &str) -> Result<(), EngineError> {
        if self.session.status != TimerStatus::Stopped {
            return Err(self.invalid_transition("select a task"));
        }
        self.session.task = task.trim().to_string();
        info!("[FSM] Task selected: '{}'", self.session.task);
        Ok(())
    }

    pub fn set_notes(&mut self, notes: &str) {
        self.session.notes = notes.to_string();
    }

    /// Transition: Stopped → Running or Paused → Running
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.session.task.trim().is_empty() {
            warn!("[FSM] Start rejected: no task selected");
            return Err(EngineError::Validation("no task selected".to_string()));
        }

        let now = self.clock.now();
        match self.session.status {
            TimerStatus::Stopped => {
                self.session.start_time = Some(now);
                self.session.end_time = None;
                self.session.forced_end = false;
                self.segments.open(now);
                self.session.status = TimerStatus::Running;
                info!("[FSM] Stopped → Running: '{}' at {}", self.session.task, now);
                Ok(())
            }
            TimerStatus::Paused => {
                if let Some(start) = self.session.start_time {
                    if start.date() != now.date() {
                        self.accumulate_new_day_pause(now);
                    }
                }
                // Resuming discards an end fixed by a failed forced stop
                self.session.end_time = None;
                self.session.forced_end = false;
                self.segments.open(now);
                self.session.status = TimerStatus::Running;
                info!("[FSM] Paused → Running at {}", now);
                Ok(())
            }
            TimerStatus::Running => Err(self.invalid_transition("start")),
        }
    }

    /// Transition: Running → Paused
    pub fn pause(&mut self) -> Result<(), EngineError> {
        if self.session.status != TimerStatus::Running {
            return Err(self.invalid_transition("pause"));
        }
        let now = self.clock.now();
        self.close_segment(now);
        self.session.status = TimerStatus::Paused;
        info!(
            "[FSM] Running → Paused at {} ({}s worked)",
            now, self.session.work_seconds
        );
        Ok(())
    }

    /// Start/pause toggle behind a single control
    pub fn toggle(&mut self) -> Result<TimerStatus, EngineError> {
        match self.session.status {
            TimerStatus::Running => self.pause()?,
            TimerStatus::Stopped | TimerStatus::Paused => self.start()?,
        }
        Ok(self.session.status)
    }

    /// Transition: Running/Paused → Stopped, logging one entry per calendar day.
    ///
    /// No-op when already stopped. If persistence fails the session is left
    /// PAUSED so the same stop can be issued again.
    pub fn stop(&mut self) -> Result<Option<StopReport>, EngineError> {
        if self.session.status == TimerStatus::Stopped {
            debug!("[FSM] Stop ignored: already stopped");
            return Ok(None);
        }
        let end = match (self.session.forced_end, self.session.end_time) {
            (true, Some(end)) => end,
            _ => self.clock.now(),
        };
        self.finish_at(end).map(Some)
    }

    /// Discard the session without persisting anything
    pub fn reset(&mut self) {
        if self.session.is_active() {
            info!(
                "[FSM] Reset discards {} ({}s unlogged)",
                self.session.status,
                self.session.unlogged_work_seconds()
            );
        }
        self.segments.clear();
        self.session = Default::default();
    }

    /// Heartbeat tick: refresh the live value, or force a stop after a gap.
    pub fn on_heartbeat(&mut self) -> Result<HeartbeatOutcome, EngineError> {
        let wall = self.clock.now();
        let utc = self.clock.utc_now();
        let monotonic = self.clock.monotonic();
        let observation = self.heartbeat.observe(wall, utc, monotonic);

        if self.session.status != TimerStatus::Running {
            return Ok(HeartbeatOutcome::Idle);
        }

        match observation {
            TickObservation::Gap { last_wall, .. } => {
                // The last live instant can predate a segment opened between ticks
                let end = self
                    .segments
                    .open_since()
                    .map_or(last_wall, |since| last_wall.max(since));
                info!("[HEARTBEAT] Forcing stop with end time {}", end);
                self.session.end_time = Some(end);
                self.session.forced_end = true;
                self.finish_at(end).map(HeartbeatOutcome::ForcedStop)
            }
            TickObservation::First | TickObservation::Healthy => Ok(HeartbeatOutcome::Healthy {
                elapsed_seconds: self.elapsed_seconds_at(wall),
            }),
        }
    }

    /// Periodic day-boundary check. Logs every fully elapsed day of an open session.
    pub fn check_day(&mut self) -> Result<Vec<DayLogEntry>, EngineError> {
        let now = self.clock.now();
        if self.day_total.date != now.date() {
            info!(
                "[DAY_SPLIT] Day changed: {} → {}",
                self.day_total.date,
                now.date()
            );
            self.reload_day_total(now.date());
        }

        if !self.session.is_active() {
            return Ok(Vec::new());
        }
        let eval = match (self.session.forced_end, self.session.end_time) {
            (true, Some(end)) => end,
            _ => now,
        };
        self.split_elapsed_days(eval)
    }

    /// Fold the open segment at `at`; a segment ending on a later day than
    /// the session start opens a new-day pause.
    fn close_segment(&mut self, at: NaiveDateTime) {
        if self.segments.close(at, &mut self.session.work_seconds).is_none() {
            return;
        }
        if let Some(start) = self.session.start_time {
            if at.date() != start.date() {
                self.session.new_day_pause_start = Some(at);
            }
        }
    }

    fn finish_at(&mut self, end: NaiveDateTime) -> Result<StopReport, EngineError> {
        if self.session.status == TimerStatus::Running {
            self.close_segment(end);
        }
        // Paused until the entries are persisted
        self.session.status = TimerStatus::Paused;
        self.session.end_time = Some(end);

        match self.log_session(end) {
            Ok(entries) => {
                let forced = self.session.forced_end;
                self.session.finish();
                let report = StopReport {
                    entries,
                    end_time: end,
                    forced,
                };
                info!(
                    "[FSM] → Stopped at {}: {} entries, {}m work",
                    end,
                    report.entries.len(),
                    report.work_minutes()
                );
                Ok(report)
            }
            Err(e) => {
                error!("[FSM] Stop failed, session left PAUSED for retry: {}", e);
                Err(e)
            }
        }
    }
}
