use super::segment::whole_seconds;
use chrono::{NaiveDateTime, Timelike};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayDurations {
    pub work_minutes: i64,
    pub pause_minutes: i64,
    pub total_minutes: i64,
}

fn floor_to_minute(t: NaiveDateTime) -> NaiveDateTime {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

/// Split `[start, end)` into work and pause minutes given the folded work seconds.
///
/// The total is measured between minute-trimmed endpoints, pause is whatever
/// wall time was not work, and work is derived from the two so that
/// `work + pause == total` holds for every result.
pub fn compute(start: NaiveDateTime, end: NaiveDateTime, work_seconds: i64) -> DayDurations {
    let total_minutes = whole_seconds(floor_to_minute(start), floor_to_minute(end)) / 60;
    let actual_seconds = whole_seconds(start, end);

    let pause_seconds = (actual_seconds - work_seconds).max(0);
    let mut pause_minutes = pause_seconds / 60;
    if pause_minutes > total_minutes {
        warn!(
            "[DURATION] Clock anomaly: pause {}m exceeds total {}m, clipping",
            pause_minutes, total_minutes
        );
        pause_minutes = total_minutes;
    }

    DayDurations {
        work_minutes: (total_minutes - pause_minutes).max(0),
        pause_minutes,
        total_minutes,
    }
}

/// `"0"` for no duration, otherwise `"1h 05m"` or `"42m"`.
pub fn humanize_minutes(minutes: i64) -> String {
    if minutes <= 0 {
        return "0".to_string();
    }
    let hours = minutes / 60;
    let mins = minutes % 60;
    if hours > 0 {
        format!("{}h {:02}m", hours, mins)
    } else {
        format!("{}m", mins)
    }
}

/// `HH:MM:SS` for the live timer display
pub fn format_clock(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}
