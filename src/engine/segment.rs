use chrono::NaiveDateTime;
use tracing::{debug, warn};

/// Contiguous interval of RUNNING time. `end` stays unset while open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
}

/// Whole seconds between two instants, truncated.
/// A negative span is a clock anomaly and counts as zero.
pub fn whole_seconds(start: NaiveDateTime, end: NaiveDateTime) -> i64 {
    let secs = (end - start).num_seconds();
    if secs < 0 {
        warn!(
            "[SEGMENT] Clock anomaly: end {} precedes start {}, clipping to 0",
            end, start
        );
        return 0;
    }
    secs
}

/// Owns the at-most-one open segment and folds closed segments into work seconds.
#[derive(Debug, Default)]
pub struct SegmentAccumulator {
    open: Option<Segment>,
}

impl SegmentAccumulator {
    pub fn open(&mut self, at: NaiveDateTime) {
        if let Some(existing) = self.open {
            warn!(
                "[SEGMENT] Segment already open since {}, ignoring open at {}",
                existing.start, at
            );
            return;
        }
        self.open = Some(Segment {
            start: at,
            end: None,
        });
    }

    /// Close the open segment at `at` and add its truncated length to `work_seconds`.
    pub fn close(&mut self, at: NaiveDateTime, work_seconds: &mut i64) -> Option<Segment> {
        let segment = self.open.take()?;
        let end = at.max(segment.start);
        let folded = whole_seconds(segment.start, at);
        *work_seconds = work_seconds.saturating_add(folded);
        debug!(
            "[SEGMENT] Closed {} -> {} (+{}s, total {}s)",
            segment.start, end, folded, work_seconds
        );
        Some(Segment {
            start: segment.start,
            end: Some(end),
        })
    }

    pub fn open_since(&self) -> Option<NaiveDateTime> {
        self.open.map(|s| s.start)
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Elapsed whole seconds of the open segment, for display only
    pub fn live_seconds(&self, at: NaiveDateTime) -> i64 {
        self.open
            .map(|s| (at - s.start).num_seconds().max(0))
            .unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.open = None;
    }
}
