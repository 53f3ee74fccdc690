//! Turns one day of sparse activity instants into a model of when someone was working and when
//! they were idle.
//!
//! The policy knobs live in [SegmentationConfig]; [engine::segment_day] is a pure function of a
//! [DaySchedule](crate::schedule::DaySchedule) and the day's events, so days can be segmented in
//! any order or in parallel.

pub mod engine;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::{
    collector::event::{ActivityEvent, ActivityKind},
    utils::{percentage::Percentage, time::hours},
};

pub use engine::segment_day;

/// Pauses at least this long inside working hours count as dead time.
pub const DEFAULT_DEAD_THRESHOLD: Duration = Duration::hours(2);
pub const NIGHT_START_HOUR: u32 = 23;
pub const NIGHT_END_HOUR: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentationConfig {
    dead_threshold: Duration,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            dead_threshold: DEFAULT_DEAD_THRESHOLD,
        }
    }
}

impl SegmentationConfig {
    /// Threshold must be positive, otherwise the walk over the working day can't advance.
    pub fn with_dead_threshold(dead_threshold: Duration) -> Option<Self> {
        (dead_threshold > Duration::zero()).then_some(Self { dead_threshold })
    }

    pub fn dead_threshold(&self) -> Duration {
        self.dead_threshold
    }
}

/// Night is `23:00..06:00` local time.
pub fn is_night_hour(hour: u32) -> bool {
    hour >= NIGHT_START_HOUR || hour < NIGHT_END_HOUR
}

/// An activity instant expressed in the wall clock of the person being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LocalEvent {
    pub at: NaiveDateTime,
    pub kind: ActivityKind,
}

impl LocalEvent {
    pub fn new(at: NaiveDateTime, kind: ActivityKind) -> Self {
        Self { at, kind }
    }

    pub fn from_event<Tz: TimeZone>(event: &ActivityEvent, tz: &Tz) -> Self {
        Self {
            at: event.moment.with_timezone(tz).naive_local(),
            kind: event.kind,
        }
    }
}

/// Converts a local wall clock moment back to UTC. Ambiguous moments pick the earliest reading.
pub fn to_utc<Tz: TimeZone>(at: NaiveDateTime, tz: &Tz) -> Option<DateTime<chrono::Utc>> {
    tz.from_local_datetime(&at).earliest().map(|v| v.to_utc())
}

/// Half-open `[start, end)` span of local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Period {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn hours(&self) -> f64 {
        hours(self.duration())
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, moment: NaiveDateTime) -> bool {
        self.start <= moment && moment < self.end
    }

    pub fn overlaps(&self, other: &Period) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Intersection of two periods, `None` when they don't overlap.
    pub fn clamp_to(&self, bounds: &Period) -> Option<Period> {
        let clamped = Period::new(self.start.max(bounds.start), self.end.min(bounds.end));
        (!clamped.is_empty()).then_some(clamped)
    }
}

/// Result of segmenting one calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct DaySegmentation {
    pub date: NaiveDate,
    pub is_workday: bool,
    /// Every instant of the day in ascending order.
    pub instants: Vec<NaiveDateTime>,
    /// First to last instant, `None` for a day without events.
    pub work_period: Option<Period>,
    pub total_active_hours: f64,
    pub dead_periods: Vec<Period>,
    pub commit_count: usize,
    pub night_event_count: usize,
    pub hourly_activity: [u32; 24],
    /// Scheduled working window of the day.
    pub schedule_window: Period,
    /// Lunch span excluded from dead time, clipped to the working window.
    pub lunch: Option<Period>,
}

impl DaySegmentation {
    pub fn event_count(&self) -> usize {
        self.instants.len()
    }

    /// Scheduled working time net of lunch.
    pub fn net_work_hours(&self) -> f64 {
        self.schedule_window.hours() - self.lunch.map_or(0., |l| l.hours())
    }

    pub fn dead_hours(&self) -> f64 {
        self.dead_periods.iter().map(Period::hours).sum()
    }

    pub fn dead_time_percent(&self) -> Percentage {
        Percentage::ratio(self.dead_hours(), self.net_work_hours())
    }

    /// Active hours minus their dead share.
    pub fn productive_hours(&self) -> f64 {
        if self.total_active_hours <= 0. {
            return 0.;
        }
        self.total_active_hours * (1. - *self.dead_time_percent() / 100.)
    }

    /// The parts of the working window, net of lunch, that aren't dead. Empty for days where dead
    /// time isn't computed.
    pub fn active_periods(&self) -> Vec<Period> {
        if !self.is_workday || self.instants.is_empty() {
            return vec![];
        }
        let mut excluded = self.dead_periods.clone();
        excluded.extend(self.lunch);
        excluded.sort();

        let mut active = vec![];
        let mut cursor = self.schedule_window.start;
        for period in excluded {
            if period.start > cursor {
                active.push(Period::new(cursor, period.start));
            }
            cursor = cursor.max(period.end);
        }
        if cursor < self.schedule_window.end {
            active.push(Period::new(cursor, self.schedule_window.end));
        }
        active
    }

    pub fn active_sub_hours(&self) -> f64 {
        self.active_periods().iter().map(Period::hours).sum()
    }
}
