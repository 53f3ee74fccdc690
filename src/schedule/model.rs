use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::{error::TrackerError, utils::time::month_dates};

pub const DEFAULT_HOURS_PER_DAY: f64 = 8.;
pub const MIN_HOURS_PER_DAY: f64 = 1.;
pub const MAX_HOURS_PER_DAY: f64 = 24.;

/// A `[start, end)` span of wall clock time within one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(with = "hh_mm")]
    pub start: NaiveTime,
    #[serde(with = "hh_mm")]
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn from_hm(start: (u32, u32), end: (u32, u32)) -> Option<Self> {
        Some(Self {
            start: NaiveTime::from_hms_opt(start.0, start.1, 0)?,
            end: NaiveTime::from_hms_opt(end.0, end.1, 0)?,
        })
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn on(&self, date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
        (date.and_time(self.start), date.and_time(self.end))
    }

    fn validate(&self, what: &str) -> Result<(), TrackerError> {
        if self.end <= self.start {
            return Err(TrackerError::invalid_schedule(
                None,
                format!(
                    "{what} end {} must be after its start {}",
                    self.end.format("%H:%M"),
                    self.start.format("%H:%M")
                ),
            ));
        }
        Ok(())
    }
}

/// Canonical working window shared by all days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkHours {
    #[serde(with = "hh_mm")]
    pub work_start: NaiveTime,
    #[serde(with = "hh_mm")]
    pub work_end: NaiveTime,
    #[serde(default)]
    pub lunch: Option<TimeWindow>,
}

impl Default for WorkHours {
    fn default() -> Self {
        Self {
            work_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            work_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            lunch: None,
        }
    }
}

impl WorkHours {
    pub fn validate(&self) -> Result<(), TrackerError> {
        TimeWindow::new(self.work_start, self.work_end).validate("work")?;
        if let Some(lunch) = &self.lunch {
            lunch.validate("lunch")?;
        }
        Ok(())
    }
}

pub fn validate_hours_per_day(hours: f64) -> Result<(), TrackerError> {
    if !(MIN_HOURS_PER_DAY..=MAX_HOURS_PER_DAY).contains(&hours) {
        return Err(TrackerError::invalid_schedule(
            None,
            format!("hours per day must be between 1 and 24, got {hours}"),
        ));
    }
    Ok(())
}

/// Schedule of a single calendar day, resolved for one computation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DaySchedule {
    pub date: NaiveDate,
    pub is_workday: bool,
    pub work_start: NaiveTime,
    pub work_end: NaiveTime,
    pub lunch: Option<TimeWindow>,
    pub expected_hours: f64,
}

impl DaySchedule {
    pub fn new(date: NaiveDate, is_workday: bool, hours: &WorkHours, expected_hours: f64) -> Self {
        Self {
            date,
            is_workday,
            work_start: hours.work_start,
            work_end: hours.work_end,
            lunch: hours.lunch,
            expected_hours,
        }
    }

    pub fn validate(&self) -> Result<(), TrackerError> {
        TimeWindow::new(self.work_start, self.work_end)
            .validate("work")
            .and_then(|_| self.lunch.map_or(Ok(()), |l| l.validate("lunch")))
            .and_then(|_| validate_hours_per_day(self.expected_hours))
            .map_err(|e| e.on_date(self.date))
    }

    /// Replaces the configured lunch window, used when a lunch was claimed for this day.
    pub fn with_lunch(self, lunch: TimeWindow) -> Self {
        Self {
            lunch: Some(lunch),
            ..self
        }
    }

    pub fn work_window(&self) -> (NaiveDateTime, NaiveDateTime) {
        TimeWindow::new(self.work_start, self.work_end).on(self.date)
    }
}

/// Resolved schedule of one month, keyed by day of month.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthSchedule {
    pub year: i32,
    pub month: u32,
    pub hours_per_day: f64,
    pub days: BTreeMap<u32, DaySchedule>,
}

impl MonthSchedule {
    pub fn day(&self, date: NaiveDate) -> Option<&DaySchedule> {
        if date.year() != self.year || date.month() != self.month {
            return None;
        }
        self.days.get(&date.day())
    }

    pub fn workday_count(&self) -> usize {
        self.days.values().filter(|d| d.is_workday).count()
    }

    pub fn is_workday(&self, date: NaiveDate) -> bool {
        self.day(date).is_some_and(|d| d.is_workday)
    }
}

/// Ready made rotations that can be applied to a month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScheduleTemplate {
    /// Monday to Friday, 8 hours a day.
    #[value(name = "5-2")]
    FiveTwo,
    /// Two days on, two days off, 12 hours a day.
    #[value(name = "2-2")]
    TwoTwo,
}

impl ScheduleTemplate {
    pub fn hours_per_day(&self) -> f64 {
        match self {
            ScheduleTemplate::FiveTwo => 8.,
            ScheduleTemplate::TwoTwo => 12.,
        }
    }

    pub fn workdays(&self, year: i32, month: u32) -> BTreeMap<u32, bool> {
        month_dates(year, month)
            .into_iter()
            .map(|date| {
                let is_workday = match self {
                    ScheduleTemplate::FiveTwo => {
                        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
                    }
                    ScheduleTemplate::TwoTwo => matches!(date.day() % 4, 1 | 2),
                };
                (date.day(), is_workday)
            })
            .collect()
    }
}

mod hh_mm {
    use chrono::NaiveTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom)
    }
}
