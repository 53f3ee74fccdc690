//! Write-only contract for finalized metrics. The core never reads these records back.

pub mod json_sink;

use std::future::Future;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::{error::TrackerError, segmentation::DaySegmentation};

pub use json_sink::JsonMetricsSink;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMetricsRecord {
    pub user_id: String,
    pub date: NaiveDate,
    pub work_start: NaiveTime,
    pub work_end: NaiveTime,
    pub lunch_start: Option<NaiveTime>,
    pub lunch_end: Option<NaiveTime>,
    pub total_hours: f64,
    pub productive_hours: f64,
    pub dead_time_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyActivityRecord {
    pub user_id: String,
    pub date: NaiveDate,
    pub hour: u32,
    pub commit_count: u32,
    pub activity_level: u32,
}

impl DailyMetricsRecord {
    /// `None` for a day without events, there is nothing to store for it.
    pub fn from_day(user_id: &str, day: &DaySegmentation) -> Option<Self> {
        let work_period = day.work_period?;
        Some(Self {
            user_id: user_id.to_owned(),
            date: day.date,
            work_start: work_period.start.time(),
            work_end: work_period.end.time(),
            lunch_start: day.lunch.map(|l| l.start.time()),
            lunch_end: day.lunch.map(|l| l.end.time()),
            total_hours: day.total_active_hours,
            productive_hours: day.productive_hours(),
            dead_time_percent: *day.dead_time_percent(),
        })
    }
}

impl HourlyActivityRecord {
    /// Every hour of the day, including empty ones, so an upsert clears stale counts.
    pub fn from_day(user_id: &str, day: &DaySegmentation) -> Vec<Self> {
        day.hourly_activity
            .iter()
            .enumerate()
            .map(|(hour, count)| Self {
                user_id: user_id.to_owned(),
                date: day.date,
                hour: hour as u32,
                commit_count: *count,
                activity_level: *count,
            })
            .collect()
    }
}

/// Receives finalized metrics. Both operations insert or replace the record with the same key.
pub trait MetricsSink {
    fn upsert_daily(
        &self,
        record: DailyMetricsRecord,
    ) -> impl Future<Output = Result<(), TrackerError>> + Send;

    fn upsert_hourly(
        &self,
        records: Vec<HourlyActivityRecord>,
    ) -> impl Future<Output = Result<(), TrackerError>> + Send;
}
