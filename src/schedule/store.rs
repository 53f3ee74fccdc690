use std::{collections::BTreeMap, path::PathBuf};

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::{
    error::TrackerError,
    storage::json_store::{JsonStore, StoreError},
    utils::time::month_dates,
};

use super::model::{
    validate_hours_per_day, DaySchedule, MonthSchedule, ScheduleTemplate, WorkHours,
    DEFAULT_HOURS_PER_DAY,
};

fn default_hours_per_day() -> f64 {
    DEFAULT_HOURS_PER_DAY
}

/// Persisted schedule configuration. Months are keyed as `YYYY-MM` and map day of month to
/// whether it's a workday.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_hours_per_day")]
    pub hours_per_day: f64,
    #[serde(default)]
    pub work_hours: WorkHours,
    #[serde(default)]
    pub months: BTreeMap<String, BTreeMap<u32, bool>>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            hours_per_day: DEFAULT_HOURS_PER_DAY,
            work_hours: WorkHours::default(),
            months: BTreeMap::new(),
        }
    }
}

fn month_key(year: i32, month: u32) -> String {
    format!("{year:04}-{month:02}")
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<(), TrackerError> {
        validate_hours_per_day(self.hours_per_day)?;
        self.work_hours.validate()
    }

    /// Resolves every day of the month. Days without explicit configuration are workdays.
    /// Values are not validated here, each [DaySchedule] is checked where it's used.
    pub fn resolve(&self, year: i32, month: u32) -> MonthSchedule {
        let configured = self.months.get(&month_key(year, month));
        let days = month_dates(year, month)
            .into_iter()
            .map(|date| {
                let is_workday = configured
                    .and_then(|m| m.get(&date.day()).copied())
                    .unwrap_or(true);
                (
                    date.day(),
                    DaySchedule::new(date, is_workday, &self.work_hours, self.hours_per_day),
                )
            })
            .collect();
        MonthSchedule {
            year,
            month,
            hours_per_day: self.hours_per_day,
            days,
        }
    }
}

impl From<StoreError> for TrackerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Format { .. } => TrackerError::invalid_schedule(None, value.to_string()),
            StoreError::Io { .. } => TrackerError::source_unavailable("schedule store", value),
        }
    }
}

/// File backed schedule configuration. Reads never fail on a missing file, writes are validated
/// before they reach the disk.
pub struct ScheduleStore {
    store: JsonStore<ScheduleConfig>,
}

impl ScheduleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonStore::new(path),
        }
    }

    pub async fn load(&self) -> Result<ScheduleConfig, TrackerError> {
        Ok(self.store.load().await?)
    }

    pub async fn resolve(&self, year: i32, month: u32) -> Result<MonthSchedule, TrackerError> {
        Ok(self.load().await?.resolve(year, month))
    }

    pub async fn hours_per_day(&self) -> Result<f64, TrackerError> {
        Ok(self.load().await?.hours_per_day)
    }

    #[instrument(skip(self))]
    pub async fn set_hours_per_day(&self, hours: f64) -> Result<(), TrackerError> {
        validate_hours_per_day(hours)?;
        self.store
            .update(|config| {
                config.hours_per_day = hours;
                Ok::<_, TrackerError>(())
            })
            .await?;
        info!("Saved hours per day");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn set_work_hours(&self, work_hours: WorkHours) -> Result<(), TrackerError> {
        work_hours.validate()?;
        self.store
            .update(|config| {
                config.work_hours = work_hours;
                Ok::<_, TrackerError>(())
            })
            .await?;
        info!("Saved work hours");
        Ok(())
    }

    /// Overrides individual days of a month. Days outside the month are rejected.
    #[instrument(skip(self, days))]
    pub async fn apply_month(
        &self,
        year: i32,
        month: u32,
        days: BTreeMap<u32, bool>,
    ) -> Result<(), TrackerError> {
        let valid_days = month_dates(year, month).len() as u32;
        if valid_days == 0 {
            return Err(TrackerError::invalid_schedule(
                None,
                format!("{year}-{month:02} is not a valid month"),
            ));
        }
        if let Some(day) = days.keys().find(|d| **d == 0 || **d > valid_days) {
            return Err(TrackerError::invalid_schedule(
                None,
                format!("{year}-{month:02} has no day {day}"),
            ));
        }
        self.store
            .update(|config| {
                config
                    .months
                    .entry(month_key(year, month))
                    .or_default()
                    .extend(days);
                Ok::<_, TrackerError>(())
            })
            .await?;
        info!("Applied schedule for {year}-{month:02}");
        Ok(())
    }

    /// Applies a rotation to a month and stores the rotation's daily hours.
    pub async fn apply_template(
        &self,
        year: i32,
        month: u32,
        template: ScheduleTemplate,
    ) -> Result<(), TrackerError> {
        self.apply_month(year, month, template.workdays(year, month))
            .await?;
        self.set_hours_per_day(template.hours_per_day()).await
    }
}
