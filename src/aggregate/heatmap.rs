use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use clap::ValueEnum;
use serde::Serialize;

use crate::utils::time::days_in_month;

pub const DEFAULT_BUCKET_HOURS: u32 = 3;

/// What a heat-map row stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeatMapRows {
    /// One row per day of the month.
    #[default]
    Days,
    /// Seven rows, Monday first. Days of the month are folded onto their weekday.
    Weekdays,
}

/// Event counts per row and hour bucket. Always fully populated with zeros.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatMap {
    rows: HeatMapRows,
    year: i32,
    month: u32,
    bucket_hours: u32,
    cells: Vec<Vec<u32>>,
}

impl HeatMap {
    /// `None` for an invalid month or a bucket width outside `1..=24`.
    pub fn new(rows: HeatMapRows, year: i32, month: u32, bucket_hours: u32) -> Option<Self> {
        if !(1..=24).contains(&bucket_hours) {
            return None;
        }
        let row_count = match rows {
            HeatMapRows::Days => days_in_month(year, month)? as usize,
            HeatMapRows::Weekdays => {
                days_in_month(year, month)?;
                7
            }
        };
        let columns = 24u32.div_ceil(bucket_hours) as usize;
        Some(Self {
            rows,
            year,
            month,
            bucket_hours,
            cells: vec![vec![0; columns]; row_count],
        })
    }

    /// A map without rows, for a month that doesn't exist.
    pub fn empty(rows: HeatMapRows) -> Self {
        Self {
            rows,
            year: 0,
            month: 0,
            bucket_hours: DEFAULT_BUCKET_HOURS,
            cells: vec![],
        }
    }

    /// Counts an instant. Instants from other months are ignored.
    pub fn record(&mut self, at: NaiveDateTime) {
        if at.year() != self.year || at.month() != self.month {
            return;
        }
        let row = match self.rows {
            HeatMapRows::Days => at.day0() as usize,
            HeatMapRows::Weekdays => at.weekday().num_days_from_monday() as usize,
        };
        let column = (at.hour() / self.bucket_hours) as usize;
        self.cells[row][column] += 1;
    }

    pub fn rows(&self) -> HeatMapRows {
        self.rows
    }

    pub fn bucket_hours(&self) -> u32 {
        self.bucket_hours
    }

    pub fn cells(&self) -> &[Vec<u32>] {
        &self.cells
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<u32> {
        self.cells.get(row)?.get(column).copied()
    }

    pub fn max(&self) -> u32 {
        self.cells.iter().flatten().copied().max().unwrap_or(0)
    }

    pub fn row_label(&self, row: usize) -> String {
        match self.rows {
            HeatMapRows::Days => format!("{:>2}", row + 1),
            HeatMapRows::Weekdays => Weekday::try_from(row as u8)
                .map(|d| d.to_string())
                .unwrap_or_default(),
        }
    }

    pub fn column_label(&self, column: usize) -> String {
        format!("{:02}", column as u32 * self.bucket_hours)
    }
}
