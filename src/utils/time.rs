use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone};

/// This is the standard way of converting a date to a string in devtempo. Record files and
/// ledger keys both use it.
pub fn date_to_record_name(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_record_name(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// Returns start of the next day.
pub fn next_day_start<Tz: TimeZone>(date: DateTime<Tz>) -> DateTime<Tz> {
    (date + Duration::days(1)).with_time(NaiveTime::MIN).unwrap()
}

pub fn first_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = first_of_month(year, month)?;
    let next = first.checked_add_months(chrono::Months::new(1))?;
    Some((next - first).num_days() as u32)
}

/// Every date of the month in order.
pub fn month_dates(year: i32, month: u32) -> Vec<NaiveDate> {
    let Some(first) = first_of_month(year, month) else {
        return vec![];
    };
    first
        .iter_days()
        .take_while(|d| d.month() == month)
        .collect()
}

/// Fractional hours of a duration. Segmentation and aggregation report hours as floats.
pub fn hours(duration: Duration) -> f64 {
    duration.num_milliseconds() as f64 / 3_600_000.
}

/// Formats `7.5` as `7h 30m`, `0` as `0h`.
pub fn format_hours(value: f64) -> String {
    let total_minutes = (value * 60.).round() as i64;
    let (h, m) = (total_minutes / 60, total_minutes % 60);
    if m == 0 {
        format!("{h}h")
    } else {
        format!("{h}h {m}m")
    }
}
