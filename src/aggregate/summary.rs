use chrono::Timelike;
use serde::Serialize;
use tracing::instrument;

use crate::{
    schedule::MonthSchedule,
    segmentation::DaySegmentation,
    utils::percentage::Percentage,
};

use super::heatmap::{HeatMap, HeatMapRows, DEFAULT_BUCKET_HOURS};

const PEAK_WINDOW_HOURS: u32 = 2;

/// The two-hour slot of the day with the most events over the month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeakWindow {
    pub start_hour: u32,
    pub end_hour: u32,
    pub events: u32,
}

/// Derived view over a month of segmentations. Recomputed on demand, never a source of truth.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySummary {
    pub year: i32,
    pub month: u32,
    pub total_hours: f64,
    pub workday_hours: f64,
    pub overtime_hours: f64,
    pub productive_hours: f64,
    pub active_days: usize,
    pub workday_count: usize,
    pub total_events: usize,
    pub total_commits: usize,
    pub night_event_count: usize,
    pub night_ratio: Percentage,
    pub commits_per_hour: f64,
    pub peak_window: Option<PeakWindow>,
    pub average_interval_minutes: f64,
    pub dead_time_percent: Percentage,
    pub schedule_compliance: Percentage,
    /// Events per hour of day over the whole month.
    pub hourly_activity: [u32; 24],
    pub heatmap: HeatMap,
}

/// Rolls segmentations of one month up. Days outside the schedule's month are ignored.
#[instrument(skip_all, fields(year = schedule.year, month = schedule.month, days = days.len()))]
pub fn summarize(
    days: &[DaySegmentation],
    schedule: &MonthSchedule,
    heatmap_rows: HeatMapRows,
) -> MonthlySummary {
    let hours_per_day = schedule.hours_per_day;
    let mut heatmap = HeatMap::new(heatmap_rows, schedule.year, schedule.month, DEFAULT_BUCKET_HOURS)
        .unwrap_or_else(|| HeatMap::empty(heatmap_rows));
    let mut hourly_activity = [0u32; 24];

    let (mut total_hours, mut workday_hours, mut overtime_hours, mut productive_hours) =
        (0., 0., 0., 0.);
    let (mut active_days, mut total_events, mut total_commits, mut night_event_count) =
        (0, 0, 0, 0);
    let (mut dead_hours, mut scheduled_hours) = (0., 0.);
    let (mut interval_minutes, mut interval_count) = (0., 0usize);

    for day in days.iter().filter(|d| schedule.day(d.date).is_some()) {
        total_hours += day.total_active_hours;
        productive_hours += day.productive_hours();
        total_events += day.event_count();
        total_commits += day.commit_count;
        night_event_count += day.night_event_count;
        if day.commit_count > 0 {
            active_days += 1;
        }
        if day.is_workday {
            workday_hours += day.total_active_hours;
            overtime_hours += (day.total_active_hours - hours_per_day).max(0.);
            dead_hours += day.dead_hours();
            scheduled_hours += day.net_work_hours();
        }

        for pair in day.instants.windows(2) {
            interval_minutes += (pair[1] - pair[0]).num_seconds() as f64 / 60.;
            interval_count += 1;
        }
        for instant in &day.instants {
            hourly_activity[instant.hour() as usize] += 1;
            heatmap.record(*instant);
        }
    }

    let active_hour_slots = hourly_activity.iter().filter(|c| **c > 0).count();
    let workday_count = schedule.workday_count();

    MonthlySummary {
        year: schedule.year,
        month: schedule.month,
        total_hours,
        workday_hours,
        overtime_hours,
        productive_hours,
        active_days,
        workday_count,
        total_events,
        total_commits,
        night_event_count,
        night_ratio: Percentage::ratio(night_event_count as f64, total_events as f64),
        commits_per_hour: if active_hour_slots > 0 {
            total_events as f64 / active_hour_slots as f64
        } else {
            0.
        },
        peak_window: peak_window(&hourly_activity),
        average_interval_minutes: if interval_count > 0 {
            interval_minutes / interval_count as f64
        } else {
            0.
        },
        dead_time_percent: Percentage::ratio(dead_hours, scheduled_hours),
        schedule_compliance: Percentage::unbounded_ratio(
            workday_hours,
            workday_count as f64 * hours_per_day,
        ),
        hourly_activity,
        heatmap,
    }
}

/// Busiest two-hour bucket, the earliest one wins a tie. `None` when there were no events.
fn peak_window(hourly: &[u32; 24]) -> Option<PeakWindow> {
    hourly
        .chunks(PEAK_WINDOW_HOURS as usize)
        .enumerate()
        .map(|(i, c)| (i as u32, c.iter().sum::<u32>()))
        .filter(|(_, events)| *events > 0)
        .fold(None, |best: Option<(u32, u32)>, (i, events)| match best {
            Some((_, best_events)) if best_events >= events => best,
            _ => Some((i, events)),
        })
        .map(|(i, events)| PeakWindow {
            start_hour: i * PEAK_WINDOW_HOURS,
            end_hour: (i + 1) * PEAK_WINDOW_HOURS,
            events,
        })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use crate::{
        aggregate::heatmap::HeatMapRows,
        collector::event::ActivityKind,
        schedule::{MonthSchedule, ScheduleConfig, WorkHours},
        segmentation::{segment_day, DaySegmentation, LocalEvent, SegmentationConfig},
    };

    use super::{peak_window, summarize, PeakWindow};

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 4, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn segment_month(events: &[(u32, u32, u32)]) -> (Vec<DaySegmentation>, MonthSchedule) {
        let config = ScheduleConfig {
            hours_per_day: 8.,
            work_hours: WorkHours::default(),
            ..Default::default()
        };
        let schedule = config.resolve(2025, 4);
        let events = events
            .iter()
            .map(|(d, h, m)| LocalEvent::new(at(*d, *h, *m), ActivityKind::Commit))
            .collect::<Vec<_>>();
        let days = schedule
            .days
            .values()
            .map(|s| segment_day(s, &events, &SegmentationConfig::default()).unwrap())
            .collect();
        (days, schedule)
    }

    #[test]
    fn test_night_ratio() {
        let (days, schedule) = segment_month(&[(1, 23, 0), (2, 0, 0), (2, 5, 0), (2, 14, 0)]);
        let summary = summarize(&days, &schedule, HeatMapRows::Days);
        assert_eq!(summary.total_events, 4);
        assert_eq!(summary.night_event_count, 3);
        assert!((*summary.night_ratio - 75.).abs() < 1e-9);
    }

    #[test]
    fn test_intervals_stay_within_days() {
        // The 22h gap between the two days must not be counted.
        let (days, schedule) = segment_month(&[(1, 10, 0), (1, 10, 30), (2, 8, 30), (2, 9, 30)]);
        let summary = summarize(&days, &schedule, HeatMapRows::Days);
        assert!((summary.average_interval_minutes - 45.).abs() < 1e-9);
        assert_eq!(summary.active_days, 2);
    }

    #[test]
    fn test_empty_month() {
        let (days, schedule) = segment_month(&[]);
        let summary = summarize(&days, &schedule, HeatMapRows::Weekdays);
        assert_eq!(summary.workday_count, 30);
        assert_eq!(summary.active_days, 0);
        assert_eq!(*summary.night_ratio, 0.);
        assert_eq!(*summary.schedule_compliance, 0.);
        assert_eq!(summary.commits_per_hour, 0.);
        assert_eq!(summary.peak_window, None);
        assert!(summary.heatmap.cells().iter().flatten().all(|c| *c == 0));
    }

    #[test]
    fn test_peak_window_prefers_earliest_tie() {
        let mut hourly = [0u32; 24];
        hourly[9] = 2;
        hourly[14] = 1;
        hourly[15] = 1;
        assert_eq!(
            peak_window(&hourly),
            Some(PeakWindow {
                start_hour: 8,
                end_hour: 10,
                events: 2
            })
        );
        assert_eq!(peak_window(&[0; 24]), None);
    }

    #[test]
    fn test_overtime_and_commits_per_hour() {
        // 11h between first and last event on one workday.
        let (days, schedule) = segment_month(&[(1, 8, 0), (1, 8, 30), (1, 19, 0)]);
        let summary = summarize(&days, &schedule, HeatMapRows::Days);
        assert!((summary.overtime_hours - 3.).abs() < 1e-9);
        // Three events spread over two distinct hours of day.
        assert!((summary.commits_per_hour - 1.5).abs() < 1e-9);
        assert!((*summary.schedule_compliance - 11. / 240. * 100.).abs() < 1e-9);
    }
}
