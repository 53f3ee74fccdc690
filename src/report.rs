//! One monthly analysis request from raw sources to a summary.
//!
//! Source failures abort the request. A broken day is flagged and skipped, and a missing lunch
//! ledger or metrics store degrades the report instead of failing it.

use std::{collections::BTreeMap, path::PathBuf};

use chrono::{NaiveDate, NaiveTime, TimeZone};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::{
    aggregate::{summarize, HeatMapRows, MonthlySummary},
    collector::{
        retention::{collect_history, HistorySources, RetentionWindow},
        vcs::{CommitQuery, FileChangeStats, VcsSource},
    },
    error::TrackerError,
    lunch::{LunchClaims, LunchLedger},
    persistence::{DailyMetricsRecord, HourlyActivityRecord, MetricsSink},
    schedule::{DaySchedule, ScheduleStore, TimeWindow},
    segmentation::{segment_day, DaySegmentation, LocalEvent, SegmentationConfig},
    storage::pulse_storage::PulseStorage,
};

#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub year: i32,
    pub month: u32,
    /// Repository to read commits from. Without one only recorded pulses are used.
    pub repo: Option<PathBuf>,
    pub author: Option<String>,
    pub max_count: Option<usize>,
    /// Key under which daily and hourly metrics are saved. Nothing is saved without it.
    pub user_id: Option<String>,
    pub heatmap_rows: HeatMapRows,
}

impl ReportRequest {
    pub fn new(year: i32, month: u32) -> Self {
        Self {
            year,
            month,
            repo: None,
            author: None,
            max_count: None,
            user_id: None,
            heatmap_rows: HeatMapRows::default(),
        }
    }
}

/// A day that couldn't be segmented.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayFlag {
    pub date: NaiveDate,
    pub reason: String,
}

/// Something the report had to do without.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// Configured lunch windows were used for every day.
    LunchLedgerUnavailable { reason: String },
    MetricsNotSaved { reason: String },
}

#[derive(Debug, Clone)]
pub struct MonthlyReport {
    pub summary: MonthlySummary,
    pub days: Vec<DaySegmentation>,
    pub flags: Vec<DayFlag>,
    pub degradations: Vec<Degradation>,
    pub changes: FileChangeStats,
}

/// Everything a report reads from or writes to.
pub struct ReportSources<'a, V, P, S> {
    pub schedule: &'a ScheduleStore,
    pub ledger: &'a LunchLedger,
    pub vcs: &'a V,
    pub pulses: Option<&'a P>,
    pub sink: Option<&'a S>,
    pub segmentation: SegmentationConfig,
}

#[instrument(skip(sources, tz), fields(year = request.year, month = request.month))]
pub async fn analyze_month<V, P, S, Tz>(
    sources: &ReportSources<'_, V, P, S>,
    request: &ReportRequest,
    tz: &Tz,
) -> Result<MonthlyReport, TrackerError>
where
    V: VcsSource,
    P: PulseStorage,
    S: MetricsSink,
    Tz: TimeZone,
{
    let window = RetentionWindow::month(request.year, request.month, tz).ok_or_else(|| {
        TrackerError::invalid_schedule(
            None,
            format!("{}-{:02} is not a valid month", request.year, request.month),
        )
    })?;
    let schedule = sources
        .schedule
        .resolve(request.year, request.month)
        .await?;

    let vcs = request.repo.as_ref().map(|repo| {
        (
            sources.vcs,
            CommitQuery::new(repo)
                .author(request.author.clone())
                .max_count(request.max_count)
                .between(window.start, window.end),
        )
    });
    let history = collect_history(
        HistorySources {
            vcs,
            pulses: sources.pulses,
        },
        window,
    )
    .await?;

    let mut degradations = vec![];
    let claims = match sources.ledger.load().await {
        Ok(claims) => claims,
        Err(e) => {
            warn!("Continuing without lunch claims {e}");
            degradations.push(Degradation::LunchLedgerUnavailable {
                reason: e.to_string(),
            });
            LunchClaims::default()
        }
    };

    let mut by_date = BTreeMap::<NaiveDate, Vec<LocalEvent>>::new();
    for event in &history.events {
        let local = LocalEvent::from_event(event, tz);
        by_date.entry(local.at.date()).or_default().push(local);
    }

    let mut days = vec![];
    let mut flags = vec![];
    for day_schedule in schedule.days.values() {
        let day_schedule = with_claimed_lunch(day_schedule.clone(), &claims, tz);
        let events = by_date
            .get(&day_schedule.date)
            .map(Vec::as_slice)
            .unwrap_or_default();
        match segment_day(&day_schedule, events, &sources.segmentation) {
            Ok(day) => days.push(day),
            Err(e) => {
                warn!("Skipping {} {e}", day_schedule.date);
                flags.push(DayFlag {
                    date: day_schedule.date,
                    reason: e.to_string(),
                });
            }
        }
    }

    let summary = summarize(&days, &schedule, request.heatmap_rows);

    if let (Some(sink), Some(user_id)) = (sources.sink, &request.user_id) {
        if let Err(e) = save_metrics(sink, user_id, &days).await {
            warn!("Metrics were not saved {e}");
            degradations.push(Degradation::MetricsNotSaved {
                reason: e.to_string(),
            });
        }
    }

    info!(
        "Analyzed {} events over {} days, {} flagged",
        summary.total_events,
        days.len(),
        flags.len()
    );
    Ok(MonthlyReport {
        summary,
        days,
        flags,
        degradations,
        changes: history.changes,
    })
}

/// A claimed lunch replaces the configured window for its day. The claim is cut at midnight.
fn with_claimed_lunch<Tz: TimeZone>(
    schedule: DaySchedule,
    claims: &LunchClaims,
    tz: &Tz,
) -> DaySchedule {
    let Some((start, end)) = claims.period(schedule.date) else {
        return schedule;
    };
    let (start, end) = (
        start.with_timezone(tz).naive_local(),
        end.with_timezone(tz).naive_local(),
    );
    if start.date() != schedule.date {
        return schedule;
    }
    let end = if end.date() == schedule.date {
        end.time()
    } else {
        NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
    };
    if end <= start.time() {
        return schedule;
    }
    schedule.with_lunch(TimeWindow::new(start.time(), end))
}

async fn save_metrics<S: MetricsSink>(
    sink: &S,
    user_id: &str,
    days: &[DaySegmentation],
) -> Result<(), TrackerError> {
    for day in days {
        let Some(daily) = DailyMetricsRecord::from_day(user_id, day) else {
            continue;
        };
        sink.upsert_daily(daily).await?;
        sink.upsert_hourly(HourlyActivityRecord::from_day(user_id, day))
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{NaiveDate, TimeZone, Utc};
    use tempfile::{tempdir, TempDir};

    use crate::{
        collector::vcs::{tests::FakeVcs, CommitRecord, FileChangeStats},
        error::TrackerError,
        lunch::LunchLedger,
        persistence::JsonMetricsSink,
        schedule::{ScheduleStore, ScheduleTemplate, TimeWindow, WorkHours},
        segmentation::{Period, SegmentationConfig},
        storage::pulse_storage::PulseStorageImpl,
    };

    use super::{analyze_month, Degradation, ReportRequest, ReportSources};

    /// Ten commits in April 2025, hours in UTC.
    const COMMITS: [(u32, u32, u32); 10] = [
        (1, 9, 0),
        (1, 12, 0),
        (1, 18, 30),
        (2, 10, 0),
        (2, 15, 0),
        (3, 8, 0),
        (3, 19, 0),
        (5, 10, 0),
        (5, 14, 0),
        (7, 11, 0),
    ];

    fn fixture_vcs() -> FakeVcs {
        FakeVcs::with_commits(
            COMMITS
                .iter()
                .map(|(d, h, m)| CommitRecord {
                    moment: Utc.with_ymd_and_hms(2025, 4, *d, *h, *m, 0).unwrap(),
                    author_email: "dev@example.com".into(),
                    stats: FileChangeStats {
                        files_changed: 1,
                        insertions: 10,
                        deletions: 2,
                    },
                })
                .collect(),
        )
    }

    struct Fixture {
        dir: TempDir,
        schedule: ScheduleStore,
        ledger: LunchLedger,
        sink: JsonMetricsSink,
    }

    async fn fixture() -> Result<Fixture> {
        let dir = tempdir()?;
        let schedule = ScheduleStore::new(dir.path().join("schedule.json"));
        schedule
            .apply_template(2025, 4, ScheduleTemplate::FiveTwo)
            .await?;
        Ok(Fixture {
            ledger: LunchLedger::at(dir.path().join("lunch.json")),
            sink: JsonMetricsSink::new(dir.path().join("metrics.json")),
            schedule,
            dir,
        })
    }

    fn request(fixture: &Fixture) -> ReportRequest {
        ReportRequest {
            repo: Some(fixture.dir.path().to_owned()),
            user_id: Some("dev".into()),
            ..ReportRequest::new(2025, 4)
        }
    }

    #[tokio::test]
    async fn test_month_end_to_end() -> Result<()> {
        let fixture = fixture().await?;
        let vcs = fixture_vcs();
        let sources = ReportSources::<_, PulseStorageImpl, _> {
            schedule: &fixture.schedule,
            ledger: &fixture.ledger,
            vcs: &vcs,
            pulses: None,
            sink: Some(&fixture.sink),
            segmentation: SegmentationConfig::default(),
        };

        let report = analyze_month(&sources, &request(&fixture), &Utc).await?;
        let summary = &report.summary;

        // 22 weekdays in April 2025. Workday spans are 9.5h, 5h, 11h and 0h, the Saturday 4h.
        assert_eq!(summary.workday_count, 22);
        assert_eq!(summary.active_days, 5);
        assert_eq!(summary.total_commits, 10);
        assert!((summary.total_hours - 29.5).abs() < 1e-9);
        assert!((summary.workday_hours - 25.5).abs() < 1e-9);
        assert!((summary.overtime_hours - 4.5).abs() < 1e-9);
        assert!((*summary.schedule_compliance - 25.5 / 176. * 100.).abs() < 1e-9);
        assert_eq!(report.days.len(), 30);
        assert!(report.flags.is_empty());
        assert!(report.degradations.is_empty());
        assert_eq!(report.changes.insertions, 100);

        let saved = fixture.sink.load().await?;
        assert_eq!(saved.daily.len(), 5);
        assert_eq!(saved.hourly.len(), 5 * 24);
        assert_eq!(saved.hourly["dev|2025-04-01|09"].commit_count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_claimed_lunch_replaces_configured_window() -> Result<()> {
        let fixture = fixture().await?;
        fixture
            .schedule
            .set_work_hours(WorkHours {
                lunch: TimeWindow::from_hm((13, 0), (14, 0)),
                ..WorkHours::default()
            })
            .await?;
        fixture
            .ledger
            .claim(
                NaiveDate::from_ymd_opt(2025, 4, 2).unwrap(),
                Utc.with_ymd_and_hms(2025, 4, 2, 12, 0, 0).unwrap(),
            )
            .await?;
        let vcs = fixture_vcs();
        let sources = ReportSources::<_, PulseStorageImpl, JsonMetricsSink> {
            schedule: &fixture.schedule,
            ledger: &fixture.ledger,
            vcs: &vcs,
            pulses: None,
            sink: None,
            segmentation: SegmentationConfig::default(),
        };

        let report = analyze_month(&sources, &request(&fixture), &Utc).await?;
        let day = &report.days[1];
        let at = |h| {
            NaiveDate::from_ymd_opt(2025, 4, 2)
                .unwrap()
                .and_hms_opt(h, 0, 0)
                .unwrap()
        };
        assert_eq!(day.lunch, Some(Period::new(at(12), at(13))));
        assert_eq!(
            day.dead_periods,
            vec![
                Period::new(at(10), at(12)),
                Period::new(at(13), at(15)),
                Period::new(at(15), at(17)),
            ]
        );
        // Other days keep the configured window.
        assert_eq!(
            report.days[0].lunch.map(|l| l.start),
            Some(
                NaiveDate::from_ymd_opt(2025, 4, 1)
                    .unwrap()
                    .and_hms_opt(13, 0, 0)
                    .unwrap()
            )
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_unreadable_ledger_degrades() -> Result<()> {
        let fixture = fixture().await?;
        tokio::fs::write(fixture.dir.path().join("lunch.json"), b"[").await?;
        let vcs = fixture_vcs();
        let sources = ReportSources::<_, PulseStorageImpl, JsonMetricsSink> {
            schedule: &fixture.schedule,
            ledger: &fixture.ledger,
            vcs: &vcs,
            pulses: None,
            sink: None,
            segmentation: SegmentationConfig::default(),
        };

        let report = analyze_month(&sources, &request(&fixture), &Utc).await?;
        assert!(matches!(
            report.degradations.as_slice(),
            [Degradation::LunchLedgerUnavailable { .. }]
        ));
        assert_eq!(report.summary.total_commits, 10);
        Ok(())
    }

    #[tokio::test]
    async fn test_unavailable_source_aborts() -> Result<()> {
        let fixture = fixture().await?;
        let vcs = FakeVcs::failing("not a git repository");
        let sources = ReportSources::<_, PulseStorageImpl, JsonMetricsSink> {
            schedule: &fixture.schedule,
            ledger: &fixture.ledger,
            vcs: &vcs,
            pulses: None,
            sink: None,
            segmentation: SegmentationConfig::default(),
        };
        let result = analyze_month(&sources, &request(&fixture), &Utc).await;
        assert!(matches!(result, Err(TrackerError::SourceUnavailable { .. })));
        Ok(())
    }
}
