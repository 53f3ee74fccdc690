use std::future;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use futures::{stream, Stream, StreamExt};
use now::DateTimeNow;
use tracing::{debug, error, instrument};

use crate::{
    error::TrackerError,
    storage::pulse_storage::PulseStorage,
    utils::time::first_of_month,
};

use super::{
    event::ActivityEvent,
    vcs::{total_changes, CommitQuery, FileChangeStats, VcsSource},
};

/// The `[start, end)` range of instants a computation keeps. Everything else is purged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionWindow {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl RetentionWindow {
    /// Live tracking keeps the current local day only.
    pub fn today<Tz: TimeZone>(now: DateTime<Utc>, tz: &Tz) -> Self {
        Self {
            start: now.with_timezone(tz).beginning_of_day().to_utc(),
            end: None,
        }
    }

    /// Historical analysis keeps the requested local month.
    pub fn month<Tz: TimeZone>(year: i32, month: u32, tz: &Tz) -> Option<Self> {
        let first = first_of_month(year, month)?;
        let next = first.checked_add_months(chrono::Months::new(1))?;
        let local_start = |date: NaiveDate| {
            tz.from_local_datetime(&date.and_time(chrono::NaiveTime::MIN))
                .earliest()
                .map(|v| v.to_utc())
        };
        Some(Self {
            start: local_start(first)?,
            end: Some(local_start(next)?),
        })
    }

    pub fn contains(&self, moment: DateTime<Utc>) -> bool {
        moment >= self.start && self.end.map_or(true, |end| moment < end)
    }
}

/// Merges batches of instants into one ascending sequence limited to `window`. Sorting is stable,
/// identical timestamps stay in input order.
pub fn collect(
    batches: impl IntoIterator<Item = Vec<ActivityEvent>>,
    window: &RetentionWindow,
) -> Vec<ActivityEvent> {
    let mut events = batches
        .into_iter()
        .flatten()
        .filter(|e| window.contains(e.moment))
        .collect::<Vec<_>>();
    events.sort_by_key(|e| e.moment);
    events
}

/// Merged instants of a historical request plus the code churn of the commits read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectedHistory {
    pub events: Vec<ActivityEvent>,
    pub changes: FileChangeStats,
}

/// Where the instants of a historical request come from.
pub struct HistorySources<'a, V, P> {
    pub vcs: Option<(&'a V, CommitQuery)>,
    pub pulses: Option<&'a P>,
}

/// Reads every configured source and merges them. Any unreadable source fails the whole request,
/// an empty result always means "no activity".
#[instrument(skip(sources))]
pub async fn collect_history<V: VcsSource, P: PulseStorage>(
    sources: HistorySources<'_, V, P>,
    window: RetentionWindow,
) -> Result<CollectedHistory, TrackerError> {
    let mut batches = vec![];
    let mut changes = FileChangeStats::default();

    if let Some((vcs, query)) = sources.vcs {
        let commits = vcs.commits(&query).await?;
        debug!("Read {} commits", commits.len());
        changes = total_changes(&commits);
        batches.push(
            commits
                .into_iter()
                .map(|c| ActivityEvent::commit(c.moment, c.author_email))
                .collect(),
        );
    }

    if let Some(pulses) = sources.pulses {
        let end = window.end.unwrap_or_else(Utc::now);
        let stored = read_pulses(pulses, window.start, end)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;
        debug!("Read {} recorded pulses", stored.len());
        batches.push(stored);
    }

    Ok(CollectedHistory {
        events: collect(batches, &window),
        changes,
    })
}

/// Streams pulses of every UTC day touching `[start, end]`.
fn read_pulses<'a, P: PulseStorage>(
    storage: &'a P,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> impl Stream<Item = Result<ActivityEvent, TrackerError>> + 'a {
    date_range(start.date_naive(), end.date_naive())
        .map(move |day| async move { (day, storage.get_data_for(day).await) })
        .buffered(4)
        .flat_map(|(day, data)| match data {
            Ok(data) => stream::iter(data).map(Ok).boxed(),
            Err(e) => {
                error!("Failed to read pulses of {day} {e:?}");
                stream::once(future::ready(Err(TrackerError::source_unavailable(
                    format!("activity records of {day}"),
                    e,
                ))))
                .boxed()
            }
        })
}

/// Returns a stream of dates between start (inclusive) and end (inclusive).
fn date_range(start: NaiveDate, end: NaiveDate) -> impl Stream<Item = NaiveDate> {
    stream::unfold(Some(start), move |current| {
        future::ready(match current {
            Some(day) if day <= end => Some((day, day.succ_opt())),
            _ => None,
        })
    })
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{Duration, FixedOffset, NaiveDate, TimeZone, Utc};
    use tempfile::tempdir;

    use crate::{
        collector::{
            event::{ActivityEvent, ActivityKind},
            vcs::{tests::FakeVcs, CommitQuery, CommitRecord, FileChangeStats},
        },
        error::TrackerError,
        storage::pulse_storage::{PulseFileHandle, PulseStorage, PulseStorageImpl},
    };

    use super::{collect, collect_history, HistorySources, RetentionWindow};

    #[test]
    fn test_month_window_follows_timezone() {
        let tz = FixedOffset::east_opt(3 * 3600).unwrap();
        let window = RetentionWindow::month(2025, 3, &tz).unwrap();
        assert_eq!(window.start, Utc.with_ymd_and_hms(2025, 2, 28, 21, 0, 0).unwrap());
        assert_eq!(window.end, Some(Utc.with_ymd_and_hms(2025, 3, 31, 21, 0, 0).unwrap()));
        assert!(RetentionWindow::month(2025, 0, &tz).is_none());
    }

    #[test]
    fn test_today_window_drops_yesterday() {
        let now = Utc.with_ymd_and_hms(2025, 3, 4, 15, 0, 0).unwrap();
        let window = RetentionWindow::today(now, &Utc);
        let events = collect(
            [
                vec![ActivityEvent::new(now - Duration::hours(16), ActivityKind::Keyboard)],
                vec![
                    ActivityEvent::new(now, ActivityKind::Pointer),
                    ActivityEvent::new(now - Duration::hours(1), ActivityKind::FileSystem),
                ],
            ],
            &window,
        );
        assert_eq!(
            events.iter().map(|e| e.kind).collect::<Vec<_>>(),
            vec![ActivityKind::FileSystem, ActivityKind::Pointer]
        );
    }

    #[test]
    fn test_collect_is_stable_for_identical_timestamps() {
        let now = Utc.with_ymd_and_hms(2025, 3, 4, 15, 0, 0).unwrap();
        let window = RetentionWindow::today(now, &Utc);
        let events = collect(
            [
                vec![ActivityEvent::commit(now, "dev@example.com")],
                vec![ActivityEvent::new(now, ActivityKind::FileSystem)],
            ],
            &window,
        );
        assert_eq!(events[0].kind, ActivityKind::Commit);
        assert_eq!(events[1].kind, ActivityKind::FileSystem);
    }

    #[tokio::test]
    async fn test_history_merges_commits_and_pulses() -> Result<()> {
        let dir = tempdir()?;
        let storage = PulseStorageImpl::new(dir.path().to_owned())?;
        let day = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        let pulse_moment = Utc.with_ymd_and_hms(2025, 3, 4, 10, 0, 0).unwrap();
        let mut file = storage.create_or_append_record(day).await?;
        file.append(vec![ActivityEvent::new(pulse_moment, ActivityKind::Keyboard)])
            .await?;

        let vcs = FakeVcs::with_commits(vec![
            CommitRecord {
                moment: Utc.with_ymd_and_hms(2025, 3, 4, 9, 0, 0).unwrap(),
                author_email: "dev@example.com".into(),
                stats: FileChangeStats::default(),
            },
            CommitRecord {
                moment: Utc.with_ymd_and_hms(2025, 4, 1, 9, 0, 0).unwrap(),
                author_email: "dev@example.com".into(),
                stats: FileChangeStats::default(),
            },
        ]);

        let history = collect_history(
            HistorySources {
                vcs: Some((&vcs, CommitQuery::new(dir.path()))),
                pulses: Some(&storage),
            },
            RetentionWindow::month(2025, 3, &Utc).unwrap(),
        )
        .await?;
        let events = history.events;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, ActivityKind::Commit);
        assert_eq!(events[1].moment, pulse_moment);
        Ok(())
    }

    #[tokio::test]
    async fn test_unavailable_source_is_not_empty() {
        let vcs = FakeVcs::failing("repository is gone");
        let result = collect_history::<_, PulseStorageImpl>(
            HistorySources {
                vcs: Some((&vcs, CommitQuery::new("/nowhere"))),
                pulses: None,
            },
            RetentionWindow::month(2025, 3, &Utc).unwrap(),
        )
        .await;
        assert!(matches!(
            result,
            Err(TrackerError::SourceUnavailable { .. })
        ));
    }
}
