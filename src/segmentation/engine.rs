use chrono::{Duration, NaiveDateTime, Timelike};
use tracing::{instrument, trace};

use crate::{collector::event::ActivityKind, error::TrackerError, schedule::DaySchedule};

use super::{is_night_hour, DaySegmentation, LocalEvent, Period, SegmentationConfig};

/// Segments a single day. Events from other dates are ignored. Fails only when the day's
/// schedule is malformed, so the caller can flag the day and carry on with the rest.
#[instrument(skip(schedule, events, config), fields(date = %schedule.date, events = events.len()))]
pub fn segment_day(
    schedule: &DaySchedule,
    events: &[LocalEvent],
    config: &SegmentationConfig,
) -> Result<DaySegmentation, TrackerError> {
    schedule.validate()?;

    let mut day_events = events
        .iter()
        .filter(|e| e.at.date() == schedule.date)
        .copied()
        .collect::<Vec<_>>();
    // Stable, so identical timestamps keep their input order.
    day_events.sort_by_key(|e| e.at);

    let instants = day_events.iter().map(|e| e.at).collect::<Vec<_>>();
    let commit_count = day_events
        .iter()
        .filter(|e| e.kind == ActivityKind::Commit)
        .count();

    let mut hourly_activity = [0u32; 24];
    let mut night_event_count = 0;
    for instant in &instants {
        hourly_activity[instant.hour() as usize] += 1;
        if is_night_hour(instant.hour()) {
            night_event_count += 1;
        }
    }

    let (work_start, work_end) = schedule.work_window();
    let schedule_window = Period::new(work_start, work_end);
    let lunch = schedule
        .lunch
        .map(|l| {
            let (start, end) = l.on(schedule.date);
            Period::new(start, end)
        })
        .and_then(|l| l.clamp_to(&schedule_window));

    let (work_period, total_active_hours) = match (instants.first(), instants.last()) {
        (Some(first), Some(last)) => {
            let period = Period::new(*first, *last);
            (Some(period), period.hours())
        }
        _ => (None, 0.),
    };

    let dead_periods = if schedule.is_workday && !instants.is_empty() {
        find_dead_periods(schedule_window, lunch, &instants, config.dead_threshold())
    } else {
        vec![]
    };
    trace!("Dead periods {dead_periods:?}");

    Ok(DaySegmentation {
        date: schedule.date,
        is_workday: schedule.is_workday,
        instants,
        work_period,
        total_active_hours,
        dead_periods,
        commit_count,
        night_event_count,
        hourly_activity,
        schedule_window,
        lunch,
    })
}

/// Walks the working window with a cursor. Whenever the next instant is at least `threshold`
/// away, the cursor moves by at most `threshold` and the skipped span is dead. Lunch is stepped
/// over and cuts any dead candidate that would reach into it.
///
/// Once no instant is left before the end of the window, everything from the cursor to the end
/// is dead, split around lunch.
fn find_dead_periods(
    work: Period,
    lunch: Option<Period>,
    instants: &[NaiveDateTime],
    threshold: Duration,
) -> Vec<Period> {
    let mut dead = vec![];

    let mut remaining = instants.iter().copied().peekable();
    let mut cursor = work.start;

    while cursor < work.end {
        if let Some(lunch) = lunch.filter(|l| l.contains(cursor)) {
            cursor = lunch.end;
            continue;
        }

        while remaining.next_if(|i| *i < cursor).is_some() {}

        let Some(next) = remaining.peek().copied().filter(|i| *i < work.end) else {
            push_around_lunch(&mut dead, Period::new(cursor, work.end), lunch);
            break;
        };

        if next - cursor < threshold {
            remaining.next();
            cursor = next;
            continue;
        }

        let candidate_end = (cursor + threshold).min(next).min(work.end);
        match lunch.filter(|l| candidate_end > l.start && cursor < l.end) {
            Some(lunch) => {
                if cursor < lunch.start {
                    dead.push(Period::new(cursor, lunch.start));
                }
                cursor = lunch.end;
            }
            None => {
                dead.push(Period::new(cursor, candidate_end));
                cursor = candidate_end;
            }
        }
    }

    dead
}

fn push_around_lunch(dead: &mut Vec<Period>, span: Period, lunch: Option<Period>) {
    match lunch.filter(|l| l.overlaps(&span)) {
        Some(lunch) => {
            for part in [
                Period::new(span.start, lunch.start),
                Period::new(lunch.end, span.end),
            ] {
                if !part.is_empty() {
                    dead.push(part);
                }
            }
        }
        None if !span.is_empty() => dead.push(span),
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

    use crate::{
        collector::event::ActivityKind,
        error::TrackerError,
        schedule::{DaySchedule, TimeWindow, WorkHours},
        segmentation::{DaySegmentation, LocalEvent, Period, SegmentationConfig},
    };

    use super::segment_day;

    const DATE: NaiveDate = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();

    fn at(h: u32, m: u32) -> NaiveDateTime {
        DATE.and_time(NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }

    fn commits(times: &[(u32, u32)]) -> Vec<LocalEvent> {
        times
            .iter()
            .map(|(h, m)| LocalEvent::new(at(*h, *m), ActivityKind::Commit))
            .collect()
    }

    fn schedule(lunch: Option<((u32, u32), (u32, u32))>) -> DaySchedule {
        let hours = WorkHours {
            lunch: lunch.and_then(|(s, e)| TimeWindow::from_hm(s, e)),
            ..WorkHours::default()
        };
        DaySchedule::new(DATE, true, &hours, 8.)
    }

    fn segment(schedule: &DaySchedule, events: &[LocalEvent]) -> DaySegmentation {
        segment_day(schedule, events, &SegmentationConfig::default()).unwrap()
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    fn assert_invariants(seg: &DaySegmentation) {
        let mut sorted = seg.dead_periods.clone();
        sorted.sort();
        for pair in sorted.windows(2) {
            assert!(pair[0].end <= pair[1].start, "overlap {pair:?}");
        }
        for period in &seg.dead_periods {
            assert!(!period.is_empty());
            assert!(period.start >= seg.schedule_window.start);
            assert!(period.end <= seg.schedule_window.end);
            if let Some(lunch) = seg.lunch {
                assert!(!period.overlaps(&lunch), "{period:?} overlaps lunch");
            }
        }
        if seg.is_workday && !seg.instants.is_empty() {
            assert_close(seg.net_work_hours(), seg.dead_hours() + seg.active_sub_hours());
        }
    }

    #[test]
    fn test_empty_day() {
        let seg = segment(&schedule(Some(((13, 0), (14, 0)))), &[]);
        assert_eq!(seg.work_period, None);
        assert!(seg.dead_periods.is_empty());
        assert_eq!(seg.total_active_hours, 0.);
        assert_eq!(*seg.dead_time_percent(), 0.);
    }

    #[test]
    fn test_work_period_and_active_hours() {
        let seg = segment(&schedule(None), &commits(&[(10, 30), (9, 15), (12, 45)]));
        assert_eq!(seg.work_period, Some(Period::new(at(9, 15), at(12, 45))));
        assert_close(seg.total_active_hours, 3.5);
        assert_eq!(seg.instants, vec![at(9, 15), at(10, 30), at(12, 45)]);
        assert_eq!(seg.commit_count, 3);
        assert_eq!(seg.hourly_activity[9], 1);
        assert_eq!(seg.hourly_activity[12], 1);
    }

    #[test]
    fn test_exact_threshold_gap_is_dead() {
        let seg = segment(&schedule(None), &commits(&[(9, 0), (11, 0)]));
        assert_eq!(
            seg.dead_periods,
            vec![
                Period::new(at(9, 0), at(11, 0)),
                Period::new(at(11, 0), at(17, 0)),
            ]
        );
        assert_invariants(&seg);
    }

    #[test]
    fn test_gap_below_threshold_is_not_dead() {
        let seg = segment(&schedule(None), &commits(&[(9, 0), (10, 59)]));
        // Only the rest of the day after the last event.
        assert_eq!(seg.dead_periods, vec![Period::new(at(10, 59), at(17, 0))]);
        assert_invariants(&seg);
    }

    #[test]
    fn test_rest_of_day_after_last_event_is_dead() {
        let seg = segment(&schedule(None), &commits(&[(9, 0), (10, 0)]));
        assert_eq!(seg.dead_periods, vec![Period::new(at(10, 0), at(17, 0))]);
        assert_close(*seg.dead_time_percent(), 7. / 8. * 100.);
        assert_invariants(&seg);

        let seg = segment(&schedule(Some(((13, 0), (14, 0)))), &commits(&[(9, 0), (11, 0)]));
        assert_eq!(
            seg.dead_periods,
            vec![
                Period::new(at(9, 0), at(11, 0)),
                Period::new(at(11, 0), at(13, 0)),
                Period::new(at(14, 0), at(17, 0)),
            ]
        );
        assert_close(*seg.dead_time_percent(), 100.);
        assert_invariants(&seg);
    }

    #[test]
    fn test_lunch_is_never_dead() {
        let seg = segment(&schedule(Some(((13, 0), (14, 0)))), &commits(&[(9, 0), (16, 0)]));
        assert_eq!(
            seg.dead_periods,
            vec![
                Period::new(at(9, 0), at(11, 0)),
                Period::new(at(11, 0), at(13, 0)),
                Period::new(at(14, 0), at(16, 0)),
                Period::new(at(16, 0), at(17, 0)),
            ]
        );
        assert!(seg
            .dead_periods
            .iter()
            .all(|p| !p.overlaps(&Period::new(at(13, 0), at(14, 0)))));
        assert_close(*seg.dead_time_percent(), 100.);
        assert_invariants(&seg);
    }

    #[test]
    fn test_candidate_reaching_into_lunch_is_cut() {
        let seg = segment(
            &schedule(Some(((13, 0), (14, 0)))),
            &commits(&[(9, 0), (10, 0), (11, 30), (15, 0)]),
        );
        // 11:30 + 2h reaches 13:30, so the dead span stops at lunch and resumes after it.
        assert_eq!(
            seg.dead_periods,
            vec![
                Period::new(at(11, 30), at(13, 0)),
                Period::new(at(15, 0), at(17, 0)),
            ]
        );
        assert_invariants(&seg);
    }

    #[test]
    fn test_events_only_outside_working_hours() {
        let seg = segment(&schedule(Some(((13, 0), (14, 0)))), &commits(&[(7, 0), (19, 30)]));
        assert_eq!(
            seg.dead_periods,
            vec![
                Period::new(at(9, 0), at(13, 0)),
                Period::new(at(14, 0), at(17, 0))
            ]
        );
        assert_close(*seg.dead_time_percent(), 100.);
        assert_invariants(&seg);
    }

    #[test]
    fn test_lunch_contains_all_events() {
        let seg = segment(
            &schedule(Some(((12, 0), (14, 0)))),
            &commits(&[(12, 10), (13, 50)]),
        );
        // 11:00 to 12:10 is under the threshold, nothing happens after lunch.
        assert_eq!(
            seg.dead_periods,
            vec![
                Period::new(at(9, 0), at(11, 0)),
                Period::new(at(14, 0), at(17, 0)),
            ]
        );
        assert_invariants(&seg);
    }

    #[test]
    fn test_lunch_past_work_end_is_clipped() {
        let seg = segment(
            &schedule(Some(((16, 30), (18, 0)))),
            &commits(&[(9, 0), (10, 0), (16, 45)]),
        );
        assert_eq!(seg.lunch, Some(Period::new(at(16, 30), at(17, 0))));
        assert_eq!(
            seg.dead_periods,
            vec![
                Period::new(at(10, 0), at(12, 0)),
                Period::new(at(12, 0), at(14, 0)),
                Period::new(at(14, 0), at(16, 0)),
            ]
        );
        assert!(seg.dead_periods.iter().all(|p| p.duration() > Duration::zero()));
        assert_close(seg.net_work_hours(), 7.5);
        assert_invariants(&seg);
    }

    #[test]
    fn test_non_workday_has_no_dead_time() {
        let mut day = schedule(None);
        day.is_workday = false;
        let seg = segment(&day, &commits(&[(9, 0), (16, 0)]));
        assert!(seg.dead_periods.is_empty());
        assert_eq!(seg.dead_time_percent().to_string(), "0.00%");
        assert_close(seg.total_active_hours, 7.);
    }

    #[test]
    fn test_night_events_are_counted() {
        let seg = segment(&schedule(None), &commits(&[(0, 10), (5, 59), (6, 0), (23, 0)]));
        assert_eq!(seg.night_event_count, 3);
    }

    #[test]
    fn test_invalid_schedule_is_reported() {
        let mut day = schedule(None);
        day.work_end = day.work_start;
        assert!(matches!(
            segment_day(&day, &commits(&[(9, 0)]), &SegmentationConfig::default()),
            Err(TrackerError::InvalidSchedule { date: Some(d), .. }) if d == DATE
        ));
    }

    #[test]
    fn test_custom_threshold() {
        let config = SegmentationConfig::with_dead_threshold(Duration::minutes(30)).unwrap();
        let seg = segment_day(&schedule(None), &commits(&[(9, 0), (9, 45)]), &config).unwrap();
        assert_eq!(
            seg.dead_periods,
            vec![
                Period::new(at(9, 0), at(9, 30)),
                Period::new(at(9, 45), at(17, 0)),
            ]
        );
        assert!(SegmentationConfig::with_dead_threshold(Duration::zero()).is_none());
    }

    #[test]
    fn test_segmentation_properties_hold_for_generated_days() {
        // Small deterministic generator, enough to walk many lunch/threshold combinations.
        let mut state = 0x2545_f491_4f6c_dd1du64;
        let mut next = move |bound: u64| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state % bound
        };

        for _ in 0..300 {
            let lunch_start = 10 + next(6) as u32;
            let lunch = if next(4) == 0 {
                None
            } else {
                Some(((lunch_start, 0), (lunch_start + 1, next(2) as u32 * 30)))
            };
            let day = schedule(lunch);
            let events = (0..next(8))
                .map(|_| {
                    LocalEvent::new(
                        at(next(24) as u32, next(60) as u32),
                        ActivityKind::FileSystem,
                    )
                })
                .collect::<Vec<_>>();

            let first = segment(&day, &events);
            let second = segment(&day, &events);
            assert_eq!(first, second);
            assert_invariants(&first);
        }
    }
}
