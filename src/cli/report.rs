use std::{fmt::Write, path::PathBuf};

use ansi_term::{Colour, Style};
use anyhow::{anyhow, bail, Result};
use chrono::Local;
use clap::Parser;
use tracing::error;

use crate::{
    aggregate::{HeatMap, HeatMapRows, MonthlySummary},
    collector::vcs::{available_years, GitCli},
    lunch::LunchLedger,
    persistence::JsonMetricsSink,
    report::{analyze_month, Degradation, MonthlyReport, ReportRequest, ReportSources},
    schedule::ScheduleStore,
    segmentation::SegmentationConfig,
    storage::pulse_storage::PulseStorageImpl,
    utils::{dir::AppPaths, time::format_hours},
};

use super::YearMonth;

#[derive(Debug, Parser)]
pub struct ReportCommand {
    #[arg(long, help = "Git repository to read commits from")]
    repo: Option<PathBuf>,
    #[arg(
        long,
        short,
        help = "Month to analyze, for example 2025-04. Defaults to the current month"
    )]
    month: Option<YearMonth>,
    #[arg(long, short, help = "Only count commits of this author")]
    author: Option<String>,
    #[arg(long = "max-count", help = "Read at most this many of the newest commits")]
    max_count: Option<usize>,
    #[arg(long = "user-id", help = "Save daily and hourly metrics under this user")]
    user_id: Option<String>,
    #[arg(long, value_enum, default_value_t = HeatMapRows::Days, help = "Rows of the heat map")]
    rows: HeatMapRows,
    #[arg(long = "no-pulses", help = "Ignore activity recorded by the daemon")]
    no_pulses: bool,
    #[arg(
        long = "dead-threshold",
        default_value_t = 120,
        help = "Minutes of silence inside working hours that count as dead time"
    )]
    dead_threshold: u32,
    #[arg(long, help = "Print the summary as JSON")]
    json: bool,
}

#[derive(Debug, Parser)]
pub struct YearsCommand {
    #[arg(long, help = "Git repository to read commits from")]
    repo: PathBuf,
}

/// Command to process `report` command. Report analyzes one month of commits and recorded
/// pulses against the configured schedule.
pub async fn process_report_command(command: ReportCommand, paths: &AppPaths) -> Result<()> {
    if command.repo.is_none() && command.no_pulses {
        bail!("Nothing to analyze, pass --repo or drop --no-pulses");
    }
    let YearMonth { year, month } = command.month.unwrap_or_else(YearMonth::current);
    let segmentation = SegmentationConfig::with_dead_threshold(chrono::Duration::minutes(
        command.dead_threshold.into(),
    ))
    .ok_or_else(|| anyhow!("Dead time threshold must be positive"))?;

    let schedule = ScheduleStore::new(paths.schedule());
    let ledger = LunchLedger::at(paths.lunch());
    let vcs = GitCli::default();
    let pulses = if command.no_pulses {
        None
    } else {
        Some(PulseStorageImpl::new(paths.records())?)
    };
    let sink = command
        .user_id
        .as_ref()
        .map(|_| JsonMetricsSink::new(paths.metrics()));

    let sources = ReportSources {
        schedule: &schedule,
        ledger: &ledger,
        vcs: &vcs,
        pulses: pulses.as_ref(),
        sink: sink.as_ref(),
        segmentation,
    };
    let request = ReportRequest {
        year,
        month,
        repo: command.repo,
        author: command.author,
        max_count: command.max_count,
        user_id: command.user_id,
        heatmap_rows: command.rows,
    };

    let report = analyze_month(&sources, &request, &Local)
        .await
        .inspect_err(|e| error!("Failed to analyze {year}-{month:02} {e}"))?;

    if command.json {
        println!("{}", serde_json::to_string_pretty(&report.summary)?);
    } else {
        #[cfg(windows)]
        let _ = ansi_term::enable_ansi_support();
        print!("{}", render_report(&report));
    }
    Ok(())
}

pub async fn process_years_command(command: YearsCommand) -> Result<()> {
    let years = available_years(&GitCli::default(), &command.repo, &Local).await?;
    for year in years {
        println!("{year}");
    }
    Ok(())
}

fn render_report(report: &MonthlyReport) -> String {
    let summary = &report.summary;
    let mut out = String::new();
    let heading = Style::new().bold();
    let _ = writeln!(
        out,
        "{}",
        heading.paint(format!(
            "Activity for {}-{:02}",
            summary.year, summary.month
        ))
    );

    for (label, value) in summary_lines(summary) {
        let _ = writeln!(out, "{label:<20}{value}");
    }
    let changes = &report.changes;
    if changes.files_changed > 0 {
        let _ = writeln!(
            out,
            "{:<20}{} files, +{} -{}",
            "Churn", changes.files_changed, changes.insertions, changes.deletions
        );
    }

    for flag in &report.flags {
        let _ = writeln!(
            out,
            "{}",
            Colour::Yellow.paint(format!("Skipped {}: {}", flag.date, flag.reason))
        );
    }
    for degradation in &report.degradations {
        let message = match degradation {
            Degradation::LunchLedgerUnavailable { reason } => {
                format!("Lunch claims ignored: {reason}")
            }
            Degradation::MetricsNotSaved { reason } => format!("Metrics not saved: {reason}"),
        };
        let _ = writeln!(out, "{}", Colour::Yellow.paint(message));
    }

    let _ = writeln!(out);
    out.push_str(&render_heatmap(&summary.heatmap));
    out
}

fn summary_lines(summary: &MonthlySummary) -> Vec<(&'static str, String)> {
    vec![
        ("Total hours", format_hours(summary.total_hours)),
        ("Workday hours", format_hours(summary.workday_hours)),
        ("Overtime", format_hours(summary.overtime_hours)),
        ("Productive hours", format_hours(summary.productive_hours)),
        (
            "Active days",
            format!("{} of {} workdays", summary.active_days, summary.workday_count),
        ),
        (
            "Events",
            format!("{} ({} commits)", summary.total_events, summary.total_commits),
        ),
        ("Commits per hour", format!("{:.2}", summary.commits_per_hour)),
        (
            "Peak window",
            summary.peak_window.map_or_else(
                || "-".to_string(),
                |p| format!("{:02}:00-{:02}:00 ({} events)", p.start_hour, p.end_hour, p.events),
            ),
        ),
        ("Night ratio", summary.night_ratio.to_string()),
        (
            "Average interval",
            format!("{:.1} min", summary.average_interval_minutes),
        ),
        ("Dead time", summary.dead_time_percent.to_string()),
        ("Compliance", summary.schedule_compliance.to_string()),
    ]
}

fn render_heatmap(map: &HeatMap) -> String {
    let mut out = String::new();
    let columns = map.cells().first().map_or(0, Vec::len);
    let _ = write!(out, "{:>4}", "");
    for column in 0..columns {
        let _ = write!(out, "{:>4}", map.column_label(column));
    }
    let _ = writeln!(out);

    let max = map.max();
    for (row, cells) in map.cells().iter().enumerate() {
        let _ = write!(out, "{:>4}", map.row_label(row));
        for count in cells {
            let _ = write!(out, "{}", shade(*count, max).paint(format!("{count:>4}")));
        }
        let _ = writeln!(out);
    }
    out
}

fn shade(count: u32, max: u32) -> Style {
    if count == 0 || max == 0 {
        return Style::new().dimmed();
    }
    match count * 3 / max {
        0 => Colour::Green.normal(),
        1 => Colour::Yellow.normal(),
        _ => Colour::Red.bold(),
    }
}
