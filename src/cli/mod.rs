pub mod daemon_path;
pub mod lunch;
pub mod process;
pub mod report;
pub mod schedule;

use std::{fmt::Display, path::PathBuf, str::FromStr};

use anyhow::Result;
use chrono::{Datelike, Local};
use clap::{Parser, Subcommand, ValueEnum};
use lunch::{process_lunch_command, LunchCommand};
use process::{kill_previous_servers, restart_server};
use report::{process_report_command, process_years_command, ReportCommand, YearsCommand};
use schedule::{process_schedule_command, ScheduleCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    daemon::start_daemon,
    utils::{
        dir::{create_application_default_path, AppPaths},
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "devtempo", version, long_about = None)]
#[command(about = "Working hours, dead time and schedule compliance from commits and live activity", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts a daemon for live activity tracking")]
    Init {
        #[arg(long, help = "Directory whose file changes count as activity. Can be repeated")]
        watch: Vec<PathBuf>,
    },
    #[command(
        about = "Run a daemon directly in current console. Used for creating a daemon internally and for debugging"
    )]
    Serve {
        #[arg(long, help = "Directory whose file changes count as activity. Can be repeated")]
        watch: Vec<PathBuf>,
    },
    #[command(about = "Stop currently running daemon.")]
    Stop {},
    #[command(about = "Analyze a month of activity")]
    Report {
        #[command(flatten)]
        command: ReportCommand,
    },
    #[command(about = "List years that have commits")]
    Years {
        #[command(flatten)]
        command: YearsCommand,
    },
    #[command(about = "Claim or inspect today's lunch break")]
    Lunch {
        #[command(subcommand)]
        command: LunchCommand,
    },
    #[command(about = "Show or change the work schedule")]
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommand,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let paths = AppPaths::new(args.dir.map_or_else(create_application_default_path, Ok)?);

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &paths.logs(), logging_level, args.log)?;

    match args.commands {
        Commands::Init { watch } => restart_server(paths.root(), &watch),
        Commands::Stop {} => {
            kill_previous_servers(&std::env::current_exe()?)?;
            Ok(())
        }
        Commands::Serve { watch } => start_daemon(paths.root().clone(), watch).await,
        Commands::Report { command } => process_report_command(command, &paths).await,
        Commands::Years { command } => process_years_command(command).await,
        Commands::Lunch { command } => process_lunch_command(command, &paths).await,
        Commands::Schedule { command } => process_schedule_command(command, &paths).await,
    }
}

/// A calendar month written as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn current() -> Self {
        let today = Local::now().date_naive();
        Self {
            year: today.year(),
            month: today.month(),
        }
    }
}

impl FromStr for YearMonth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("expected YYYY-MM, got {s:?}");
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        let year = year.parse().map_err(|_| invalid())?;
        let month = month.parse().map_err(|_| invalid())?;
        if !(1..=12).contains(&month) {
            return Err(invalid());
        }
        Ok(Self { year, month })
    }
}

impl Display for YearMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::{Args, YearMonth};

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_year_month() {
        assert_eq!(
            "2025-04".parse::<YearMonth>(),
            Ok(YearMonth {
                year: 2025,
                month: 4
            })
        );
        assert!("2025-13".parse::<YearMonth>().is_err());
        assert!("april".parse::<YearMonth>().is_err());
        assert_eq!(YearMonth { year: 2025, month: 4 }.to_string(), "2025-04");
    }
}
