use anyhow::{anyhow, Result};
use chrono::{Local, NaiveDate, Utc};
use chrono_english::parse_date_string;
use clap::Subcommand;

use crate::{
    error::TrackerError,
    lunch::LunchLedger,
    utils::{
        clock::{Clock, DefaultClock},
        dir::AppPaths,
    },
};

use super::DateStyle;

#[derive(Debug, Subcommand)]
pub enum LunchCommand {
    #[command(about = "Record that lunch started. Works once per day")]
    Claim {
        #[arg(
            long,
            help = "When lunch started. Examples are \"12:30\", \"15 minutes ago\". Defaults to now"
        )]
        at: Option<String>,
        #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
        date_style: DateStyle,
    },
    #[command(about = "Show the lunch claimed for a day")]
    Status {
        #[arg(long, help = "Day to inspect as YYYY-MM-DD. Defaults to today")]
        date: Option<NaiveDate>,
    },
}

pub async fn process_lunch_command(command: LunchCommand, paths: &AppPaths) -> Result<()> {
    let ledger = LunchLedger::at(paths.lunch());
    match command {
        LunchCommand::Claim { at, date_style } => {
            let now = DefaultClock.time().with_timezone(&Local);
            let start = match at {
                Some(at) => parse_date_string(&at, now, date_style.into())
                    .map_err(|e| anyhow!("Failed to parse lunch start {at:?} {e}"))?,
                None => now,
            };
            let date = start.date_naive();
            match ledger.claim(date, start.with_timezone(&Utc)).await {
                Ok(()) => {
                    println!("Lunch claimed for {date} at {}", start.format("%H:%M"));
                    Ok(())
                }
                Err(TrackerError::AlreadyClaimed { date }) => {
                    println!("Lunch for {date} is already claimed");
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        }
        LunchCommand::Status { date } => {
            let date =
                date.unwrap_or_else(|| DefaultClock.time().with_timezone(&Local).date_naive());
            match ledger.resolve_period(date).await? {
                Some((start, end)) => println!(
                    "Lunch on {date}: {}-{}",
                    start.with_timezone(&Local).format("%H:%M"),
                    end.with_timezone(&Local).format("%H:%M")
                ),
                None => println!("No lunch claimed on {date}"),
            }
            Ok(())
        }
    }
}
