use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use chrono::NaiveTime;
use clap::Subcommand;

use crate::{
    schedule::{MonthSchedule, ScheduleStore, ScheduleTemplate, TimeWindow, WorkHours},
    utils::dir::AppPaths,
};

use super::YearMonth;

#[derive(Debug, Subcommand)]
pub enum ScheduleCommand {
    #[command(about = "Print the resolved schedule of a month")]
    Show {
        #[arg(long, short, help = "Month as YYYY-MM. Defaults to the current month")]
        month: Option<YearMonth>,
    },
    #[command(about = "Apply a rotation to a month and use its hours per day")]
    Template {
        #[arg(value_enum)]
        template: ScheduleTemplate,
        #[arg(long, short, help = "Month as YYYY-MM. Defaults to the current month")]
        month: Option<YearMonth>,
    },
    #[command(about = "Set expected working hours per day, between 1 and 24")]
    Hours { hours: f64 },
    #[command(about = "Set working hours and an optional lunch window, times as HH:MM")]
    WorkHours {
        #[arg(long)]
        start: NaiveTime,
        #[arg(long)]
        end: NaiveTime,
        #[arg(long = "lunch-start", requires = "lunch_end")]
        lunch_start: Option<NaiveTime>,
        #[arg(long = "lunch-end", requires = "lunch_start")]
        lunch_end: Option<NaiveTime>,
    },
    #[command(about = "Mark single days of a month as workdays or days off")]
    Days {
        #[arg(long, short, help = "Month as YYYY-MM. Defaults to the current month")]
        month: Option<YearMonth>,
        #[arg(long, value_delimiter = ',', help = "Days that are workdays, for example 1,2,5")]
        work: Vec<u32>,
        #[arg(long, value_delimiter = ',', help = "Days that are days off")]
        off: Vec<u32>,
    },
}

pub async fn process_schedule_command(command: ScheduleCommand, paths: &AppPaths) -> Result<()> {
    let store = ScheduleStore::new(paths.schedule());
    match command {
        ScheduleCommand::Show { month } => {
            let YearMonth { year, month } = month.unwrap_or_else(YearMonth::current);
            print!("{}", render_month(&store.resolve(year, month).await?));
        }
        ScheduleCommand::Template { template, month } => {
            let YearMonth { year, month } = month.unwrap_or_else(YearMonth::current);
            store.apply_template(year, month, template).await?;
            println!("Applied {template:?} to {year}-{month:02}");
        }
        ScheduleCommand::Hours { hours } => {
            store.set_hours_per_day(hours).await?;
            println!("Expecting {hours}h per day");
        }
        ScheduleCommand::WorkHours {
            start,
            end,
            lunch_start,
            lunch_end,
        } => {
            let lunch = match (lunch_start, lunch_end) {
                (Some(start), Some(end)) => Some(TimeWindow::new(start, end)),
                (None, None) => None,
                _ => return Err(anyhow!("Lunch needs both a start and an end")),
            };
            store
                .set_work_hours(WorkHours {
                    work_start: start,
                    work_end: end,
                    lunch,
                })
                .await?;
            println!("Saved work hours");
        }
        ScheduleCommand::Days { month, work, off } => {
            let YearMonth { year, month } = month.unwrap_or_else(YearMonth::current);
            let days = work
                .into_iter()
                .map(|d| (d, true))
                .chain(off.into_iter().map(|d| (d, false)))
                .collect::<BTreeMap<_, _>>();
            store.apply_month(year, month, days).await?;
            println!("Saved {year}-{month:02}");
        }
    }
    Ok(())
}

fn render_month(schedule: &MonthSchedule) -> String {
    let mut out = format!(
        "{}-{:02}, {}h per day, {} workdays\n",
        schedule.year,
        schedule.month,
        schedule.hours_per_day,
        schedule.workday_count()
    );
    for day in schedule.days.values() {
        let window = if day.is_workday {
            let lunch = day.lunch.map_or_else(String::new, |l| {
                format!(", lunch {}-{}", l.start.format("%H:%M"), l.end.format("%H:%M"))
            });
            format!(
                "{}-{}{lunch}",
                day.work_start.format("%H:%M"),
                day.work_end.format("%H:%M")
            )
        } else {
            "off".into()
        };
        out.push_str(&format!("{} {}  {window}\n", day.date, day.date.format("%a")));
    }
    out
}

#[cfg(test)]
mod tests {
    use crate::schedule::{ScheduleConfig, ScheduleTemplate};

    use super::render_month;

    #[test]
    fn test_render_month() {
        let mut config = ScheduleConfig::default();
        config.months.insert(
            "2025-04".into(),
            ScheduleTemplate::FiveTwo.workdays(2025, 4),
        );
        let text = render_month(&config.resolve(2025, 4));
        assert!(text.starts_with("2025-04, 8h per day, 22 workdays"));
        assert!(text.contains("2025-04-05 Sat  off"));
        assert!(text.contains("2025-04-07 Mon  09:00-17:00"));
    }
}
