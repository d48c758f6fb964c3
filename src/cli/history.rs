use std::{fmt::Display, path::PathBuf};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Days, Local, NaiveDate};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};

use crate::{
    daemon::{
        args::TrackerArgs,
        context::AppContext,
        resolve_gist_id,
        storage::{
            entities::DailySnapshot,
            gist::GistClient,
            remote_storage::RemoteSnapshotStore,
            snapshot_storage::{SnapshotStorage, SnapshotStorageImpl},
        },
    },
    utils::clock::{Clock, DefaultClock},
};

use super::{report::print_history, Args};

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

#[derive(Debug, Parser)]
pub struct HistoryCommand {
    #[arg(
        long = "start",
        short,
        help = "First day of the range. Examples are \"yesterday\", \"last monday\", \"15/03/2025\""
    )]
    start_date: Option<String>,
    #[arg(
        long = "end",
        short,
        help = "Last day of the range. Examples are \"yesterday\", \"last friday\", \"15/03/2025\""
    )]
    end_date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(long, help = "Read the remote backup instead of local snapshots")]
    remote: bool,
    #[command(flatten)]
    tracker: TrackerArgs,
}

impl HistoryCommand {
    pub fn dir(&self) -> Option<&PathBuf> {
        self.tracker.dir.as_ref()
    }
}

const DEFAULT_HISTORY_DAYS: u64 = 6;

/// Command to process `history`. Prints one line per stored day between `start_date` and
/// `end_date`, both inclusive.
pub async fn process_history_command(command: HistoryCommand) -> Result<()> {
    let (start, end) = parse_range(
        command.start_date.as_deref(),
        command.end_date.as_deref(),
        command.date_style,
        Local::now(),
    )?;

    let context = AppContext::from_args(command.tracker).await?;
    let local = SnapshotStorageImpl::new(context.snapshot_dir(), Box::new(DefaultClock))?;

    let snapshots = if command.remote {
        load_remote_range(&context, &local, start, end).await?
    } else {
        local.load_range(start, end).await?
    };
    print_history(&snapshots);
    Ok(())
}

async fn load_remote_range(
    context: &AppContext,
    local: &SnapshotStorageImpl,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<DailySnapshot>> {
    let gist_id = resolve_gist_id(context, local)
        .await
        .ok_or_else(|| anyhow!("No gist known yet, pass --gist-id or run a backup first"))?;
    let client = GistClient::new(
        context.github_token.clone(),
        Some(gist_id),
        context.config.gist_file_name.clone(),
        context.config.remote_timeout(),
    )?;
    let document = RemoteSnapshotStore::new(client, Box::new(DefaultClock))
        .load_document()
        .await?;
    Ok(document
        .days
        .into_values()
        .filter(|v| (start..=end).contains(&v.date))
        .collect())
}

fn parse_day(
    value: Option<&str>,
    name: &str,
    dialect: chrono_english::Dialect,
    now: DateTime<Local>,
) -> Result<Option<NaiveDate>> {
    match value.map(|s| parse_date_string(s, now, dialect)) {
        Some(Ok(v)) => Ok(Some(v.date_naive())),
        Some(Err(e)) => Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                format!("Failed to validate {name} date {e}"),
            )
            .into()),
        None => Ok(None),
    }
}

/// Resolves the day range, by default the last week including today.
fn parse_range(
    start_date: Option<&str>,
    end_date: Option<&str>,
    date_style: DateStyle,
    now: DateTime<Local>,
) -> Result<(NaiveDate, NaiveDate)> {
    let dialect: chrono_english::Dialect = date_style.into();
    let today = DefaultClock.today();
    let end = parse_day(end_date, "end", dialect, now)?.unwrap_or(today);
    let start = parse_day(start_date, "start", dialect, now)?.unwrap_or_else(|| {
        end.checked_sub_days(Days::new(DEFAULT_HISTORY_DAYS))
            .unwrap_or(NaiveDate::MIN)
    });
    if start > end {
        return Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                format!("Start {start} is after end {end}"),
            )
            .into());
    }
    Ok((start, end))
}
