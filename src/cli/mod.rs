pub mod daemon_path;
pub mod history;
pub mod process;
pub mod report;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use history::{process_history_command, HistoryCommand};
use process::{restart_server, stop_server};
use report::print_day;
use tracing::level_filters::LevelFilter;

use crate::{
    daemon::{
        args::TrackerArgs,
        context::{AppContext, LOG_DIR},
        start_daemon,
        storage::{
            entities::UsageCache,
            snapshot_storage::{SnapshotStorage, SnapshotStorageImpl},
        },
    },
    utils::{
        clock::{Clock, DefaultClock},
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX, DAEMON_PREFIX},
        percentage::Percentage,
        time::clock_time,
    },
};

#[derive(Parser, Debug)]
#[command(name = "usage-tracker", version, long_about = None)]
#[command(about = "Tracks how long each application holds the focus", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts a daemon for the application")]
    Init {
        #[command(flatten)]
        tracker: TrackerArgs,
    },
    #[command(
        about = "Run the tracker directly in current console. Used for debugging and for running under a service manager"
    )]
    Serve {
        #[command(flatten)]
        tracker: TrackerArgs,
    },
    #[command(about = "Stop currently running daemon.")]
    Stop {},
    #[command(about = "Display usage of today")]
    Today {
        #[arg(short = 'p', long = "percentage", help = "Filter apps to have at least specified percentage", default_value = "1%")]
        min_percentage: Percentage,
        #[command(flatten)]
        tracker: TrackerArgs,
    },
    #[command(about = "Display usage per day")]
    History {
        #[command(flatten)]
        command: HistoryCommand,
    },
    #[command(about = "Delete local snapshots older than the retention window")]
    Cleanup {
        #[arg(long, help = "Days to keep. By default the configured retention")]
        days: Option<u32>,
        #[command(flatten)]
        tracker: TrackerArgs,
    },
}

impl Commands {
    fn dir(&self) -> Option<&PathBuf> {
        match self {
            Commands::Init { tracker }
            | Commands::Serve { tracker }
            | Commands::Today { tracker, .. }
            | Commands::Cleanup { tracker, .. } => tracker.dir.as_ref(),
            Commands::History { command } => command.dir(),
            Commands::Stop {} => None,
        }
    }
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    let log_dir = args
        .commands
        .dir()
        .cloned()
        .map_or_else(create_application_default_path, Ok)?
        .join(LOG_DIR);
    let (prefix, default_level) = match args.commands {
        Commands::Serve { .. } => (DAEMON_PREFIX, LevelFilter::DEBUG),
        _ => (CLI_PREFIX, LevelFilter::WARN),
    };
    enable_logging(prefix, &log_dir, logging_level, default_level, args.log)?;

    match args.commands {
        Commands::Init { tracker } => restart_server(tracker),
        Commands::Stop {} => {
            let stopped = stop_server()?;
            println!("Stopped {stopped} daemons");
            Ok(())
        }
        Commands::Serve { tracker } => start_daemon(AppContext::from_args(tracker).await?).await,
        Commands::Today {
            min_percentage,
            tracker,
        } => print_today(tracker, min_percentage).await,
        Commands::History { command } => process_history_command(command).await,
        Commands::Cleanup { days, tracker } => {
            let context = AppContext::from_args(tracker).await?;
            let storage = SnapshotStorageImpl::new(context.snapshot_dir(), Box::new(DefaultClock))?;
            let deleted = storage
                .cleanup(days.unwrap_or(context.config.retention_days))
                .await?;
            println!("Removed {deleted} snapshots");
            Ok(())
        }
    }
}

async fn print_today(tracker: TrackerArgs, min_percentage: Percentage) -> Result<()> {
    let context = AppContext::from_args(tracker).await?;
    let mut storage = SnapshotStorageImpl::new(context.snapshot_dir(), Box::new(DefaultClock))?;
    let today = DefaultClock.today();

    let cache = storage
        .load(today)
        .await?
        .map(|v| v.usage)
        .unwrap_or_else(|| UsageCache::empty(today));
    print_day(today, &cache, min_percentage);

    if let Some(time) = storage
        .load_meta()
        .await?
        .and_then(|v| v.last_successful_backup)
    {
        println!("last backup: {}", clock_time(time));
    }
    Ok(())
}
