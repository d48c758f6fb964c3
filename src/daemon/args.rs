use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;

/// Options shared by the daemon binary and `serve`.
#[derive(Parser, Debug, Clone, Default)]
pub struct TrackerArgs {
    #[arg(
        long,
        help = "Application directory. By default $XDG_STATE_HOME, $HOME/.local/state, %APPDATA% or ~/Library/Application Support"
    )]
    pub dir: Option<PathBuf>,
    #[arg(
        long = "github-token",
        env = "GITHUB_TOKEN",
        hide_env_values = true,
        help = "Token enabling the Gist backup"
    )]
    pub github_token: Option<String>,
    #[arg(
        long = "gist-id",
        env = "GIST_ID",
        help = "Existing gist to back up into. By default the one created by a previous backup"
    )]
    pub gist_id: Option<String>,
}

#[derive(Parser, Debug)]
pub struct DaemonArgs {
    #[arg(long, help = "Stay attached to the terminal")]
    pub force: bool,
    #[command(flatten)]
    pub tracker: TrackerArgs,
    /// This option is for debugging purposes only.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
}
