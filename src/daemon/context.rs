use std::path::PathBuf;

use anyhow::Result;
use tracing::info;

use crate::utils::dir::create_application_default_path;

use super::{args::TrackerArgs, config::TrackerConfig};

const SNAPSHOT_DIR: &str = "snapshots";
pub const LOG_DIR: &str = "logs";

/// Everything the daemon needs to know about its environment, resolved once at startup and
/// handed down explicitly.
#[derive(Clone)]
pub struct AppContext {
    pub dir: PathBuf,
    pub config: TrackerConfig,
    pub github_token: Option<String>,
    pub gist_id: Option<String>,
}

impl AppContext {
    pub async fn from_args(args: TrackerArgs) -> Result<Self> {
        let dir = match args.dir {
            Some(dir) => {
                std::fs::create_dir_all(&dir)?;
                // The daemon leaves its working directory, relative paths would break.
                dir.canonicalize()?
            }
            None => create_application_default_path()?,
        };
        let config = TrackerConfig::load(&dir).await?;
        Ok(Self::new(dir, config, args.github_token, args.gist_id))
    }

    pub fn new(
        dir: PathBuf,
        config: TrackerConfig,
        github_token: Option<String>,
        gist_id: Option<String>,
    ) -> Self {
        let github_token = github_token.filter(|v| !v.trim().is_empty());
        if github_token.is_none() {
            info!("No GitHub token, remote backup is disabled");
        }
        Self {
            dir,
            config,
            github_token,
            gist_id: gist_id.filter(|v| !v.trim().is_empty()),
        }
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_DIR)
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("dir", &self.dir)
            .field("config", &self.config)
            .field("github_token", &self.github_token.as_ref().map(|_| "[REDACTED]"))
            .field("gist_id", &self.gist_id)
            .finish()
    }
}
