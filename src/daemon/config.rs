//! Tracker configuration, read from an optional `config.json` inside the application directory.
//! Every field has a default, so a missing file or a partial one is fine.

use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fs::operations::read_locked;

pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackerConfig {
    /// Seconds between two focus samples. One sample counts as one second of usage.
    #[serde(default = "default_sampling_interval_secs")]
    pub sampling_interval_secs: u64,

    /// Buffered samples that trigger a flush into the cache.
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,

    #[serde(default = "default_backup_interval_secs")]
    pub backup_interval_secs: u64,

    /// Days of local snapshots kept by the startup cleanup.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Upper bound of a single remote request.
    #[serde(default = "default_remote_timeout_secs")]
    pub remote_timeout_secs: u64,

    #[serde(default = "default_gist_file_name")]
    pub gist_file_name: String,

    /// Application names that never count as usage.
    #[serde(default = "default_ignored_apps")]
    pub ignored_apps: Vec<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            sampling_interval_secs: default_sampling_interval_secs(),
            flush_threshold: default_flush_threshold(),
            backup_interval_secs: default_backup_interval_secs(),
            retention_days: default_retention_days(),
            remote_timeout_secs: default_remote_timeout_secs(),
            gist_file_name: default_gist_file_name(),
            ignored_apps: default_ignored_apps(),
        }
    }
}

fn default_sampling_interval_secs() -> u64 {
    1
}

fn default_flush_threshold() -> usize {
    10
}

fn default_backup_interval_secs() -> u64 {
    60
}

fn default_retention_days() -> u32 {
    30
}

fn default_remote_timeout_secs() -> u64 {
    5
}

fn default_gist_file_name() -> String {
    "usage-data.json".into()
}

fn default_ignored_apps() -> Vec<String> {
    ["loginwindow", "System Events", "Idle"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl TrackerConfig {
    /// Reads `config.json` from `dir`, falling back to defaults when there is none.
    pub async fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        let Some(content) = read_locked(&path).await? else {
            debug!("No config at {path:?}, using defaults");
            return Ok(Self::default());
        };
        serde_json::from_str(&content).with_context(|| format!("Invalid config file {path:?}"))
    }

    pub fn sampling_interval(&self) -> Duration {
        Duration::from_secs(self.sampling_interval_secs.max(1))
    }

    pub fn backup_interval(&self) -> Duration {
        Duration::from_secs(self.backup_interval_secs.max(1))
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs.max(1))
    }
}
