use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::{process::Command, time::timeout};
use tracing::{debug, instrument};

use crate::daemon::storage::entities::Platform;

use super::{
    names::{bundle_display_name, is_sentinel_process, parse_pair, title_display_name},
    FocusSampler,
};

const OSASCRIPT: &str = "/usr/bin/osascript";

/// A single script is not allowed to stall the sampling loop for longer than this.
const SCRIPT_TIMEOUT: Duration = Duration::from_secs(2);

const BUNDLE_SCRIPT: &str = r#"
try
    tell application "System Events"
        set frontApp to first application process whose frontmost is true
        return (bundle identifier of frontApp) & "|" & (name of frontApp)
    end tell
on error
    return "error"
end try
"#;

const WINDOW_SCRIPT: &str = r#"
try
    tell application "System Events"
        set frontApp to first application process whose frontmost is true
        set appName to name of frontApp
        try
            return appName & "|" & (name of window 1 of frontApp)
        on error
            return appName & "|"
        end try
    end tell
on error
    return "error"
end try
"#;

const PROCESS_SCRIPT: &str = r#"
tell application "System Events" to return name of first application process whose frontmost is true
"#;

#[instrument(skip(script))]
async fn run_script(script: &str) -> Result<String> {
    let output = timeout(
        SCRIPT_TIMEOUT,
        Command::new(OSASCRIPT)
            .args(["-e", script])
            .kill_on_drop(true)
            .output(),
    )
    .await??;

    if !output.status.success() {
        bail!(
            "osascript exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Asks System Events about the frontmost process. Strategies go from most to least precise,
/// the first one producing a name wins.
pub struct MacosFocusSampler;

impl MacosFocusSampler {
    pub fn new() -> Self {
        Self
    }

    async fn by_bundle_identifier(&self) -> Result<Option<String>> {
        let output = run_script(BUNDLE_SCRIPT).await?;
        Ok(parse_pair(&output)
            .filter(|(bundle, _)| !bundle.is_empty() && *bundle != "missing value")
            .map(|(bundle, process)| bundle_display_name(bundle, process)))
    }

    async fn by_window_title(&self) -> Result<Option<String>> {
        let output = run_script(WINDOW_SCRIPT).await?;
        Ok(parse_pair(&output)
            .filter(|(process, _)| !process.is_empty())
            .map(|(process, title)| title_display_name(process, title)))
    }

    async fn by_process_name(&self) -> Result<Option<String>> {
        let process = run_script(PROCESS_SCRIPT).await?;
        if process.is_empty() || is_sentinel_process(&process) {
            return Ok(None);
        }
        Ok(Some(process))
    }
}

impl Default for MacosFocusSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FocusSampler for MacosFocusSampler {
    async fn sample(&mut self) -> Result<Option<String>> {
        match self.by_bundle_identifier().await {
            Ok(Some(name)) => return Ok(Some(name)),
            Ok(None) => debug!("No bundle identifier for the frontmost app"),
            Err(e) => debug!("Bundle identifier lookup failed {e:?}"),
        }

        match self.by_window_title().await {
            Ok(Some(name)) => return Ok(Some(name)),
            Ok(None) => debug!("No window title for the frontmost app"),
            Err(e) => debug!("Window title lookup failed {e:?}"),
        }

        self.by_process_name().await
    }

    fn platform(&self) -> Platform {
        Platform::Macos
    }
}
