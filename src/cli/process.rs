use std::{
    env,
    path::{Path, PathBuf},
    process::Stdio,
};

use anyhow::{Context, Result};
use sysinfo::{
    get_current_pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, Signal, System, UpdateKind,
};
use tracing::{debug, info};

use crate::daemon::args::TrackerArgs;

use super::daemon_path::to_daemon_path;

fn daemon_executable() -> Result<PathBuf> {
    let cli = env::current_exe().context("Can't operate without an executable")?;
    Ok(to_daemon_path(cli))
}

/// Terminates every running instance of the executable at `name`. Returns how many were found.
pub fn kill_previous_servers(name: &Path) -> Result<usize> {
    let mut system = System::new_with_specifics(
        RefreshKind::nothing()
            .with_processes(ProcessRefreshKind::nothing().with_exe(UpdateKind::OnlyIfNotSet)),
    );
    system.refresh_processes(ProcessesToUpdate::All, true);
    let current_id = get_current_pid().map_err(|e| anyhow::anyhow!("Can't get own pid {e}"))?;

    let mut killed = 0;
    for (pid, process) in system.processes().iter() {
        if *pid == current_id {
            continue;
        }
        if matches!(process.parent(), Some(p) if p == current_id) {
            continue;
        }

        if process.exe().is_some_and(|v| v == name) {
            debug!("Stopping daemon {pid}");
            // SIGTERM lets the daemon flush and save its last samples. On Windows this falls
            // back to a forceful termination.
            if process.kill_with(Signal::Term).is_none() {
                process.kill();
            }
            process.wait();
            killed += 1;
        }
    }
    Ok(killed)
}

pub fn stop_server() -> Result<usize> {
    let daemon = daemon_executable()?;
    let killed = kill_previous_servers(&daemon)?;
    info!("Stopped {killed} daemons");
    Ok(killed)
}

/// Shuts the previous daemon down and starts a new one. The daemon binary detaches itself.
pub fn restart_server(args: TrackerArgs) -> Result<()> {
    let daemon = daemon_executable()?;
    kill_previous_servers(&daemon)?;

    let mut command = std::process::Command::new(&daemon);
    if let Some(dir) = args.dir {
        command.arg("--dir").arg(dir);
    }
    if let Some(gist_id) = args.gist_id {
        command.arg("--gist-id").arg(gist_id);
    }
    // Passed through the environment to keep it out of process listings.
    if let Some(token) = args.github_token {
        command.env("GITHUB_TOKEN", token);
    }
    command.stdin(Stdio::null());
    command.stdout(Stdio::null());

    #[cfg(feature = "win")]
    {
        use std::os::windows::process::CommandExt;
        use windows::Win32::System::Threading::DETACHED_PROCESS;
        command.creation_flags(DETACHED_PROCESS.0);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    println!("Spawning {daemon:?}");
    let status = command
        .status()
        .with_context(|| format!("Failed to start {daemon:?}"))?;
    if !status.success() {
        anyhow::bail!("Daemon exited with {status}");
    }
    println!("Success");
    Ok(())
}
