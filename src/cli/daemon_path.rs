use std::path::PathBuf;

const DAEMON_BINARY: &str = "usage-tracker-daemon";

/// Daemon binary installed next to the cli binary at `path`.
pub fn to_daemon_path(mut path: PathBuf) -> PathBuf {
    path.set_file_name(DAEMON_BINARY);
    #[cfg(windows)]
    {
        path.set_extension("exe");
    }
    path
}
