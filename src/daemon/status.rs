use tracing::info;

/// Receives short human readable backup status lines, e.g. `last backup: 12:00:00`. Whatever
/// renders them stays outside of the tracking core.
pub trait StatusSink: Send + Sync {
    fn update(&self, status: &str);
}

/// Sink writing status lines into the log.
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn update(&self, status: &str) {
        info!("Status: {status}");
    }
}
