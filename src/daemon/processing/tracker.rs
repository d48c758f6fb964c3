use anyhow::Result;
use tracing::{debug, info, instrument};

use crate::daemon::storage::{
    entities::{FocusSample, UsageCache},
    gist::GistApi,
    snapshot_storage::SnapshotStorage,
};

use super::{aggregator::UsageAggregator, backup::BackupService, module::EventProcessor};

/// Bridges the aggregator and the backup service. Being the only owner of the aggregator, it is
/// the single writer of the live cache.
pub struct UsageTracker<S, G> {
    aggregator: UsageAggregator,
    backup: BackupService<S, G>,
}

impl<S: SnapshotStorage, G: GistApi> UsageTracker<S, G> {
    pub fn new(aggregator: UsageAggregator, backup: BackupService<S, G>) -> Self {
        Self { aggregator, backup }
    }

    pub fn cache(&mut self) -> &UsageCache {
        self.aggregator.cache()
    }

    pub fn is_offline(&self) -> bool {
        self.backup.is_offline()
    }

    async fn persist_retired(&mut self) -> Result<()> {
        let Some(retired) = self.aggregator.take_retired() else {
            return Ok(());
        };
        info!("Persisting finished day {}", retired.date());
        if let Err(e) = self.backup.backup(&retired).await {
            self.aggregator.restore_retired(retired);
            return Err(e);
        }
        Ok(())
    }

    async fn persist_today(&mut self) -> Result<()> {
        let cache = self.aggregator.cache().clone();
        if cache.is_empty() {
            debug!("Nothing tracked today yet");
            return Ok(());
        }
        self.backup.backup(&cache).await?;
        Ok(())
    }

    async fn flush_and_persist(&mut self) -> Result<()> {
        self.aggregator.flush();
        let retired = self.persist_retired().await;
        let today = self.persist_today().await;
        retired.and(today)
    }
}

impl<S: SnapshotStorage, G: GistApi> EventProcessor for UsageTracker<S, G> {
    async fn process_next(&mut self, message: FocusSample) -> Result<()> {
        self.aggregator.add_sample(message);
        Ok(())
    }

    async fn persist(&mut self) -> Result<()> {
        self.flush_and_persist().await
    }

    #[instrument(skip(self))]
    async fn finalize(&mut self) -> Result<()> {
        debug!(
            "Final flush of {} buffered samples",
            self.aggregator.buffered_count()
        );
        self.flush_and_persist().await
    }
}
