use anyhow::Result;
use tracing::{error, info, instrument, warn};

use crate::{
    daemon::{
        status::StatusSink,
        storage::{
            entities::UsageCache, gist::GistApi, remote_storage::RemoteSnapshotStore,
            snapshot_storage::SnapshotStorage,
        },
    },
    utils::{clock::Clock, time::clock_time},
};

/// Result of one backup cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupOutcome {
    /// Saved locally and remotely.
    Complete,
    /// Saved locally, the remote failed.
    Offline,
    /// Saved locally, there is no remote configured.
    LocalOnly,
}

/// Persists caches locally and, when configured, remotely. Local persistence always comes first
/// and never depends on the remote. A remote failure only switches the service to offline mode
/// until the next successful backup.
pub struct BackupService<S, G> {
    local: S,
    remote: Option<RemoteSnapshotStore<G>>,
    offline: bool,
    status: Box<dyn StatusSink>,
    clock: Box<dyn Clock>,
}

impl<S: SnapshotStorage, G: GistApi> BackupService<S, G> {
    pub fn new(
        local: S,
        remote: Option<RemoteSnapshotStore<G>>,
        offline: bool,
        status: Box<dyn StatusSink>,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            local,
            remote,
            offline,
            status,
            clock,
        }
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// Saves the cache locally, then remotely. Only a local failure is an error: the cache stays
    /// with the caller so the next cycle writes the latest state.
    #[instrument(skip_all, fields(date = %cache.date()))]
    pub async fn backup(&mut self, cache: &UsageCache) -> Result<BackupOutcome> {
        let snapshot = match self.local.save(cache).await {
            Ok(v) => v,
            Err(e) => {
                error!("Failed to save snapshot locally {e:?}");
                self.report("save failed");
                return Err(e);
            }
        };

        let Some(remote) = self.remote.as_mut() else {
            self.report("saved locally");
            return Ok(BackupOutcome::LocalOnly);
        };

        match remote.save_today(&snapshot).await {
            Ok(()) => {
                if self.offline {
                    info!("Remote backup is reachable again");
                }
                self.offline = false;
                if let Err(e) = self.local.mark_backup_success(remote.gist_id()).await {
                    warn!("Failed to record successful backup {e:?}");
                }
                self.report("last backup");
                Ok(BackupOutcome::Complete)
            }
            Err(e) => {
                warn!("Remote backup failed, continuing offline {e:?}");
                self.offline = true;
                self.report("offline - saved locally");
                Ok(BackupOutcome::Offline)
            }
        }
    }

    fn report(&self, prefix: &str) {
        self.status
            .update(&format!("{prefix}: {}", clock_time(self.clock.time())));
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{NaiveDate, TimeZone, Utc};
    use tempfile::tempdir;

    use crate::{
        daemon::{
            status::test_status::RecordedStatus,
            storage::{
                entities::{Platform, UsageCache},
                gist::{GistError, MockGistApi},
                remote_storage::RemoteSnapshotStore,
                snapshot_storage::{SnapshotStorage, SnapshotStorageImpl},
            },
        },
        utils::{
            clock::{test_clock::ManualClock, Clock},
            time::clock_time,
        },
    };

    use super::{BackupOutcome, BackupService};

    const TODAY: NaiveDate = NaiveDate::from_ymd_opt(2018, 7, 4).unwrap();

    fn clock() -> ManualClock {
        ManualClock::new(Utc.from_utc_datetime(&TODAY.and_hms_opt(12, 0, 0).unwrap()))
    }

    fn cache(seconds: u64) -> UsageCache {
        let mut cache = UsageCache::empty(TODAY);
        cache.add_usage(
            "Chrome".into(),
            Platform::Macos,
            seconds,
            Utc.from_utc_datetime(&TODAY.and_hms_opt(11, 0, 0).unwrap()),
        );
        cache.recompute();
        cache
    }

    #[tokio::test]
    async fn test_local_only() -> Result<()> {
        let dir = tempdir()?;
        let clock = clock();
        let status = RecordedStatus::default();
        let local = SnapshotStorageImpl::new(dir.path().to_owned(), Box::new(clock.clone()))?;
        let mut service = BackupService::<_, MockGistApi>::new(
            local,
            None,
            false,
            Box::new(status.clone()),
            Box::new(clock.clone()),
        );

        assert_eq!(service.backup(&cache(5)).await?, BackupOutcome::LocalOnly);
        assert_eq!(
            status.last(),
            Some(format!("saved locally: {}", clock_time(clock.time())))
        );
        assert!(dir.path().join("2018-07-04.json").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_remote_failure_goes_offline_and_recovers() -> Result<()> {
        let dir = tempdir()?;
        let clock = clock();
        let status = RecordedStatus::default();

        let mut api = MockGistApi::new();
        let mut fetches = 0;
        api.expect_fetch_document().returning(move || {
            fetches += 1;
            if fetches == 1 {
                Err(GistError::MissingToken)
            } else {
                Ok(None)
            }
        });
        api.expect_write_document().times(1).returning(|_| Ok(()));
        api.expect_gist_id().return_const(Some("abc".to_string()));

        let local = SnapshotStorageImpl::new(dir.path().to_owned(), Box::new(clock.clone()))?;
        let remote = RemoteSnapshotStore::new(api, Box::new(clock.clone()));
        let mut service = BackupService::new(
            local,
            Some(remote),
            false,
            Box::new(status.clone()),
            Box::new(clock.clone()),
        );

        assert_eq!(service.backup(&cache(5)).await?, BackupOutcome::Offline);
        assert!(service.is_offline());
        assert!(status
            .last()
            .unwrap()
            .starts_with("offline - saved locally: "));
        // Local persistence continued while offline.
        assert!(dir.path().join("2018-07-04.json").exists());

        assert_eq!(service.backup(&cache(6)).await?, BackupOutcome::Complete);
        assert!(!service.is_offline());
        assert!(status.last().unwrap().starts_with("last backup: "));
        assert_eq!(status.lines().len(), 2);

        let check = SnapshotStorageImpl::new(dir.path().to_owned(), Box::new(clock.clone()))?;
        let meta = check.load_meta().await?.unwrap();
        assert_eq!(meta.gist_id.as_deref(), Some("abc"));
        assert_eq!(meta.last_successful_backup, Some(clock.time()));
        Ok(())
    }

    #[tokio::test]
    async fn test_local_failure_is_reported() -> Result<()> {
        let dir = tempdir()?;
        let clock = clock();
        let status = RecordedStatus::default();
        let local = SnapshotStorageImpl::new(dir.path().join("snapshots"), Box::new(clock.clone()))?;
        std::fs::remove_dir_all(dir.path().join("snapshots"))?;

        let mut api = MockGistApi::new();
        api.expect_fetch_document().never();
        api.expect_write_document().never();
        let remote = RemoteSnapshotStore::new(api, Box::new(clock.clone()));
        let mut service = BackupService::new(
            local,
            Some(remote),
            false,
            Box::new(status.clone()),
            Box::new(clock.clone()),
        );

        assert!(service.backup(&cache(5)).await.is_err());
        assert!(status.last().unwrap().starts_with("save failed: "));
        Ok(())
    }
}
