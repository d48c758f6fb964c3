use std::{collections::BTreeMap, future::Future, path::PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Days, NaiveDate, Utc};
use fs4::tokio::AsyncFileExt;
use futures::{stream, StreamExt};
use tokio::{fs::File, io::AsyncReadExt};
use tracing::{debug, info, instrument, warn};

use crate::{
    fs::operations::{overwrite, read_locked, write_atomic},
    utils::{
        clock::Clock,
        time::{date_to_snapshot_name, snapshot_name_to_date},
    },
};

use super::entities::{DailySnapshot, LocalMeta, UsageCache};

const META_FILE: &str = "meta.json";

/// Interface for abstracting local storage of daily snapshots.
pub trait SnapshotStorage {
    /// Persists the cache into the file of its date. An existing file is merged with the usage
    /// the cache gained since this storage last observed that date, so repeated saves of the same
    /// cache don't count anything twice.
    fn save(&mut self, cache: &UsageCache) -> impl Future<Output = Result<DailySnapshot>>;

    /// Loads the snapshot of an exact date.
    fn load(&mut self, date: NaiveDate) -> impl Future<Output = Result<Option<DailySnapshot>>>;

    /// Every persisted snapshot, ascending by date.
    fn load_all(&self) -> impl Future<Output = Result<Vec<DailySnapshot>>>;

    /// Snapshots between `start` and `end`, both inclusive.
    fn load_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl Future<Output = Result<Vec<DailySnapshot>>>;

    /// Deletes snapshots older than `today - retention_days`. Returns amount of deleted files.
    fn cleanup(&self, retention_days: u32) -> impl Future<Output = Result<usize>>;

    fn load_meta(&self) -> impl Future<Output = Result<Option<LocalMeta>>>;

    /// Records a successful remote backup, remembering the remote document id.
    fn mark_backup_success(&self, gist_id: Option<String>) -> impl Future<Output = Result<()>>;
}

/// The main realization of [SnapshotStorage]. One pretty printed JSON file per date plus a
/// `meta.json` index.
pub struct SnapshotStorageImpl {
    snapshot_dir: PathBuf,
    clock: Box<dyn Clock>,
    /// Per date, the state last loaded from disk or last handed to `save` by this instance.
    observed: BTreeMap<NaiveDate, DailySnapshot>,
}

impl SnapshotStorageImpl {
    pub fn new(snapshot_dir: PathBuf, clock: Box<dyn Clock>) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&snapshot_dir)?;

        Ok(Self {
            snapshot_dir,
            clock,
            observed: BTreeMap::new(),
        })
    }

    fn snapshot_path(&self, date: NaiveDate) -> PathBuf {
        self.snapshot_dir.join(date_to_snapshot_name(date))
    }

    fn meta_path(&self) -> PathBuf {
        self.snapshot_dir.join(META_FILE)
    }

    async fn stored_dates(&self) -> Result<Vec<NaiveDate>> {
        let mut entries = tokio::fs::read_dir(&self.snapshot_dir).await?;
        let mut dates = vec![];
        while let Some(entry) = entries.next_entry().await? {
            if let Some(date) = entry.file_name().to_str().and_then(snapshot_name_to_date) {
                dates.push(date);
            }
        }
        dates.sort();
        Ok(dates)
    }

    async fn read_snapshot(&self, date: NaiveDate) -> Result<Option<DailySnapshot>> {
        let path = self.snapshot_path(date);
        let Some(content) = read_locked(&path).await? else {
            return Ok(None);
        };
        let snapshot = DailySnapshot::from_json(&content)
            .with_context(|| format!("Failed to parse snapshot {path:?}"))?;
        Ok(Some(snapshot))
    }

    async fn read_many(&self, dates: Vec<NaiveDate>) -> Result<Vec<DailySnapshot>> {
        let snapshots = stream::iter(dates)
            .map(|date| async move { (date, self.read_snapshot(date).await) })
            .buffered(4)
            .filter_map(|(date, snapshot)| async move {
                match snapshot {
                    Ok(v) => v,
                    Err(e) => {
                        // A single broken day shouldn't hide the rest of the history.
                        warn!("Skipping snapshot for {date}: {e:?}");
                        None
                    }
                }
            })
            .collect::<Vec<_>>()
            .await;
        Ok(snapshots)
    }

    async fn save_locked(
        &self,
        file: &mut File,
        cache: &UsageCache,
        now: DateTime<Utc>,
    ) -> Result<DailySnapshot> {
        let date = cache.date();
        let incoming = DailySnapshot::from_cache(cache.clone(), now, now);

        let mut content = String::new();
        file.read_to_string(&mut content).await?;

        let snapshot = if content.trim().is_empty() {
            debug!("Creating snapshot for {date}");
            incoming
        } else {
            match DailySnapshot::from_json(&content) {
                Ok(existing) => {
                    let unsaved = match self.observed.get(&date) {
                        Some(baseline) => incoming.usage_since(baseline)?,
                        None => incoming,
                    };
                    let mut merged = existing.merge(&unsaved)?;
                    merged.last_updated = now;
                    merged
                }
                Err(e) => {
                    warn!("Snapshot for {date} is corrupted, replacing it {e}");
                    incoming
                }
            }
        };

        overwrite(file, snapshot.to_json()?.as_bytes()).await?;
        Ok(snapshot)
    }

    /// Rewrites `meta.json` from the files currently on disk.
    async fn rebuild_meta(&self) -> Result<()> {
        let dates = self.stored_dates().await?;
        let previous = self.load_meta().await.unwrap_or_else(|e| {
            warn!("Ignoring unreadable meta file {e:?}");
            None
        });
        let previous = previous.unwrap_or_default();

        let meta = LocalMeta {
            total_days: dates.len(),
            oldest_date: dates.first().copied(),
            newest_date: dates.last().copied(),
            last_backup_attempt: Some(self.clock.time()),
            ..previous
        };
        self.write_meta(&meta).await
    }

    async fn write_meta(&self, meta: &LocalMeta) -> Result<()> {
        let content = serde_json::to_vec_pretty(meta)?;
        write_atomic(&self.meta_path(), &content).await?;
        Ok(())
    }
}

impl SnapshotStorage for SnapshotStorageImpl {
    #[instrument(skip_all, fields(date = %cache.date()))]
    async fn save(&mut self, cache: &UsageCache) -> Result<DailySnapshot> {
        let now = self.clock.time();
        let path = self.snapshot_path(cache.date());

        let mut file = File::options()
            .write(true)
            .create(true)
            .read(true)
            .truncate(false)
            .open(&path)
            .await?;

        // Semi-safe acquire-release for a file
        file.lock_exclusive()?;
        let result = self.save_locked(&mut file, cache, now).await;
        file.unlock_async().await?;
        let snapshot = result?;

        // Only what this instance wrote counts as observed, usage of other writers stays theirs.
        self.observed
            .insert(snapshot.date, DailySnapshot::from_cache(cache.clone(), now, now));
        self.rebuild_meta().await?;

        info!(
            "Saved {} apps, {}s into {path:?}",
            snapshot.usage.daily_stats.total_apps, snapshot.usage.daily_stats.total_usage_seconds
        );
        Ok(snapshot)
    }

    async fn load(&mut self, date: NaiveDate) -> Result<Option<DailySnapshot>> {
        let snapshot = self.read_snapshot(date).await?;
        if let Some(snapshot) = &snapshot {
            self.observed.insert(date, snapshot.clone());
        }
        Ok(snapshot)
    }

    async fn load_all(&self) -> Result<Vec<DailySnapshot>> {
        let dates = self.stored_dates().await?;
        self.read_many(dates).await
    }

    async fn load_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailySnapshot>> {
        let dates = self
            .stored_dates()
            .await?
            .into_iter()
            .filter(|date| (start..=end).contains(date))
            .collect();
        self.read_many(dates).await
    }

    #[instrument(skip(self))]
    async fn cleanup(&self, retention_days: u32) -> Result<usize> {
        let cutoff = self
            .clock
            .today()
            .checked_sub_days(Days::new(retention_days.into()))
            .unwrap_or(NaiveDate::MIN);

        let mut deleted = 0;
        for date in self.stored_dates().await? {
            if date < cutoff {
                tokio::fs::remove_file(self.snapshot_path(date)).await?;
                deleted += 1;
            }
        }

        self.rebuild_meta().await?;
        if deleted > 0 {
            info!("Removed {deleted} snapshots older than {cutoff}");
        }
        Ok(deleted)
    }

    async fn load_meta(&self) -> Result<Option<LocalMeta>> {
        let Some(content) = read_locked(&self.meta_path()).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn mark_backup_success(&self, gist_id: Option<String>) -> Result<()> {
        let mut meta = self.load_meta().await?.unwrap_or_default();
        meta.last_successful_backup = Some(self.clock.time());
        if gist_id.is_some() {
            meta.gist_id = gist_id;
        }
        self.write_meta(&meta).await
    }
}
