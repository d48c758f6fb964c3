//! Startup decision of which snapshot of today becomes the live cache.
//!
//! Remote entries are periodic uploads of local state, so a local snapshot of today is always at
//! least as fresh and wins outright. The two sides are never summed: doing so counts every
//! already uploaded second a second time.

use anyhow::Result;
use chrono::NaiveDate;
use tracing::{info, instrument, warn};

use crate::utils::clock::Clock;

use super::storage::{
    entities::{DailySnapshot, UsageCache},
    gist::GistApi,
    remote_storage::RemoteSnapshotStore,
    snapshot_storage::SnapshotStorage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    Local,
    Remote,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub cache: UsageCache,
    pub source: CacheSource,
    /// The remote was configured but couldn't be read.
    pub offline: bool,
}

/// Picks the cache of `today` out of the local and remote snapshots. Empty or mislabeled
/// snapshots count as absent.
pub fn choose(
    today: NaiveDate,
    local: Option<DailySnapshot>,
    remote: Option<DailySnapshot>,
) -> (UsageCache, CacheSource) {
    let usable = |snapshot: Option<DailySnapshot>| {
        snapshot.filter(|v| v.date == today && !v.is_empty())
    };

    match (usable(local), usable(remote)) {
        (Some(local), _) => (local.usage, CacheSource::Local),
        (None, Some(remote)) => (remote.usage, CacheSource::Remote),
        (None, None) => (UsageCache::empty(today), CacheSource::Empty),
    }
}

/// Loads today from both stores and decides. A remote failure switches to offline mode, a broken
/// local file is treated as missing, neither is fatal.
#[instrument(skip_all)]
pub async fn reconcile<S: SnapshotStorage, G: GistApi>(
    local: &mut S,
    remote: Option<&RemoteSnapshotStore<G>>,
    clock: &dyn Clock,
) -> Result<Reconciliation> {
    let today = clock.today();

    let mut offline = false;
    let remote_today = match remote {
        Some(remote) => match remote.load_today().await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Remote is unavailable, starting offline {e:?}");
                offline = true;
                None
            }
        },
        None => None,
    };

    let local_today = local.load(today).await.unwrap_or_else(|e| {
        warn!("Ignoring unreadable local snapshot of {today} {e:?}");
        None
    });

    let (cache, source) = choose(today, local_today, remote_today);
    info!(
        "Starting from {source:?} cache with {}s over {} apps",
        cache.daily_stats.total_usage_seconds, cache.daily_stats.total_apps
    );
    Ok(Reconciliation {
        cache,
        source,
        offline,
    })
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use tempfile::tempdir;

    use crate::{
        daemon::storage::{
            entities::{DailySnapshot, Platform, StructuredRemoteDocument, UsageCache},
            gist::{GistError, MockGistApi},
            remote_storage::RemoteSnapshotStore,
            snapshot_storage::{SnapshotStorage, SnapshotStorageImpl},
        },
        utils::clock::test_clock::ManualClock,
    };

    use super::{choose, reconcile, CacheSource};

    const TODAY: NaiveDate = NaiveDate::from_ymd_opt(2018, 7, 4).unwrap();

    fn clock() -> ManualClock {
        ManualClock::new(Utc.from_utc_datetime(&TODAY.and_hms_opt(9, 0, 0).unwrap()))
    }

    fn snapshot(date: NaiveDate, app: &str, seconds: u64) -> DailySnapshot {
        let time = Utc.from_utc_datetime(&date.and_hms_opt(8, 0, 0).unwrap());
        let mut usage = UsageCache::empty(date);
        usage.add_usage(app.into(), Platform::Macos, seconds, time);
        usage.recompute();
        DailySnapshot::from_cache(usage, time, time)
    }

    #[test]
    fn test_local_wins_over_remote() {
        let (cache, source) = choose(
            TODAY,
            Some(snapshot(TODAY, "Chrome", 10)),
            Some(snapshot(TODAY, "Chrome", 50)),
        );
        assert_eq!(source, CacheSource::Local);
        // Never summed.
        assert_eq!(cache.seconds_for("Chrome", Platform::Macos), Some(10));
    }

    #[test]
    fn test_local_only() {
        let (cache, source) = choose(TODAY, Some(snapshot(TODAY, "Chrome", 10)), None);
        assert_eq!(source, CacheSource::Local);
        assert_eq!(cache.daily_stats.total_usage_seconds, 10);
    }

    #[test]
    fn test_remote_only() {
        let (cache, source) = choose(TODAY, None, Some(snapshot(TODAY, "Safari", 4)));
        assert_eq!(source, CacheSource::Remote);
        assert_eq!(cache.seconds_for("Safari", Platform::Macos), Some(4));
    }

    #[test]
    fn test_neither() {
        let (cache, source) = choose(TODAY, None, None);
        assert_eq!(source, CacheSource::Empty);
        assert_eq!(cache, UsageCache::empty(TODAY));
    }

    #[test]
    fn test_empty_and_stale_snapshots_are_absent() {
        let (_, source) = choose(
            TODAY,
            Some(DailySnapshot::empty(TODAY, Utc::now())),
            Some(snapshot(TODAY, "Safari", 4)),
        );
        assert_eq!(source, CacheSource::Remote);

        let (cache, source) = choose(
            TODAY,
            None,
            Some(snapshot(TODAY - Duration::days(1), "Safari", 4)),
        );
        assert_eq!(source, CacheSource::Empty);
        assert_eq!(cache.date(), TODAY);
    }

    #[tokio::test]
    async fn test_remote_failure_is_offline_local() -> Result<()> {
        let dir = tempdir()?;
        let clock = clock();
        let mut local = SnapshotStorageImpl::new(dir.path().to_owned(), Box::new(clock.clone()))?;
        local.save(&snapshot(TODAY, "Chrome", 10).usage).await?;

        let mut api = MockGistApi::new();
        api.expect_fetch_document()
            .returning(|| Err(GistError::MissingToken));
        let remote = RemoteSnapshotStore::new(api, Box::new(clock.clone()));

        let result = reconcile(&mut local, Some(&remote), &clock).await?;
        assert!(result.offline);
        assert_eq!(result.source, CacheSource::Local);
        assert_eq!(result.cache.daily_stats.total_usage_seconds, 10);
        Ok(())
    }

    #[tokio::test]
    async fn test_remote_today_seeds_fresh_install() -> Result<()> {
        let dir = tempdir()?;
        let clock = clock();
        let mut local = SnapshotStorageImpl::new(dir.path().to_owned(), Box::new(clock.clone()))?;

        let mut document = StructuredRemoteDocument::default();
        document.upsert(snapshot(TODAY - Duration::days(1), "Chrome", 900), Utc::now());
        document.upsert(snapshot(TODAY, "Chrome", 20), Utc::now());
        let content = document.to_json()?;
        let mut api = MockGistApi::new();
        api.expect_fetch_document()
            .returning(move || Ok(Some(content.clone())));
        let remote = RemoteSnapshotStore::new(api, Box::new(clock.clone()));

        let result = reconcile(&mut local, Some(&remote), &clock).await?;
        assert!(!result.offline);
        assert_eq!(result.source, CacheSource::Remote);
        assert_eq!(result.cache.daily_stats.total_usage_seconds, 20);
        Ok(())
    }

    #[tokio::test]
    async fn test_without_remote() -> Result<()> {
        let dir = tempdir()?;
        let clock = clock();
        let mut local = SnapshotStorageImpl::new(dir.path().to_owned(), Box::new(clock.clone()))?;

        let result = reconcile::<_, MockGistApi>(&mut local, None, &clock).await?;
        assert!(!result.offline);
        assert_eq!(result.source, CacheSource::Empty);
        Ok(())
    }
}
