use std::{collections::BTreeMap, fmt::Display, sync::Arc};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Key reserved for the metadata block inside a [StructuredRemoteDocument].
pub const METADATA_KEY: &str = "metadata";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("can't merge snapshots of different dates: {left} vs {right}")]
    DateMismatch { left: NaiveDate, right: NaiveDate },
    #[error("invalid snapshot document: {0}")]
    InvalidDocument(String),
    #[error("failed to serialize snapshot: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Macos,
    Android,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Windows, Platform::Macos, Platform::Android];

    /// Platform of the running process. Only resolved at compile time, so there is nothing to
    /// re-detect later.
    pub fn current() -> Option<Platform> {
        if cfg!(target_os = "windows") {
            Some(Platform::Windows)
        } else if cfg!(target_os = "macos") {
            Some(Platform::Macos)
        } else if cfg!(target_os = "android") {
            Some(Platform::Android)
        } else {
            None
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Windows => write!(f, "windows"),
            Platform::Macos => write!(f, "macos"),
            Platform::Android => write!(f, "android"),
        }
    }
}

/// One observation of the application owning input focus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusSample {
    pub app_name: Arc<str>,
    pub platform: Platform,
    pub timestamp: DateTime<Utc>,
}

/// Usage of a single application on a single platform for one day. `app_name` together with
/// `platform` is the identity of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppUsageRecord {
    pub app_name: Arc<str>,
    pub platform: Platform,
    pub total_usage_seconds: u64,
    #[serde(rename = "lastUpdated")]
    pub last_updated: DateTime<Utc>,
}

impl AppUsageRecord {
    pub fn is_same_app(&self, app_name: &str, platform: Platform) -> bool {
        self.platform == platform && &*self.app_name == app_name
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub total_apps: usize,
    pub total_usage_seconds: u64,
}

impl UsageTotals {
    fn of<'a>(records: impl IntoIterator<Item = &'a AppUsageRecord>) -> Self {
        records
            .into_iter()
            .fold(UsageTotals::default(), |totals, record| UsageTotals {
                total_apps: totals.total_apps + 1,
                total_usage_seconds: totals.total_usage_seconds + record.total_usage_seconds,
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStats {
    pub total_apps: usize,
    pub total_usage_seconds: u64,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformStats {
    pub apps: Vec<AppUsageRecord>,
    pub stats: UsageTotals,
}

/// Per platform rollups. All three platforms are always present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformStatsMap {
    pub windows: PlatformStats,
    pub macos: PlatformStats,
    pub android: PlatformStats,
}

impl PlatformStatsMap {
    pub fn get(&self, platform: Platform) -> &PlatformStats {
        match platform {
            Platform::Windows => &self.windows,
            Platform::Macos => &self.macos,
            Platform::Android => &self.android,
        }
    }

    fn get_mut(&mut self, platform: Platform) -> &mut PlatformStats {
        match platform {
            Platform::Windows => &mut self.windows,
            Platform::Macos => &mut self.macos,
            Platform::Android => &mut self.android,
        }
    }

    fn from_records(records: &[AppUsageRecord]) -> Self {
        let mut map = PlatformStatsMap::default();
        for platform in Platform::ALL {
            let apps = records
                .iter()
                .filter(|v| v.platform == platform)
                .cloned()
                .collect::<Vec<_>>();
            let stats = UsageTotals::of(&apps);
            *map.get_mut(platform) = PlatformStats { apps, stats };
        }
        map
    }
}

/// Aggregated usage for one day. This is the only structure handed out to renderers; rollups are
/// always derived from `app_usage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageCache {
    pub app_usage: Vec<AppUsageRecord>,
    pub daily_stats: DailyStats,
    pub platform_stats: PlatformStatsMap,
}

impl UsageCache {
    pub fn empty(date: NaiveDate) -> Self {
        Self::from_records(date, vec![])
    }

    pub fn from_records(date: NaiveDate, app_usage: Vec<AppUsageRecord>) -> Self {
        let mut cache = Self {
            app_usage,
            daily_stats: DailyStats {
                total_apps: 0,
                total_usage_seconds: 0,
                date,
            },
            platform_stats: PlatformStatsMap::default(),
        };
        cache.recompute();
        cache
    }

    pub fn date(&self) -> NaiveDate {
        self.daily_stats.date
    }

    pub fn is_empty(&self) -> bool {
        self.app_usage.is_empty()
    }

    pub fn seconds_for(&self, app_name: &str, platform: Platform) -> Option<u64> {
        self.app_usage
            .iter()
            .find(|v| v.is_same_app(app_name, platform))
            .map(|v| v.total_usage_seconds)
    }

    /// Adds usage to the record of an app, creating it if absent. Rollups are not touched, call
    /// [UsageCache::recompute] once all increments are applied.
    pub fn add_usage(
        &mut self,
        app_name: Arc<str>,
        platform: Platform,
        seconds: u64,
        at: DateTime<Utc>,
    ) {
        match self
            .app_usage
            .iter_mut()
            .find(|v| v.is_same_app(&app_name, platform))
        {
            Some(record) => {
                record.total_usage_seconds += seconds;
                record.last_updated = record.last_updated.max(at);
            }
            None => self.app_usage.push(AppUsageRecord {
                app_name,
                platform,
                total_usage_seconds: seconds,
                last_updated: at,
            }),
        }
    }

    /// Rebuilds daily and platform rollups from the record set.
    pub fn recompute(&mut self) {
        let totals = UsageTotals::of(&self.app_usage);
        self.daily_stats.total_apps = totals.total_apps;
        self.daily_stats.total_usage_seconds = totals.total_usage_seconds;
        self.platform_stats = PlatformStatsMap::from_records(&self.app_usage);
    }
}

/// The unit of persistence: the usage of exactly one calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySnapshot {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub usage: UsageCache,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl DailySnapshot {
    pub fn empty(date: NaiveDate, now: DateTime<Utc>) -> Self {
        Self::from_cache(UsageCache::empty(date), now, now)
    }

    pub fn from_cache(usage: UsageCache, created_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            date: usage.date(),
            usage,
            created_at,
            last_updated: now,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.usage.is_empty()
    }

    /// Parses a snapshot and checks that it is internally consistent. Rollups are recomputed so
    /// that a hand edited file can't break the totals.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot = serde_json::from_str::<DailySnapshot>(json)?;
        snapshot.validated()
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn validated(mut self) -> Result<Self, SnapshotError> {
        if self.usage.daily_stats.date != self.date {
            return Err(SnapshotError::InvalidDocument(format!(
                "snapshot for {} carries stats for {}",
                self.date, self.usage.daily_stats.date
            )));
        }
        self.usage.recompute();
        Ok(self)
    }

    /// Combines two snapshots of the same date. Seconds of matching apps are summed, the later
    /// `lastUpdated` and the earlier `createdAt` are kept.
    pub fn merge(&self, other: &DailySnapshot) -> Result<DailySnapshot, SnapshotError> {
        if self.date != other.date {
            return Err(SnapshotError::DateMismatch {
                left: self.date,
                right: other.date,
            });
        }

        let mut usage = self.usage.clone();
        for record in &other.usage.app_usage {
            usage.add_usage(
                record.app_name.clone(),
                record.platform,
                record.total_usage_seconds,
                record.last_updated,
            );
        }
        usage.recompute();

        Ok(DailySnapshot {
            date: self.date,
            usage,
            created_at: self.created_at.min(other.created_at),
            last_updated: self.last_updated.max(other.last_updated),
        })
    }

    /// Returns usage present in `self` but not yet in `baseline`. Apps that didn't grow are left
    /// out.
    pub fn usage_since(&self, baseline: &DailySnapshot) -> Result<DailySnapshot, SnapshotError> {
        if self.date != baseline.date {
            return Err(SnapshotError::DateMismatch {
                left: self.date,
                right: baseline.date,
            });
        }

        let records = self
            .usage
            .app_usage
            .iter()
            .filter_map(|record| {
                let seen = baseline
                    .usage
                    .seconds_for(&record.app_name, record.platform)
                    .unwrap_or(0);
                let grown = record.total_usage_seconds.saturating_sub(seen);
                (grown > 0).then(|| AppUsageRecord {
                    total_usage_seconds: grown,
                    ..record.clone()
                })
            })
            .collect();

        Ok(DailySnapshot {
            date: self.date,
            usage: UsageCache::from_records(self.date, records),
            created_at: self.created_at,
            last_updated: self.last_updated,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMetadata {
    pub last_updated: DateTime<Utc>,
    pub total_days: usize,
    pub oldest_date: Option<NaiveDate>,
    pub newest_date: Option<NaiveDate>,
}

/// The single remote document: a map of dates to snapshots plus a `metadata` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuredRemoteDocument {
    pub days: BTreeMap<NaiveDate, DailySnapshot>,
    pub metadata: Option<RemoteMetadata>,
}

impl StructuredRemoteDocument {
    pub fn get(&self, date: NaiveDate) -> Option<&DailySnapshot> {
        self.days.get(&date)
    }

    /// Sets the entry for the snapshot's date and rebuilds the metadata from the full key set.
    pub fn upsert(&mut self, snapshot: DailySnapshot, now: DateTime<Utc>) {
        self.days.insert(snapshot.date, snapshot);
        self.metadata = Some(RemoteMetadata {
            last_updated: now,
            total_days: self.days.len(),
            oldest_date: self.days.keys().next().copied(),
            newest_date: self.days.keys().next_back().copied(),
        });
    }

    /// Parses a remote document. Every key except `metadata` has to be a date mapping to a well
    /// formed snapshot of that same date; anything else rejects the whole document.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let entries = serde_json::from_str::<Map<String, Value>>(json)?;
        let mut document = StructuredRemoteDocument::default();

        for (key, value) in entries {
            if key == METADATA_KEY {
                document.metadata = Some(serde_json::from_value(value)?);
                continue;
            }
            let date = key.parse::<NaiveDate>().map_err(|e| {
                SnapshotError::InvalidDocument(format!("key {key:?} is not a date: {e}"))
            })?;
            let snapshot = serde_json::from_value::<DailySnapshot>(value)
                .map_err(|e| SnapshotError::InvalidDocument(format!("entry {key}: {e}")))?
                .validated()?;
            if snapshot.date != date {
                return Err(SnapshotError::InvalidDocument(format!(
                    "entry {key} holds a snapshot for {}",
                    snapshot.date
                )));
            }
            document.days.insert(date, snapshot);
        }

        Ok(document)
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        let mut entries = Map::new();
        for (date, snapshot) in &self.days {
            entries.insert(date.to_string(), serde_json::to_value(snapshot)?);
        }
        if let Some(metadata) = &self.metadata {
            entries.insert(METADATA_KEY.into(), serde_json::to_value(metadata)?);
        }
        Ok(serde_json::to_string_pretty(&entries)?)
    }
}

/// Index record that accompanies the local snapshot files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalMeta {
    pub total_days: usize,
    pub oldest_date: Option<NaiveDate>,
    pub newest_date: Option<NaiveDate>,
    pub last_backup_attempt: Option<DateTime<Utc>>,
    pub last_successful_backup: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gist_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    use super::*;

    const TEST_DATE: NaiveDate = NaiveDate::from_ymd_opt(2018, 7, 4).unwrap();

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.from_utc_datetime(&TEST_DATE.and_hms_opt(12, 0, 0).unwrap()) + Duration::seconds(seconds)
    }

    fn snapshot(date: NaiveDate, apps: &[(&str, Platform, u64)], created: i64) -> DailySnapshot {
        let mut usage = UsageCache::empty(date);
        for (name, platform, seconds) in apps {
            usage.add_usage((*name).into(), *platform, *seconds, at(created));
        }
        usage.recompute();
        DailySnapshot::from_cache(usage, at(created), at(created))
    }

    #[test]
    fn test_rollups_cover_every_platform() {
        let value = snapshot(
            TEST_DATE,
            &[
                ("Chrome", Platform::Macos, 7),
                ("Safari", Platform::Macos, 3),
                ("Chrome", Platform::Windows, 5),
            ],
            0,
        );

        assert_eq!(value.usage.daily_stats.total_apps, 3);
        assert_eq!(value.usage.daily_stats.total_usage_seconds, 15);
        assert_eq!(value.usage.platform_stats.macos.stats.total_apps, 2);
        assert_eq!(value.usage.platform_stats.macos.stats.total_usage_seconds, 10);
        assert_eq!(value.usage.platform_stats.windows.stats.total_usage_seconds, 5);
        assert_eq!(value.usage.platform_stats.android, PlatformStats::default());
    }

    #[test]
    fn test_merge_disjoint_apps() {
        let a = snapshot(TEST_DATE, &[("X", Platform::Macos, 4)], 0);
        let b = snapshot(TEST_DATE, &[("Y", Platform::Macos, 9)], 10);

        let merged = a.merge(&b).unwrap();

        assert_eq!(merged.usage.seconds_for("X", Platform::Macos), Some(4));
        assert_eq!(merged.usage.seconds_for("Y", Platform::Macos), Some(9));
        assert_eq!(merged.usage.daily_stats.total_apps, 2);
        assert_eq!(b.merge(&a).unwrap().usage.daily_stats, merged.usage.daily_stats);
    }

    #[test]
    fn test_merge_overlapping_apps_sums_seconds() {
        let a = snapshot(TEST_DATE, &[("X", Platform::Macos, 4)], 20);
        let b = snapshot(TEST_DATE, &[("X", Platform::Macos, 6)], 5);

        let merged = a.merge(&b).unwrap();

        assert_eq!(merged.usage.seconds_for("X", Platform::Macos), Some(10));
        assert_eq!(merged.usage.app_usage[0].last_updated, at(20));
        assert_eq!(merged.created_at, at(5));
        assert_eq!(merged.last_updated, at(20));
        assert_eq!(merged.usage.daily_stats.total_usage_seconds, 10);
    }

    #[test]
    fn test_merge_keeps_platforms_apart() {
        let a = snapshot(TEST_DATE, &[("Chrome", Platform::Macos, 4)], 0);
        let b = snapshot(TEST_DATE, &[("Chrome", Platform::Windows, 6)], 0);

        let merged = a.merge(&b).unwrap();

        assert_eq!(merged.usage.app_usage.len(), 2);
        assert_eq!(merged.usage.platform_stats.windows.stats.total_apps, 1);
        assert_eq!(merged.usage.platform_stats.macos.stats.total_apps, 1);
    }

    #[test]
    fn test_merge_rejects_different_dates() {
        let a = snapshot(TEST_DATE, &[("X", Platform::Macos, 4)], 0);
        let b = snapshot(TEST_DATE.succ_opt().unwrap(), &[("X", Platform::Macos, 4)], 0);

        assert!(matches!(
            a.merge(&b),
            Err(SnapshotError::DateMismatch { .. })
        ));
    }

    #[test]
    fn test_usage_since_only_keeps_growth() {
        let baseline = snapshot(
            TEST_DATE,
            &[("X", Platform::Macos, 4), ("Y", Platform::Macos, 2)],
            0,
        );
        let current = snapshot(
            TEST_DATE,
            &[
                ("X", Platform::Macos, 10),
                ("Y", Platform::Macos, 2),
                ("Z", Platform::Windows, 1),
            ],
            0,
        );

        let delta = current.usage_since(&baseline).unwrap();

        assert_eq!(delta.usage.seconds_for("X", Platform::Macos), Some(6));
        assert_eq!(delta.usage.seconds_for("Y", Platform::Macos), None);
        assert_eq!(delta.usage.seconds_for("Z", Platform::Windows), Some(1));
    }

    #[test]
    fn test_snapshot_json_shape() {
        let value = snapshot(TEST_DATE, &[("Safari", Platform::Macos, 3)], 0);
        let json: Value = serde_json::from_str(&value.to_json().unwrap()).unwrap();

        assert_eq!(json["date"], "2018-07-04");
        assert_eq!(json["appUsage"][0]["app_name"], "Safari");
        assert_eq!(json["appUsage"][0]["platform"], "macos");
        assert_eq!(json["dailyStats"]["total_usage_seconds"], 3);
        assert_eq!(json["platformStats"]["macos"]["stats"]["total_apps"], 1);
        assert!(json.get("createdAt").is_some());
        assert!(json.get("lastUpdated").is_some());
    }

    #[test]
    fn test_snapshot_parse_recomputes_rollups() {
        let mut value = snapshot(TEST_DATE, &[("Safari", Platform::Macos, 3)], 0);
        value.usage.daily_stats.total_usage_seconds = 999;

        let parsed = DailySnapshot::from_json(&value.to_json().unwrap()).unwrap();

        assert_eq!(parsed.usage.daily_stats.total_usage_seconds, 3);
    }

    #[test]
    fn test_snapshot_parse_rejects_missing_fields() {
        let json = r#"{ "date": "2018-07-04", "apps": [] }"#;
        assert!(DailySnapshot::from_json(json).is_err());
    }

    #[test]
    fn test_remote_document_roundtrip_keeps_metadata() {
        let mut document = StructuredRemoteDocument::default();
        document.upsert(snapshot(TEST_DATE, &[("X", Platform::Macos, 1)], 0), at(0));
        document.upsert(
            snapshot(TEST_DATE - Duration::days(2), &[("Y", Platform::Macos, 1)], 0),
            at(1),
        );

        let parsed = StructuredRemoteDocument::from_json(&document.to_json().unwrap()).unwrap();

        let metadata = parsed.metadata.clone().unwrap();
        assert_eq!(metadata.total_days, 2);
        assert_eq!(metadata.oldest_date, Some(TEST_DATE - Duration::days(2)));
        assert_eq!(metadata.newest_date, Some(TEST_DATE));
        assert_eq!(parsed, document);
    }

    #[test]
    fn test_remote_document_rejects_unknown_keys() {
        let json = r#"{ "appUsage": [] }"#;
        assert!(matches!(
            StructuredRemoteDocument::from_json(json),
            Err(SnapshotError::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_remote_document_rejects_mislabeled_entry() {
        let value = snapshot(TEST_DATE, &[("X", Platform::Macos, 1)], 0);
        let json = format!(r#"{{ "2018-07-05": {} }}"#, value.to_json().unwrap());
        assert!(StructuredRemoteDocument::from_json(&json).is_err());
    }
}
