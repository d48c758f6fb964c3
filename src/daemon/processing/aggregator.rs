use std::{collections::HashMap, mem, sync::Arc};

use chrono::{DateTime, Utc};
use tracing::{debug, info, trace, warn};

use crate::{
    daemon::{
        collection::ignore::IgnoreList,
        storage::entities::{FocusSample, Platform, UsageCache},
    },
    utils::clock::Clock,
};

/// Owns the live cache of today. Samples are buffered and folded into the cache in batches,
/// every buffered sample is one sampling interval (one second by default) of usage.
///
/// The cache never spans two dates: reading or writing it after midnight retires the old cache
/// and starts an empty one for the new date. The retired cache is kept until
/// [UsageAggregator::take_retired] so that it can still be persisted.
pub struct UsageAggregator {
    buffer: Vec<FocusSample>,
    cache: UsageCache,
    retired: Option<UsageCache>,
    flush_threshold: usize,
    sample_seconds: u64,
    ignored: IgnoreList,
    clock: Box<dyn Clock>,
}

impl UsageAggregator {
    pub fn new(flush_threshold: usize, ignored: IgnoreList, clock: Box<dyn Clock>) -> Self {
        Self {
            buffer: vec![],
            cache: UsageCache::empty(clock.today()),
            retired: None,
            flush_threshold: flush_threshold.max(1),
            sample_seconds: 1,
            ignored,
            clock,
        }
    }

    /// Seconds credited per sample, the sampling interval of the collector.
    pub fn with_sample_seconds(mut self, seconds: u64) -> Self {
        self.sample_seconds = seconds.max(1);
        self
    }

    /// Buffers a sample, flushing once the buffer reaches the threshold. Returns whether a flush
    /// happened. Ignored applications never reach the buffer.
    pub fn add_sample(&mut self, sample: FocusSample) -> bool {
        if self.ignored.is_ignored(&sample.app_name) {
            trace!("Dropping ignored app {}", sample.app_name);
            return false;
        }

        self.buffer.push(sample);
        if self.buffer.len() >= self.flush_threshold {
            self.flush();
            return true;
        }
        false
    }

    /// Folds every buffered sample into the cache and recomputes the rollups.
    pub fn flush(&mut self) {
        self.roll_over();
        if self.buffer.is_empty() {
            return;
        }

        let samples = mem::take(&mut self.buffer);
        self.fold(samples);
        debug!(
            "Flushed samples, {} apps with {}s in total",
            self.cache.daily_stats.total_apps, self.cache.daily_stats.total_usage_seconds
        );
    }

    fn fold(&mut self, samples: Vec<FocusSample>) {
        let mut increments: HashMap<(Arc<str>, Platform), (u64, DateTime<Utc>)> = HashMap::new();
        for sample in samples {
            let entry = increments
                .entry((sample.app_name, sample.platform))
                .or_insert((0, sample.timestamp));
            entry.0 += self.sample_seconds;
            entry.1 = entry.1.max(sample.timestamp);
        }

        for ((app_name, platform), (seconds, last_seen)) in increments {
            self.cache.add_usage(app_name, platform, seconds, last_seen);
        }
        self.cache.recompute();
    }

    /// Live cache for today.
    pub fn cache(&mut self) -> &UsageCache {
        self.roll_over();
        &self.cache
    }

    /// Replaces the live cache, used once at startup to seed it from reconciliation. A cache of
    /// another date is retired right away.
    pub fn set_cache(&mut self, cache: UsageCache) {
        let previous = mem::replace(&mut self.cache, cache);
        if !previous.is_empty() {
            warn!(
                "Replacing a cache holding {}s of usage",
                previous.daily_stats.total_usage_seconds
            );
        }
        self.roll_over();
    }

    pub fn buffered_count(&self) -> usize {
        self.buffer.len()
    }

    pub fn has_buffered_data(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Cache of a date that ended, if it wasn't handed out yet.
    pub fn take_retired(&mut self) -> Option<UsageCache> {
        self.retired.take()
    }

    /// Gives back a retired cache that couldn't be persisted. A newer retired cache wins.
    pub fn restore_retired(&mut self, cache: UsageCache) {
        if self.retired.is_none() {
            self.retired = Some(cache);
        } else {
            warn!("Dropping unsaved cache of {}", cache.date());
        }
    }

    fn roll_over(&mut self) {
        let today = self.clock.today();
        if self.cache.date() == today {
            return;
        }

        // Samples taken before midnight still belong to the ending date.
        let ending = self.cache.date();
        let (late, pending) = mem::take(&mut self.buffer)
            .into_iter()
            .partition::<Vec<_>, _>(|v| v.timestamp.date_naive() == ending);
        self.buffer = pending;
        if !late.is_empty() {
            self.fold(late);
        }

        info!("Date changed from {ending} to {today}, starting a new cache");
        let retired = mem::replace(&mut self.cache, UsageCache::empty(today));
        if retired.is_empty() {
            return;
        }
        if let Some(unsaved) = self.retired.replace(retired) {
            warn!("Dropping unsaved cache of {}", unsaved.date());
        }
    }
}
