use std::sync::Arc;

use ansi_term::Style;
use chrono::NaiveDate;

use crate::{
    daemon::storage::entities::{DailySnapshot, Platform, UsageCache},
    utils::{
        percentage::{seconds_percentage, Percentage},
        time::format_seconds,
    },
};

#[derive(Debug, PartialEq)]
pub struct AppShare {
    pub app_name: Arc<str>,
    pub platform: Platform,
    pub seconds: u64,
    pub share: Percentage,
}

/// Apps of a day ordered by usage, dropping the ones below `min_percentage` of the day.
pub fn analyze_apps(cache: &UsageCache, min_percentage: Percentage) -> Vec<AppShare> {
    let whole = cache.daily_stats.total_usage_seconds;
    let mut shares = cache
        .app_usage
        .iter()
        .map(|record| AppShare {
            app_name: record.app_name.clone(),
            platform: record.platform,
            seconds: record.total_usage_seconds,
            share: seconds_percentage(record.total_usage_seconds, whole),
        })
        .filter(|v| *v.share >= *min_percentage)
        .collect::<Vec<_>>();
    shares.sort_by(|a, b| {
        b.seconds
            .cmp(&a.seconds)
            .then_with(|| a.app_name.cmp(&b.app_name))
    });
    shares
}

pub fn day_lines(cache: &UsageCache, min_percentage: Percentage) -> Vec<String> {
    let mut lines = analyze_apps(cache, min_percentage)
        .into_iter()
        .map(|v| {
            format!(
                "{}%\t{}\t{}\t{}",
                *v.share as i32,
                format_seconds(v.seconds),
                v.platform,
                v.app_name
            )
        })
        .collect::<Vec<_>>();

    for platform in Platform::ALL {
        let stats = &cache.platform_stats.get(platform).stats;
        if stats.total_apps > 0 {
            lines.push(format!(
                "{platform}\t{} apps\t{}",
                stats.total_apps,
                format_seconds(stats.total_usage_seconds)
            ));
        }
    }
    lines
}

/// One line per day: date, total usage, amount of apps and the most used app.
pub fn history_line(snapshot: &DailySnapshot) -> String {
    let stats = &snapshot.usage.daily_stats;
    let top = snapshot
        .usage
        .app_usage
        .iter()
        .max_by_key(|v| v.total_usage_seconds)
        .map(|v| v.app_name.to_string())
        .unwrap_or_else(|| "-".into());
    format!(
        "{}\t{}\t{} apps\t{}",
        snapshot.date.format("%Y-%m-%d"),
        format_seconds(stats.total_usage_seconds),
        stats.total_apps,
        top
    )
}

pub fn print_day(date: NaiveDate, cache: &UsageCache, min_percentage: Percentage) {
    println!(
        "{}",
        Style::new().bold().paint(format!(
            "{} - {}",
            date.format("%Y-%m-%d"),
            format_seconds(cache.daily_stats.total_usage_seconds)
        ))
    );
    let lines = day_lines(cache, min_percentage);
    if lines.is_empty() {
        println!("No usage recorded");
    }
    for line in lines {
        println!("{line}");
    }
}

pub fn print_history(snapshots: &[DailySnapshot]) {
    if snapshots.is_empty() {
        println!("No usage recorded");
        return;
    }
    let total = snapshots
        .iter()
        .map(|v| v.usage.daily_stats.total_usage_seconds)
        .sum::<u64>();
    for snapshot in snapshots {
        println!("{}", history_line(snapshot));
    }
    println!(
        "{}",
        Style::new().bold().paint(format!(
            "{} days\t{}",
            snapshots.len(),
            format_seconds(total)
        ))
    );
}
