use chrono::{DateTime, Local, NaiveDate, Utc};

const SNAPSHOT_EXTENSION: &str = "json";

/// This is the standard way of converting a date to a snapshot file name.
pub fn date_to_snapshot_name(date: NaiveDate) -> String {
    format!("{}.{SNAPSHOT_EXTENSION}", date.format("%Y-%m-%d"))
}

/// Inverse of [date_to_snapshot_name]. Files that aren't named after a date yield `None`.
pub fn snapshot_name_to_date(file_name: &str) -> Option<NaiveDate> {
    let stem = file_name.strip_suffix(SNAPSHOT_EXTENSION)?.strip_suffix('.')?;
    NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
}

/// Wall clock time shown in status messages.
pub fn clock_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%H:%M:%S").to_string()
}

pub fn format_seconds(seconds: u64) -> String {
    let (hours, minutes, seconds) = (seconds / 3600, seconds / 60 % 60, seconds % 60);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn test_snapshot_names() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 9).unwrap();
        assert_eq!(date_to_snapshot_name(date), "2024-01-09.json");
        assert_eq!(snapshot_name_to_date("2024-01-09.json"), Some(date));
        assert_eq!(snapshot_name_to_date("meta.json"), None);
        assert_eq!(snapshot_name_to_date("2024-01-09.json.tmp"), None);
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(5), "5s");
        assert_eq!(format_seconds(65), "1m5s");
        assert_eq!(format_seconds(3723), "1h2m3s");
    }
}
