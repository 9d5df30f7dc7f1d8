//! Dashboard reductions: the history window and the latest/average summary.

use crate::errors::StoreError;
use crate::model::{Averages, Column, Record};
use crate::storage::Store;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

pub const HISTORY_WINDOW_DAYS: i64 = 28;

pub const SUMMARY_COLUMNS: [Column; 5] = [
    Column::ResultId,
    Column::Timestamp,
    Column::DownloadBandwidth,
    Column::UploadBandwidth,
    Column::PingLatency,
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub latest: Latest,
    pub averages: AverageRates,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Latest {
    pub download: String,
    pub upload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AverageRates {
    pub download: String,
    pub upload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping: Option<String>,
}

/// `[now - days, now]`, saturating at the earliest representable instant.
pub fn window(now: DateTime<Utc>, days: i64) -> (DateTime<Utc>, DateTime<Utc>) {
    let begin = Duration::try_days(days)
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    (begin, now)
}

/// Records from the last `days` days, oldest first. `columns` narrows the
/// projection as in [`Store::records_in_range`].
pub fn history(
    store: &Store,
    now: DateTime<Utc>,
    days: i64,
    columns: Option<&[Column]>,
) -> Result<Vec<Record>, StoreError> {
    let (begin, end) = window(now, days);
    store.records_in_range(begin, end, columns)
}

/// Latest reading in the default window plus whole-history averages.
/// `None` when the window holds no records.
pub fn summary(store: &Store, now: DateTime<Utc>) -> Result<Option<Summary>, StoreError> {
    let (begin, end) = window(now, HISTORY_WINDOW_DAYS);
    let rows = store.records_in_range(begin, end, Some(&SUMMARY_COLUMNS))?;
    let Some(latest) = rows.last() else {
        return Ok(None);
    };
    let averages = store.averages()?;
    Ok(Some(build_summary(latest, &averages)))
}

pub fn build_summary(latest: &Record, averages: &Averages) -> Summary {
    Summary {
        latest: Latest {
            download: megabits(latest.download_bandwidth().map(|v| v as f64)),
            upload: megabits(latest.upload_bandwidth().map(|v| v as f64)),
            ping: latest.ping_latency().map(|p| format!("{p:.2}")),
            ts: latest.timestamp().map(String::from),
        },
        averages: AverageRates {
            download: megabits(averages.download),
            upload: megabits(averages.upload),
            ping: averages.ping.map(|p| format!("{p:.2}")),
        },
    }
}

/// Bytes per second to megabits per second.
pub fn bytes_to_megabits(bytes_per_sec: f64) -> f64 {
    bytes_per_sec * 8.0 / 1_000_000.0
}

fn megabits(bytes_per_sec: Option<f64>) -> String {
    format!("{:.2}", bytes_to_megabits(bytes_per_sec.unwrap_or(0.0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{format_timestamp, Value};
    use chrono::TimeZone;

    fn insert(store: &Store, id: &str, ts: DateTime<Utc>, down: i64, up: i64, ping: f64) {
        let mut r = Record::new();
        r.set(Column::ResultId, Value::Text(id.into()));
        r.set(Column::Timestamp, Value::Text(format_timestamp(ts)));
        r.set(Column::DownloadBandwidth, Value::Integer(down));
        r.set(Column::UploadBandwidth, Value::Integer(up));
        r.set(Column::PingLatency, Value::Real(ping));
        store.insert_record(&r).unwrap();
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 30, 12, 0, 0).unwrap()
    }

    fn store() -> Store {
        let s = Store::memory().unwrap();
        s.init_schema().unwrap();
        s
    }

    #[test]
    fn test_bytes_to_megabits() {
        assert_eq!(bytes_to_megabits(125_000.0), 1.0);
        assert_eq!(megabits(Some(1_000_000.0)), "8.00");
        assert_eq!(megabits(None), "0.00");
    }

    #[test]
    fn test_huge_window_does_not_overflow() {
        let (begin, end) = window(now(), i64::MAX);
        assert_eq!(begin, DateTime::<Utc>::MIN_UTC);
        assert_eq!(end, now());
    }

    #[test]
    fn test_empty_store_has_no_summary() -> anyhow::Result<()> {
        assert_eq!(summary(&store(), now())?, None);
        assert!(history(&store(), now(), HISTORY_WINDOW_DAYS, None)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_history_only_covers_window() -> anyhow::Result<()> {
        let s = store();
        insert(&s, "old", now() - Duration::days(29), 1, 1, 1.0);
        insert(&s, "recent", now() - Duration::days(2), 1, 1, 1.0);
        insert(&s, "future", now() + Duration::hours(1), 1, 1, 1.0);

        let ids: Vec<String> = history(&s, now(), HISTORY_WINDOW_DAYS, Some(&[Column::ResultId]))?
            .iter()
            .filter_map(|r| r.result_id().map(String::from))
            .collect();
        assert_eq!(ids, vec!["recent".to_string()]);
        Ok(())
    }

    #[test]
    fn test_summary_reports_latest_and_averages() -> anyhow::Result<()> {
        let s = store();
        insert(&s, "b", now() - Duration::hours(1), 2_000_000, 250_000, 20.0);
        insert(&s, "a", now() - Duration::hours(2), 1_000_000, 125_000, 10.0);
        insert(&s, "old", now() - Duration::days(40), 3_000_000, 500_000, 30.0);

        let sum = summary(&s, now())?.expect("summary");
        assert_eq!(sum.latest.download, "16.00");
        assert_eq!(sum.latest.upload, "2.00");
        assert_eq!(sum.latest.ping.as_deref(), Some("20.00"));
        assert_eq!(
            sum.latest.ts,
            Some(format_timestamp(now() - Duration::hours(1)))
        );

        // averages span the whole history, not the window
        assert_eq!(sum.averages.download, "16.00");
        assert_eq!(sum.averages.upload, "2.33");
        assert_eq!(sum.averages.ping.as_deref(), Some("20.00"));
        Ok(())
    }
}
