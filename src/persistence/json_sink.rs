use std::{collections::BTreeMap, path::PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    error::TrackerError,
    storage::json_store::{JsonStore, StoreError},
    utils::time::date_to_record_name,
};

use super::{DailyMetricsRecord, HourlyActivityRecord, MetricsSink};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsDocument {
    #[serde(default)]
    pub daily: BTreeMap<String, DailyMetricsRecord>,
    #[serde(default)]
    pub hourly: BTreeMap<String, HourlyActivityRecord>,
}

/// Keeps metrics in one JSON document keyed by `user|date` and `user|date|hour`.
#[derive(Debug, Clone)]
pub struct JsonMetricsSink {
    store: JsonStore<MetricsDocument>,
}

impl JsonMetricsSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonStore::new(path),
        }
    }

    pub async fn load(&self) -> Result<MetricsDocument, TrackerError> {
        self.store.load().await.map_err(sink_error)
    }
}

fn daily_key(record: &DailyMetricsRecord) -> String {
    format!("{}|{}", record.user_id, date_to_record_name(record.date))
}

fn hourly_key(record: &HourlyActivityRecord) -> String {
    format!(
        "{}|{}|{:02}",
        record.user_id,
        date_to_record_name(record.date),
        record.hour
    )
}

fn sink_error(error: StoreError) -> TrackerError {
    TrackerError::source_unavailable("metrics store", error)
}

impl MetricsSink for JsonMetricsSink {
    #[instrument(skip_all, fields(user = %record.user_id, date = %record.date))]
    async fn upsert_daily(&self, record: DailyMetricsRecord) -> Result<(), TrackerError> {
        self.store
            .update(|document| -> Result<(), StoreError> {
                document.daily.insert(daily_key(&record), record);
                Ok(())
            })
            .await
            .map_err(sink_error)?;
        debug!("Saved daily metrics");
        Ok(())
    }

    async fn upsert_hourly(&self, records: Vec<HourlyActivityRecord>) -> Result<(), TrackerError> {
        let count = records.len();
        self.store
            .update(|document| -> Result<(), StoreError> {
                document
                    .hourly
                    .extend(records.into_iter().map(|r| (hourly_key(&r), r)));
                Ok(())
            })
            .await
            .map_err(sink_error)?;
        debug!("Saved {count} hourly records");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{NaiveDate, NaiveTime};
    use tempfile::tempdir;

    use crate::persistence::{DailyMetricsRecord, HourlyActivityRecord, MetricsSink};

    use super::JsonMetricsSink;

    fn daily(user: &str, total_hours: f64) -> DailyMetricsRecord {
        DailyMetricsRecord {
            user_id: user.into(),
            date: NaiveDate::from_ymd_opt(2025, 3, 4).unwrap(),
            work_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            work_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            lunch_start: None,
            lunch_end: None,
            total_hours,
            productive_hours: total_hours,
            dead_time_percent: 0.,
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_key() -> Result<()> {
        let dir = tempdir()?;
        let sink = JsonMetricsSink::new(dir.path().join("metrics.json"));

        sink.upsert_daily(daily("dev", 6.)).await?;
        sink.upsert_daily(daily("dev", 7.)).await?;
        sink.upsert_daily(daily("other", 1.)).await?;

        let hourly = |hour, commit_count| HourlyActivityRecord {
            user_id: "dev".into(),
            date: NaiveDate::from_ymd_opt(2025, 3, 4).unwrap(),
            hour,
            commit_count,
            activity_level: commit_count,
        };
        sink.upsert_hourly(vec![hourly(9, 1), hourly(10, 2)]).await?;
        sink.upsert_hourly(vec![hourly(10, 5)]).await?;

        let document = sink.load().await?;
        assert_eq!(document.daily.len(), 2);
        assert_eq!(document.daily["dev|2025-03-04"].total_hours, 7.);
        assert_eq!(document.hourly.len(), 2);
        assert_eq!(document.hourly["dev|2025-03-04|10"].commit_count, 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_cloned_sink_writes_same_document() -> Result<()> {
        let dir = tempdir()?;
        let sink = JsonMetricsSink::new(dir.path().join("metrics.json"));
        let cloned = sink.clone();

        cloned.upsert_daily(daily("dev", 6.)).await?;
        sink.upsert_daily(daily("other", 2.)).await?;

        let document = sink.load().await?;
        let snapshot = document.clone();
        assert_eq!(snapshot.daily.len(), 2);
        assert_eq!(cloned.load().await?.daily.len(), 2);
        assert_eq!(snapshot.daily["dev|2025-03-04"].total_hours, 6.);
        Ok(())
    }
}
