//! Durable daily baseline record
//!
//! On disk the baseline is a small JSON document:
//!
//! ```json
//! {
//!   "date": "2024-05-01",
//!   "timestamp": 1714543200.0,
//!   "prices": { "BTC": 60000.0 },
//!   "volumes": { "BTC": 3.1e10 },
//!   "total_market_cap": 1.2e12
//! }
//! ```
//!
//! Every field is required. Writes go through a temp file and a rename so a
//! crash never leaves a half-written record behind.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};

/// The once-a-day reference snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct DailyBaseline {
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub prices: BTreeMap<String, f64>,
    pub volumes: BTreeMap<String, f64>,
    pub total_market_cap: f64,
}

impl DailyBaseline {
    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.prices.get(symbol).copied()
    }

    pub fn token_count(&self) -> usize {
        self.prices.len()
    }
}

/// Wire form of [`DailyBaseline`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineRecord {
    pub date: NaiveDate,
    /// Creation time in epoch seconds
    pub timestamp: f64,
    pub prices: BTreeMap<String, f64>,
    pub volumes: BTreeMap<String, f64>,
    #[serde(alias = "totalMarketCap")]
    pub total_market_cap: f64,
}

impl From<&DailyBaseline> for BaselineRecord {
    fn from(baseline: &DailyBaseline) -> Self {
        Self {
            date: baseline.date,
            timestamp: baseline.created_at.timestamp_millis() as f64 / 1000.0,
            prices: baseline.prices.clone(),
            volumes: baseline.volumes.clone(),
            total_market_cap: baseline.total_market_cap,
        }
    }
}

impl TryFrom<BaselineRecord> for DailyBaseline {
    type Error = Error;

    fn try_from(record: BaselineRecord) -> Result<Self> {
        if !record.timestamp.is_finite() || record.timestamp < 0.0 {
            return Err(Error::BaselineCorrupt(format!(
                "invalid timestamp {}",
                record.timestamp
            )));
        }
        let created_at = DateTime::from_timestamp_millis((record.timestamp * 1000.0) as i64)
            .ok_or_else(|| {
                Error::BaselineCorrupt(format!("timestamp {} out of range", record.timestamp))
            })?;

        for (field, map) in [("prices", &record.prices), ("volumes", &record.volumes)] {
            if let Some((symbol, value)) = map.iter().find(|(_, v)| !v.is_finite()) {
                return Err(Error::BaselineCorrupt(format!(
                    "{}.{} is not a number ({})",
                    field, symbol, value
                )));
            }
        }

        if !record.total_market_cap.is_finite() {
            return Err(Error::BaselineCorrupt("total_market_cap is not a number".into()));
        }

        Ok(Self {
            date: record.date,
            created_at,
            prices: record.prices,
            volumes: record.volumes,
            total_market_cap: record.total_market_cap,
        })
    }
}

/// Parse and validate a record
pub fn parse(data: &str) -> Result<DailyBaseline> {
    let record: BaselineRecord =
        serde_json::from_str(data).map_err(|e| Error::BaselineCorrupt(e.to_string()))?;
    DailyBaseline::try_from(record)
}

/// Load the record at `path`; `Ok(None)` when no file exists
pub async fn load(path: &Path) -> Result<Option<DailyBaseline>> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Ok(None);
    }

    let data = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::BaselinePersistence(e.to_string()))?;

    parse(&data).map(Some)
}

/// Write the record atomically (temp file + rename)
pub async fn save(path: &Path, baseline: &DailyBaseline) -> Result<()> {
    let data = serde_json::to_string_pretty(&BaselineRecord::from(baseline))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::BaselinePersistence(e.to_string()))?;
    }

    let tmp = temp_path(path);
    tokio::fs::write(&tmp, data)
        .await
        .map_err(|e| Error::BaselinePersistence(e.to_string()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::BaselinePersistence(e.to_string()))?;

    debug!("Saved baseline for {} to {}", baseline.date, path.display());
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "baseline".into());
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn baseline() -> DailyBaseline {
        let mut prices = BTreeMap::new();
        prices.insert("BTC".to_string(), 60_000.0);
        prices.insert("PEPE".to_string(), 0.000_012_34);
        let mut volumes = BTreeMap::new();
        volumes.insert("BTC".to_string(), 3.1e10);
        volumes.insert("PEPE".to_string(), 0.0);

        DailyBaseline {
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 6, 2, 0).unwrap(),
            prices,
            volumes,
            total_market_cap: 1.3e12,
        }
    }

    #[tokio::test]
    async fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daily_prices.json");

        save(&path, &baseline()).await.unwrap();
        let loaded = load(&path).await.unwrap().unwrap();

        assert_eq!(loaded.prices, baseline().prices);
        assert_eq!(loaded.volumes, baseline().volumes);
        assert_eq!(loaded.date, baseline().date);
        assert_eq!(loaded.created_at, baseline().created_at);
        assert!(!temp_path(&path).exists());
    }

    #[tokio::test]
    async fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load(&dir.path().join("absent.json")).await.unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_missing_field_is_corrupt() {
        let data = r#"{"date":"2024-05-01","timestamp":1714543200.0,"prices":{},"volumes":{}}"#;
        assert!(matches!(parse(data), Err(Error::BaselineCorrupt(_))));

        let data = r#"{"timestamp":1714543200.0,"prices":{},"volumes":{},"total_market_cap":0}"#;
        assert!(matches!(parse(data), Err(Error::BaselineCorrupt(_))));
    }

    #[test]
    fn test_wrong_types_are_corrupt() {
        let data = r#"{"date":"yesterday","timestamp":1714543200.0,"prices":{},"volumes":{},"total_market_cap":0}"#;
        assert!(matches!(parse(data), Err(Error::BaselineCorrupt(_))));

        let data = r#"{"date":"2024-05-01","timestamp":"now","prices":{},"volumes":{},"total_market_cap":0}"#;
        assert!(matches!(parse(data), Err(Error::BaselineCorrupt(_))));

        let data = r#"{"date":"2024-05-01","timestamp":1714543200.0,"prices":{"BTC":"high"},"volumes":{},"total_market_cap":0}"#;
        assert!(matches!(parse(data), Err(Error::BaselineCorrupt(_))));

        assert!(matches!(parse("not json"), Err(Error::BaselineCorrupt(_))));
    }

    #[test]
    fn test_camel_case_total_accepted() {
        let data = r#"{"date":"2024-05-01","timestamp":1714543200.5,"prices":{"BTC":1.0},"volumes":{"BTC":2.0},"totalMarketCap":9.0}"#;
        let baseline = parse(data).unwrap();
        assert_eq!(baseline.total_market_cap, 9.0);
        assert_eq!(baseline.created_at.timestamp_millis(), 1_714_543_200_500);
    }
}
