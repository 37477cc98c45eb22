//! Baseline Manager
//!
//! Owns the current daily baseline. The trigger is recomputed from the
//! wall clock every cycle: a snapshot is due when none exists, or when the
//! clock is inside the snapshot window and the baseline for the day that
//! window opened on has not been taken yet. Restarts and clock jumps therefore need no extra state.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::record::{self, DailyBaseline};
use super::window::SnapshotWindow;
use crate::config::BaselineConfig;
use crate::error::{Error, Result};
use crate::market::MarketSnapshot;
use crate::signal::change::percent_change;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineState {
    NoBaseline,
    Active,
}

pub struct BaselineManager {
    path: PathBuf,
    window: SnapshotWindow,
    offset: FixedOffset,
    current: Option<DailyBaseline>,
}

impl BaselineManager {
    pub fn new(config: &BaselineConfig) -> Result<Self> {
        let window = SnapshotWindow::parse(&config.window_start, &config.window_end)?;
        let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60).ok_or_else(|| {
            Error::Config(format!(
                "utc_offset_minutes out of range: {}",
                config.utc_offset_minutes
            ))
        })?;

        Ok(Self {
            path: PathBuf::from(&config.path),
            window,
            offset,
            current: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn window(&self) -> SnapshotWindow {
        self.window
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn state(&self) -> BaselineState {
        if self.current.is_some() {
            BaselineState::Active
        } else {
            BaselineState::NoBaseline
        }
    }

    pub fn current(&self) -> Option<&DailyBaseline> {
        self.current.as_ref()
    }

    /// Calendar day, in the configured offset, that a snapshot taken at
    /// `now` is recorded under. Inside a window that wraps midnight this is
    /// the date the window opened.
    pub fn baseline_date(&self, now: DateTime<Utc>) -> NaiveDate {
        self.window
            .opening_date(now.with_timezone(&self.offset).naive_local())
    }

    /// Load the durable record. Anything unreadable leaves `NoBaseline`.
    pub async fn recover(&mut self) -> BaselineState {
        match record::load(&self.path).await {
            Ok(Some(baseline)) => {
                info!(
                    "Daily baseline loaded: {} ({} tokens)",
                    baseline.date,
                    baseline.token_count()
                );
                self.current = Some(baseline);
            }
            Ok(None) => {
                info!(
                    "No daily baseline at {}; one will be created on the first cycle",
                    self.path.display()
                );
            }
            Err(e) => {
                warn!(
                    "Ignoring daily baseline at {}: {} (starting without one)",
                    self.path.display(),
                    e
                );
            }
        }
        self.state()
    }

    /// Whether a new snapshot should be taken this cycle
    pub fn should_snapshot(&self, now: DateTime<Utc>) -> bool {
        let Some(current) = &self.current else {
            return true;
        };

        let local = now.with_timezone(&self.offset);
        self.window.contains(local.time()) && current.date != self.baseline_date(now)
    }

    /// Capture every quote as the new baseline, persist it, then make it current.
    ///
    /// When the write fails the previous baseline stays current.
    pub async fn create_snapshot(
        &mut self,
        snapshot: &MarketSnapshot,
        now: DateTime<Utc>,
    ) -> Result<&DailyBaseline> {
        let mut prices = BTreeMap::new();
        let mut volumes = BTreeMap::new();
        for (symbol, quote) in &snapshot.quotes {
            prices.insert(symbol.clone(), quote.price);
            volumes.insert(symbol.clone(), quote.volume);
        }

        let baseline = DailyBaseline {
            date: self.baseline_date(now),
            created_at: now,
            prices,
            volumes,
            total_market_cap: snapshot.total_market_cap,
        };

        record::save(&self.path, &baseline).await?;

        info!(
            "Daily snapshot saved for {} at {} ({} tokens)",
            baseline.date,
            now.with_timezone(&self.offset).format("%H:%M:%S"),
            baseline.token_count()
        );

        let current: &DailyBaseline = self.current.insert(baseline);
        Ok(current)
    }

    /// Percent change of `price` against the baseline price for `symbol`
    pub fn daily_change(&self, symbol: &str, price: f64) -> Option<f64> {
        let base = self.current.as_ref()?.price(symbol)?;
        percent_change(base, price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Quote;
    use chrono::TimeZone;

    fn config(path: &Path) -> BaselineConfig {
        BaselineConfig {
            path: path.to_string_lossy().to_string(),
            window_start: "06:00".to_string(),
            window_end: "06:30".to_string(),
            utc_offset_minutes: 0,
            notify_on_snapshot: true,
        }
    }

    fn snapshot(btc: f64, eth: f64) -> MarketSnapshot {
        let mut quotes = BTreeMap::new();
        quotes.insert(
            "BTC".to_string(),
            Quote {
                price: btc,
                volume: 100.0,
                market_cap: Some(1e12),
            },
        );
        quotes.insert(
            "ETH".to_string(),
            Quote {
                price: eth,
                volume: 50.0,
                market_cap: None,
            },
        );
        MarketSnapshot::from_quotes(quotes)
    }

    fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn test_fires_without_baseline_outside_window() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BaselineManager::new(&config(&dir.path().join("b.json"))).unwrap();
        assert_eq!(manager.state(), BaselineState::NoBaseline);
        assert!(manager.should_snapshot(at(1, 14, 0)));
    }

    #[tokio::test]
    async fn test_once_per_day_then_next_day() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = BaselineManager::new(&config(&dir.path().join("b.json"))).unwrap();
        let mut created = 0;

        // Day 1 inside the window, evaluated on three consecutive cycles
        for minute in [0, 2, 4] {
            let now = at(1, 6, minute);
            if manager.should_snapshot(now) {
                manager.create_snapshot(&snapshot(100.0, 10.0), now).await.unwrap();
                created += 1;
            }
        }
        assert_eq!(created, 1);

        // Later the same day, outside the window
        assert!(!manager.should_snapshot(at(1, 18, 0)));

        // Day 2 before the window: nothing yet
        assert!(!manager.should_snapshot(at(2, 5, 59)));

        // Day 2 inside the window: exactly one
        for minute in [1, 3] {
            let now = at(2, 6, minute);
            if manager.should_snapshot(now) {
                manager.create_snapshot(&snapshot(120.0, 12.0), now).await.unwrap();
                created += 1;
            }
        }
        assert_eq!(created, 2);
        assert_eq!(
            manager.current().unwrap().date,
            NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()
        );

        // Right after creation the daily change is zero everywhere
        assert_eq!(manager.daily_change("BTC", 120.0), Some(0.0));
        assert_eq!(manager.daily_change("ETH", 12.0), Some(0.0));
    }

    #[tokio::test]
    async fn test_daily_change_absent_without_baseline_or_symbol() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = BaselineManager::new(&config(&dir.path().join("b.json"))).unwrap();
        assert_eq!(manager.daily_change("BTC", 1.0), None);

        manager
            .create_snapshot(&snapshot(100.0, 10.0), at(1, 6, 0))
            .await
            .unwrap();
        assert_eq!(manager.daily_change("DOGE", 1.0), None);
        let change = manager.daily_change("BTC", 110.0).unwrap();
        assert!((change - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_recover_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.json");

        let mut first = BaselineManager::new(&config(&path)).unwrap();
        first
            .create_snapshot(&snapshot(100.0, 10.0), at(1, 6, 5))
            .await
            .unwrap();

        let mut second = BaselineManager::new(&config(&path)).unwrap();
        assert_eq!(second.recover().await, BaselineState::Active);
        assert_eq!(second.current(), first.current());
        // Same day, still inside the window: no second snapshot
        assert!(!second.should_snapshot(at(1, 6, 20)));
    }

    #[tokio::test]
    async fn test_corrupt_record_is_no_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.json");
        tokio::fs::write(&path, r#"{"date":"2024-05-01","prices":{}}"#)
            .await
            .unwrap();

        let mut manager = BaselineManager::new(&config(&path)).unwrap();
        assert_eq!(manager.recover().await, BaselineState::NoBaseline);
        assert!(manager.should_snapshot(at(1, 12, 0)));
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_baseline() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should go makes the rename fail
        let path = dir.path().join("taken");
        std::fs::create_dir_all(path.join("inner")).unwrap();

        let mut manager = BaselineManager::new(&config(&path)).unwrap();
        let result = manager.create_snapshot(&snapshot(1.0, 1.0), at(1, 6, 0)).await;
        assert!(result.is_err());
        assert_eq!(manager.state(), BaselineState::NoBaseline);
    }

    #[tokio::test]
    async fn test_wrapping_window_fires_once_per_opening() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(&dir.path().join("b.json"));
        cfg.window_start = "23:50".to_string();
        cfg.window_end = "00:10".to_string();
        let mut manager = BaselineManager::new(&cfg).unwrap();

        manager
            .create_snapshot(&snapshot(100.0, 10.0), at(1, 23, 55))
            .await
            .unwrap();
        assert_eq!(
            manager.current().unwrap().date,
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
        );

        // Past midnight the same occurrence is still open
        assert!(!manager.should_snapshot(at(2, 0, 0)));
        assert!(!manager.should_snapshot(at(2, 0, 5)));
        assert!(!manager.should_snapshot(at(2, 12, 0)));

        // The next opening fires
        assert!(manager.should_snapshot(at(2, 23, 50)));
    }

    #[tokio::test]
    async fn test_wrapping_window_snapshot_after_midnight_counts_for_opening_day() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(&dir.path().join("b.json"));
        cfg.window_start = "23:50".to_string();
        cfg.window_end = "00:10".to_string();
        let mut manager = BaselineManager::new(&cfg).unwrap();

        manager
            .create_snapshot(&snapshot(100.0, 10.0), at(2, 0, 3))
            .await
            .unwrap();
        assert_eq!(
            manager.current().unwrap().date,
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
        );
        assert!(!manager.should_snapshot(at(2, 0, 8)));
        assert!(manager.should_snapshot(at(2, 23, 51)));
    }

    #[test]
    fn test_offset_shifts_calendar_day() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(&dir.path().join("b.json"));
        cfg.utc_offset_minutes = 210; // +03:30
        let manager = BaselineManager::new(&cfg).unwrap();

        // 22:00 UTC on May 1st is 01:30 on May 2nd locally
        assert_eq!(
            manager.baseline_date(at(1, 22, 0)),
            NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()
        );
    }
}
