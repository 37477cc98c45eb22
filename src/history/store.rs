//! History Store - per-symbol rolling series
//!
//! Every series is sorted by timestamp with no duplicates. Retention is
//! enforced on each insert relative to the newest sample of that series,
//! and across all series with [`HistoryStore::prune`].

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;
use tracing::debug;

/// One timestamped price/volume observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub price: f64,
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
}

impl Sample {
    pub fn new(price: f64, volume: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            price,
            volume,
            timestamp,
        }
    }

    /// Reject non-positive prices, negative volumes and non-finite values
    pub fn validate(&self) -> Result<(), InvalidSample> {
        if !self.price.is_finite() || self.price <= 0.0 {
            return Err(InvalidSample::Price(self.price));
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(InvalidSample::Volume(self.volume));
        }
        Ok(())
    }
}

/// Why a sample was refused
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum InvalidSample {
    #[error("price must be positive, got {0}")]
    Price(f64),
    #[error("volume must be non-negative, got {0}")]
    Volume(f64),
}

/// Bounded time series for every tracked symbol
#[derive(Debug, Clone)]
pub struct HistoryStore {
    series: HashMap<String, VecDeque<Sample>>,
    retention: TimeDelta,
}

impl HistoryStore {
    /// Create a store that keeps samples no older than `retention`
    pub fn new(retention: TimeDelta) -> Self {
        Self {
            series: HashMap::new(),
            retention,
        }
    }

    pub fn retention(&self) -> TimeDelta {
        self.retention
    }

    /// Insert a sample in timestamp order, then evict expired entries.
    ///
    /// A sample carrying a timestamp already present replaces the old one.
    pub fn append(&mut self, symbol: &str, sample: Sample) -> Result<(), InvalidSample> {
        sample.validate()?;

        let series = self.series.entry(symbol.to_string()).or_default();

        match series.back() {
            Some(last) if last.timestamp < sample.timestamp => series.push_back(sample),
            None => series.push_back(sample),
            Some(_) => {
                let idx = series.partition_point(|s| s.timestamp < sample.timestamp);
                if series.get(idx).map(|s| s.timestamp) == Some(sample.timestamp) {
                    series[idx] = sample;
                } else {
                    series.insert(idx, sample);
                }
            }
        }

        let newest = series.back().map(|s| s.timestamp).unwrap_or(sample.timestamp);
        let evicted = evict_before(series, newest - self.retention);
        if evicted > 0 {
            debug!(symbol = %symbol, evicted, "Evicted expired samples");
        }

        Ok(())
    }

    /// Sample closest to `target`; on a tie the earlier one wins
    pub fn nearest(&self, symbol: &str, target: DateTime<Utc>) -> Option<Sample> {
        let series = self.series.get(symbol)?;
        if series.is_empty() {
            return None;
        }

        // First index at or after the target; the answer is it or its predecessor.
        let idx = series.partition_point(|s| s.timestamp < target);
        let after = series.get(idx);
        let before = idx.checked_sub(1).and_then(|i| series.get(i));

        match (before, after) {
            (Some(b), Some(a)) => {
                let db = distance_ms(b.timestamp, target);
                let da = distance_ms(a.timestamp, target);
                Some(if db <= da { *b } else { *a })
            }
            (Some(b), None) => Some(*b),
            (None, Some(a)) => Some(*a),
            (None, None) => None,
        }
    }

    /// Most recent sample for a symbol
    pub fn latest(&self, symbol: &str) -> Option<Sample> {
        self.series.get(symbol).and_then(|s| s.back().copied())
    }

    /// Number of retained samples for a symbol
    pub fn len(&self, symbol: &str) -> usize {
        self.series.get(symbol).map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.series.values().all(|s| s.is_empty())
    }

    /// Symbols with at least one sample
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .series
            .iter()
            .filter(|(_, s)| !s.is_empty())
            .map(|(k, _)| k.clone())
            .collect();
        symbols.sort();
        symbols
    }

    /// Evict samples older than `now - retention` from every series.
    ///
    /// Returns the number of samples removed. Series left empty are dropped.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.retention;
        let mut removed = 0;
        for series in self.series.values_mut() {
            removed += evict_before(series, cutoff);
        }
        self.series.retain(|_, s| !s.is_empty());
        removed
    }
}

fn evict_before(series: &mut VecDeque<Sample>, cutoff: DateTime<Utc>) -> usize {
    let mut removed = 0;
    while let Some(front) = series.front() {
        if front.timestamp < cutoff {
            series.pop_front();
            removed += 1;
        } else {
            break;
        }
    }
    removed
}

fn distance_ms(a: DateTime<Utc>, b: DateTime<Utc>) -> i64 {
    (a - b).num_milliseconds().abs()
}
