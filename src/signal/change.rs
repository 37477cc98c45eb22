//! Change Calculator
//!
//! Measures the relative price and volume move of a symbol over a
//! timeframe by pairing the latest sample with the sample closest to
//! `now - duration`. The reference sample must sit within a tolerance of
//! `min(duration / 2, 2 * poll_interval)` of that instant.

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

use crate::history::{HistoryStore, Sample};

/// Percent change between a reference sample and the latest one
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChangeResult {
    pub price_change_pct: f64,
    /// Absent when the reference volume is zero
    pub volume_change_pct: Option<f64>,
    pub current: Sample,
    pub reference: Sample,
}

/// No signal for this (symbol, timeframe) right now
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum InsufficientData {
    #[error("only {0} sample(s) recorded")]
    TooFewSamples(usize),
    #[error("no sample within {tolerance_secs}s of the reference instant")]
    NoReferenceSample { tolerance_secs: i64 },
    #[error("reference price is zero")]
    ZeroReferencePrice,
}

#[derive(Debug, Clone, Copy)]
pub struct ChangeCalculator {
    poll_interval: TimeDelta,
}

impl ChangeCalculator {
    pub fn new(poll_interval: TimeDelta) -> Self {
        Self { poll_interval }
    }

    /// Maximum distance allowed between the target instant and the reference sample
    pub fn tolerance(&self, duration: TimeDelta) -> TimeDelta {
        std::cmp::min(duration / 2, self.poll_interval * 2)
    }

    pub fn compute(
        &self,
        history: &HistoryStore,
        symbol: &str,
        duration: TimeDelta,
        now: DateTime<Utc>,
    ) -> Result<ChangeResult, InsufficientData> {
        let count = history.len(symbol);
        if count < 2 {
            return Err(InsufficientData::TooFewSamples(count));
        }

        let current = history
            .latest(symbol)
            .ok_or(InsufficientData::TooFewSamples(0))?;

        let target = now - duration;
        let tolerance = self.tolerance(duration);
        let no_reference = InsufficientData::NoReferenceSample {
            tolerance_secs: tolerance.num_seconds(),
        };

        let reference = history.nearest(symbol, target).ok_or(no_reference)?;
        if (reference.timestamp - target).num_milliseconds().abs() > tolerance.num_milliseconds() {
            return Err(no_reference);
        }

        let price_change_pct = percent_change(reference.price, current.price)
            .ok_or(InsufficientData::ZeroReferencePrice)?;
        let volume_change_pct = percent_change(reference.volume, current.volume);

        Ok(ChangeResult {
            price_change_pct,
            volume_change_pct,
            current,
            reference,
        })
    }
}

/// `(new - old) / old * 100`, or `None` when `old` is not positive
pub fn percent_change(old: f64, new: f64) -> Option<f64> {
    if old > 0.0 {
        Some((new - old) / old * 100.0)
    } else {
        None
    }
}
