//! Shared signal types

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named sliding window over which percent change is measured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeframe {
    pub name: String,
    pub duration_secs: u64,
}

impl Timeframe {
    pub fn new(name: impl Into<String>, duration_secs: u64) -> Self {
        Self {
            name: name.into(),
            duration_secs,
        }
    }

    pub fn duration(&self) -> TimeDelta {
        crate::config::bounded_secs(self.duration_secs)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Direction of a qualifying move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Pump,
    Dump,
}

impl Direction {
    /// Positive change is a pump, anything else a dump
    pub fn from_change(price_change_pct: f64) -> Self {
        if price_change_pct > 0.0 {
            Direction::Pump
        } else {
            Direction::Dump
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Pump => f.write_str("PUMP"),
            Direction::Dump => f.write_str("DUMP"),
        }
    }
}

/// A qualifying move, ready to be formatted and dispatched
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub symbol: String,
    pub timeframe: String,
    pub direction: Direction,
    pub price_change_pct: f64,
    pub volume_change_pct: Option<f64>,
    /// Latest observed price
    pub price: f64,
    /// Latest observed 24h volume
    pub volume: f64,
    pub market_cap: Option<f64>,
    /// Change since the daily baseline, when one exists
    pub daily_change_pct: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_from_change() {
        assert_eq!(Direction::from_change(5.0), Direction::Pump);
        assert_eq!(Direction::from_change(-5.0), Direction::Dump);
        assert_eq!(Direction::from_change(0.0), Direction::Dump);
    }

    #[test]
    fn test_timeframe_deserialize() {
        let tf: Timeframe = serde_json::from_str(r#"{"name":"5min","duration_secs":300}"#).unwrap();
        assert_eq!(tf, Timeframe::new("5min", 300));
        assert_eq!(tf.duration(), TimeDelta::seconds(300));
        assert_eq!(tf.to_string(), "5min");
    }
}
