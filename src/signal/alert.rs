//! Alert Decision Engine
//!
//! Turns a measured change into an [`AlertEvent`] when it crosses the
//! configured threshold and the (symbol, timeframe) pair is not cooling
//! down. The cooldown is only stamped through [`AlertEngine::record_delivery`],
//! so a move whose delivery failed everywhere alerts again next cycle.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use tracing::debug;

use super::change::{ChangeResult, InsufficientData};
use super::types::{AlertEvent, Direction, Timeframe};
use crate::config::{bounded_secs, AlertsConfig};

/// Cooldown records older than this are dropped regardless of timeframe
pub const COOLDOWN_EXPIRY_SECS: i64 = 24 * 60 * 60;

/// Extra per-symbol context attached to an alert
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertContext {
    pub market_cap: Option<f64>,
    pub daily_change_pct: Option<f64>,
}

/// Why a change did not produce an alert
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    NoSignal,
    BelowThreshold,
    VolumeUnconfirmed,
    CoolingDown { remaining_secs: i64 },
    DumpMuted,
}

pub struct AlertEngine {
    price_threshold_pct: f64,
    volume_threshold_pct: f64,
    require_volume_confirmation: bool,
    pumps_only: bool,
    cooldown: TimeDelta,
    /// (symbol, timeframe name) -> last successful alert
    last_alert: HashMap<(String, String), DateTime<Utc>>,
}

impl AlertEngine {
    pub fn new(config: &AlertsConfig) -> Self {
        Self {
            price_threshold_pct: config.price_change_threshold_pct,
            volume_threshold_pct: config.volume_change_threshold_pct,
            require_volume_confirmation: config.require_volume_confirmation,
            pumps_only: config.pumps_only,
            cooldown: bounded_secs(config.cooldown_secs),
            last_alert: HashMap::new(),
        }
    }

    /// Decide whether a change qualifies as an alert
    pub fn evaluate(
        &mut self,
        symbol: &str,
        timeframe: &Timeframe,
        change: &Result<ChangeResult, InsufficientData>,
        context: AlertContext,
        now: DateTime<Utc>,
    ) -> Result<AlertEvent, Verdict> {
        self.purge_expired(now);

        let change = match change {
            Ok(change) => change,
            Err(_) => return Err(Verdict::NoSignal),
        };

        if change.price_change_pct.abs() < self.price_threshold_pct {
            return Err(Verdict::BelowThreshold);
        }

        if self.require_volume_confirmation {
            let confirmed = change
                .volume_change_pct
                .map(|v| v.abs() >= self.volume_threshold_pct)
                .unwrap_or(false);
            if !confirmed {
                return Err(Verdict::VolumeUnconfirmed);
            }
        }

        if let Some(remaining) = self.cooldown_remaining(symbol, &timeframe.name, now) {
            debug!(
                symbol = %symbol,
                timeframe = %timeframe,
                remaining_secs = remaining.num_seconds(),
                "Alert suppressed by cooldown"
            );
            return Err(Verdict::CoolingDown {
                remaining_secs: remaining.num_seconds(),
            });
        }

        let direction = Direction::from_change(change.price_change_pct);
        if self.pumps_only && direction == Direction::Dump {
            return Err(Verdict::DumpMuted);
        }

        Ok(AlertEvent {
            symbol: symbol.to_string(),
            timeframe: timeframe.name.clone(),
            direction,
            price_change_pct: change.price_change_pct,
            volume_change_pct: change.volume_change_pct,
            price: change.current.price,
            volume: change.current.volume,
            market_cap: context.market_cap,
            daily_change_pct: context.daily_change_pct,
        })
    }

    /// Stamp the cooldown after at least one channel accepted the alert
    pub fn record_delivery(&mut self, event: &AlertEvent, now: DateTime<Utc>) {
        self.last_alert
            .insert((event.symbol.clone(), event.timeframe.clone()), now);
    }

    /// Time left before the pair may alert again, if still cooling down
    pub fn cooldown_remaining(
        &self,
        symbol: &str,
        timeframe: &str,
        now: DateTime<Utc>,
    ) -> Option<TimeDelta> {
        let last = self
            .last_alert
            .get(&(symbol.to_string(), timeframe.to_string()))?;
        let elapsed = now - *last;
        if elapsed < self.cooldown {
            Some(self.cooldown - elapsed)
        } else {
            None
        }
    }

    pub fn cooldown_count(&self) -> usize {
        self.last_alert.len()
    }

    fn purge_expired(&mut self, now: DateTime<Utc>) {
        self.last_alert
            .retain(|_, last| (now - *last).num_seconds() < COOLDOWN_EXPIRY_SECS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Sample;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn config() -> AlertsConfig {
        AlertsConfig {
            price_change_threshold_pct: 5.0,
            volume_change_threshold_pct: 5.0,
            require_volume_confirmation: false,
            pumps_only: false,
            cooldown_secs: 300,
        }
    }

    fn change(pct: f64, at: DateTime<Utc>) -> Result<ChangeResult, InsufficientData> {
        Ok(ChangeResult {
            price_change_pct: pct,
            volume_change_pct: Some(1.0),
            current: Sample::new(100.0 + pct, 10.0, at),
            reference: Sample::new(100.0, 10.0, at - TimeDelta::seconds(300)),
        })
    }

    fn tf() -> Timeframe {
        Timeframe::new("5min", 300)
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        let mut engine = AlertEngine::new(&config());
        let ctx = AlertContext::default();

        assert!(engine.evaluate("BTC", &tf(), &change(5.0, t(0)), ctx, t(0)).is_ok());
        assert!(engine.evaluate("ETH", &tf(), &change(-5.0, t(0)), ctx, t(0)).is_ok());
        assert_eq!(
            engine.evaluate("SOL", &tf(), &change(4.99, t(0)), ctx, t(0)),
            Err(Verdict::BelowThreshold)
        );
    }

    #[test]
    fn test_insufficient_data_is_no_signal() {
        let mut engine = AlertEngine::new(&config());
        let verdict = engine.evaluate(
            "BTC",
            &tf(),
            &Err(InsufficientData::TooFewSamples(1)),
            AlertContext::default(),
            t(0),
        );
        assert_eq!(verdict, Err(Verdict::NoSignal));
    }

    #[test]
    fn test_cooldown_suppresses_then_releases() {
        let mut engine = AlertEngine::new(&config());
        let ctx = AlertContext::default();
        let mut dispatched = 0;

        for at in [0, 100, 301] {
            if let Ok(event) = engine.evaluate("BTC", &tf(), &change(6.0, t(at)), ctx, t(at)) {
                dispatched += 1;
                engine.record_delivery(&event, t(at));
            }
        }

        assert_eq!(dispatched, 2);
    }

    #[test]
    fn test_failed_delivery_leaves_pair_eligible() {
        let mut engine = AlertEngine::new(&config());
        let ctx = AlertContext::default();

        // Delivery never recorded
        assert!(engine.evaluate("BTC", &tf(), &change(6.0, t(0)), ctx, t(0)).is_ok());
        assert!(engine.evaluate("BTC", &tf(), &change(6.0, t(120)), ctx, t(120)).is_ok());
        assert_eq!(engine.cooldown_count(), 0);
    }

    #[test]
    fn test_cooldown_is_per_timeframe() {
        let mut engine = AlertEngine::new(&config());
        let ctx = AlertContext::default();

        let event = engine
            .evaluate("BTC", &tf(), &change(6.0, t(0)), ctx, t(0))
            .unwrap();
        engine.record_delivery(&event, t(0));

        let other = Timeframe::new("15min", 900);
        assert!(engine.evaluate("BTC", &other, &change(6.0, t(10)), ctx, t(10)).is_ok());
        assert!(matches!(
            engine.evaluate("BTC", &tf(), &change(6.0, t(10)), ctx, t(10)),
            Err(Verdict::CoolingDown { remaining_secs: 290 })
        ));
    }

    #[test]
    fn test_expired_cooldowns_are_purged() {
        let mut engine = AlertEngine::new(&config());
        let event = engine
            .evaluate("BTC", &tf(), &change(6.0, t(0)), AlertContext::default(), t(0))
            .unwrap();
        engine.record_delivery(&event, t(0));
        assert_eq!(engine.cooldown_count(), 1);

        let later = t(COOLDOWN_EXPIRY_SECS + 1);
        let _ = engine.evaluate("ETH", &tf(), &change(0.5, later), AlertContext::default(), later);
        assert_eq!(engine.cooldown_count(), 0);
    }

    #[test]
    fn test_direction_and_context() {
        let mut engine = AlertEngine::new(&config());
        let ctx = AlertContext {
            market_cap: Some(1.5e9),
            daily_change_pct: Some(-2.0),
        };
        let event = engine
            .evaluate("BTC", &tf(), &change(-7.5, t(0)), ctx, t(0))
            .unwrap();
        assert_eq!(event.direction, Direction::Dump);
        assert_eq!(event.market_cap, Some(1.5e9));
        assert_eq!(event.daily_change_pct, Some(-2.0));
        assert!((event.price - 92.5).abs() < 1e-9);
    }

    #[test]
    fn test_pumps_only_mutes_dumps() {
        let mut engine = AlertEngine::new(&AlertsConfig {
            pumps_only: true,
            ..config()
        });
        let ctx = AlertContext::default();
        assert_eq!(
            engine.evaluate("BTC", &tf(), &change(-8.0, t(0)), ctx, t(0)),
            Err(Verdict::DumpMuted)
        );
        assert!(engine.evaluate("BTC", &tf(), &change(8.0, t(0)), ctx, t(0)).is_ok());
    }

    #[test]
    fn test_volume_confirmation() {
        let mut engine = AlertEngine::new(&AlertsConfig {
            require_volume_confirmation: true,
            ..config()
        });
        let ctx = AlertContext::default();
        // change() reports a 1% volume move
        assert_eq!(
            engine.evaluate("BTC", &tf(), &change(8.0, t(0)), ctx, t(0)),
            Err(Verdict::VolumeUnconfirmed)
        );

        let mut confirmed = change(8.0, t(0));
        if let Ok(c) = confirmed.as_mut() {
            c.volume_change_pct = Some(-12.0);
        }
        assert!(engine.evaluate("BTC", &tf(), &confirmed, ctx, t(0)).is_ok());
    }
}
