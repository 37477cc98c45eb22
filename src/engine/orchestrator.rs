//! Orchestrator
//!
//! One cycle: fetch a batched snapshot, record it, refresh the daily
//! baseline when due, evaluate every (symbol, timeframe) pair and fan out
//! qualifying alerts. Cycles run with a fixed delay between them and never
//! overlap.

use chrono::{DateTime, TimeDelta, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::baseline::{BaselineManager, BaselineState};
use crate::config::{bounded_secs, Config};
use crate::error::{Error, Result};
use crate::history::{HistoryStore, Sample};
use crate::market::{FetchError, MarketDataSource, MarketSnapshot};
use crate::notify::{format, DeliveryOutcome, Dispatcher};
use crate::signal::{AlertContext, AlertEngine, ChangeCalculator, Timeframe, Verdict};

const DEFAULT_STOP_MESSAGE: &str = "🛑 Price alert bot stopped";

/// What one cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub ingested: usize,
    pub rejected: usize,
    pub alerts_sent: usize,
    /// Alerts no channel accepted; retried next cycle
    pub alerts_failed: usize,
    /// Alerts held back by the cooldown
    pub suppressed: usize,
    pub baseline_created: bool,
    pub summary_sent: bool,
}

pub struct Engine {
    source: Box<dyn MarketDataSource>,
    history: HistoryStore,
    calculator: ChangeCalculator,
    alerts: AlertEngine,
    baseline: BaselineManager,
    dispatcher: Dispatcher,
    timeframes: Vec<Timeframe>,
    poll_interval: Duration,
    notify_on_snapshot: bool,
    summary_interval: Option<TimeDelta>,
    last_summary: Option<DateTime<Utc>>,
    lifecycle_file: PathBuf,
    cycle_count: u64,
}

impl Engine {
    pub fn new(
        config: &Config,
        source: Box<dyn MarketDataSource>,
        dispatcher: Dispatcher,
    ) -> Result<Self> {
        // pumps_only mutes everything that is not a pump alert
        let summary_interval = match (config.summary.enabled, config.alerts.pumps_only) {
            (true, false) => Some(bounded_secs(config.summary.interval_secs)),
            (true, true) => {
                info!("Periodic summary disabled while pumps_only is set");
                None
            }
            (false, _) => None,
        };

        Ok(Self {
            source,
            history: HistoryStore::new(config.retention()),
            calculator: ChangeCalculator::new(config.poll_interval()),
            alerts: AlertEngine::new(&config.alerts),
            baseline: BaselineManager::new(&config.baseline)?,
            dispatcher,
            timeframes: config.timeframes.clone(),
            poll_interval: Duration::from_secs(config.polling.interval_secs),
            notify_on_snapshot: config.baseline.notify_on_snapshot,
            summary_interval,
            last_summary: None,
            lifecycle_file: PathBuf::from(&config.messages.lifecycle_file),
            cycle_count: 0,
        })
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn alerts(&self) -> &AlertEngine {
        &self.alerts
    }

    pub fn baseline(&self) -> &BaselineManager {
        &self.baseline
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Restore the durable baseline, if any
    pub async fn recover(&mut self) -> BaselineState {
        self.baseline.recover().await
    }

    /// Run one poll cycle at `now`
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport> {
        self.cycle_count += 1;
        info!("Check cycle #{} at {}", self.cycle_count, now.format("%Y-%m-%d %H:%M:%S"));

        let snapshot = self.source.fetch().await?;
        if snapshot.is_empty() {
            return Err(Error::MarketData(FetchError::Empty));
        }

        let mut report = CycleReport::default();
        self.ingest(&snapshot, now, &mut report);
        self.refresh_baseline(&snapshot, now, &mut report).await;
        self.evaluate_all(&snapshot, now, &mut report).await;
        self.maybe_send_summary(&snapshot, now, &mut report).await;

        info!(
            ingested = report.ingested,
            rejected = report.rejected,
            alerts_sent = report.alerts_sent,
            alerts_failed = report.alerts_failed,
            suppressed = report.suppressed,
            "Cycle #{} complete",
            self.cycle_count
        );
        Ok(report)
    }

    fn ingest(&mut self, snapshot: &MarketSnapshot, now: DateTime<Utc>, report: &mut CycleReport) {
        for (symbol, quote) in &snapshot.quotes {
            match self
                .history
                .append(symbol, Sample::new(quote.price, quote.volume, now))
            {
                Ok(()) => report.ingested += 1,
                Err(e) => {
                    warn!(symbol = %symbol, "Rejected sample: {}", e);
                    report.rejected += 1;
                }
            }
        }

        let evicted = self.history.prune(now);
        if evicted > 0 {
            debug!("Pruned {} stale samples", evicted);
        }
    }

    async fn refresh_baseline(
        &mut self,
        snapshot: &MarketSnapshot,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) {
        if !self.baseline.should_snapshot(now) {
            return;
        }

        let offset = self.baseline.offset();
        let notice = match self.baseline.create_snapshot(snapshot, now).await {
            Ok(baseline) => {
                report.baseline_created = true;
                format::snapshot_notice(baseline, offset)
            }
            Err(e) => {
                error!("Failed to save daily snapshot: {}", e);
                return;
            }
        };

        if self.notify_on_snapshot {
            self.dispatcher.fan_out(&notice).await;
        }
    }

    async fn evaluate_all(
        &mut self,
        snapshot: &MarketSnapshot,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) {
        let offset = self.baseline.offset();
        let baseline_label = self
            .baseline
            .current()
            .map(|b| format::baseline_label(b, offset));
        let total_market_cap = Some(snapshot.total_market_cap);

        for (symbol, quote) in &snapshot.quotes {
            let context = AlertContext {
                market_cap: quote.market_cap,
                daily_change_pct: self.baseline.daily_change(symbol, quote.price),
            };

            for timeframe in &self.timeframes {
                let change =
                    self.calculator
                        .compute(&self.history, symbol, timeframe.duration(), now);

                match &change {
                    Ok(c) => debug!(
                        symbol = %symbol,
                        timeframe = %timeframe,
                        price_change_pct = c.price_change_pct,
                        volume_change_pct = ?c.volume_change_pct,
                        "Change computed"
                    ),
                    Err(reason) => debug!(
                        symbol = %symbol,
                        timeframe = %timeframe,
                        "No signal: {}",
                        reason
                    ),
                }

                let event = match self.alerts.evaluate(symbol, timeframe, &change, context, now) {
                    Ok(event) => event,
                    Err(Verdict::CoolingDown { .. }) => {
                        report.suppressed += 1;
                        continue;
                    }
                    Err(_) => continue,
                };

                info!(
                    symbol = %symbol,
                    timeframe = %timeframe,
                    "{} alert: {:+.2}%",
                    event.direction,
                    event.price_change_pct
                );

                let text =
                    format::alert_message(&event, total_market_cap, baseline_label.as_deref());
                let outcome = self.dispatcher.fan_out(&text).await;

                if outcome.delivered() {
                    self.alerts.record_delivery(&event, now);
                    report.alerts_sent += 1;
                } else {
                    warn!(
                        symbol = %symbol,
                        timeframe = %timeframe,
                        "Alert reached no channel; it will be retried next cycle"
                    );
                    report.alerts_failed += 1;
                }
            }
        }
    }

    async fn maybe_send_summary(
        &mut self,
        snapshot: &MarketSnapshot,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) {
        let Some(interval) = self.summary_interval else {
            return;
        };
        if let Some(last) = self.last_summary {
            if now - last < interval {
                return;
            }
        }

        let text = format::summary_message(
            snapshot,
            self.baseline.current(),
            self.baseline.offset(),
            now,
        );
        if self.dispatcher.fan_out(&text).await.delivered() {
            self.last_summary = Some(now);
            report.summary_sent = true;
        }
    }

    /// Send the lifecycle message as a connection test. Fails when a
    /// message exists and no channel accepted it.
    pub async fn startup_check(&self) -> Result<Option<DeliveryOutcome>> {
        let Some(message) = read_lifecycle_message(&self.lifecycle_file).await else {
            return Ok(None);
        };

        info!("Testing notification channels...");
        let outcome = self.dispatcher.fan_out(&message).await;
        if !outcome.delivered() {
            return Err(Error::NothingDelivered);
        }
        Ok(Some(outcome))
    }

    async fn send_stop_notice(&self) {
        let message = read_lifecycle_message(&self.lifecycle_file)
            .await
            .unwrap_or_else(|| DEFAULT_STOP_MESSAGE.to_string());
        self.dispatcher.fan_out(&message).await;
    }

    /// Poll until `shutdown` is cancelled.
    ///
    /// Cancellation is observed between cycles and while sleeping; a cycle
    /// that has started always runs to completion.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        info!("Starting price alert engine (source: {})", self.source.name());
        info!(
            "Monitoring timeframes: {:?}",
            self.timeframes.iter().map(|t| t.name.as_str()).collect::<Vec<_>>()
        );
        info!(
            "Daily snapshot window: {}-{}",
            self.baseline.window().start().format("%H:%M"),
            self.baseline.window().end().format("%H:%M")
        );
        info!("Check interval: {}s", self.poll_interval.as_secs());
        info!("Sending to {} channel(s)", self.dispatcher.channel_count());

        self.recover().await;
        self.startup_check().await?;

        while !shutdown.is_cancelled() {
            match self.run_cycle(Utc::now()).await {
                Ok(_) => {}
                Err(e) if e.is_retryable() => warn!("Cycle failed, retrying next interval: {}", e),
                Err(e) => error!("Cycle failed: {}", e),
            }

            debug!("Waiting {}s for next check", self.poll_interval.as_secs());
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Received shutdown signal");
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        self.send_stop_notice().await;
        info!("Engine stopped after {} cycle(s)", self.cycle_count);
        Ok(())
    }
}

/// Trimmed file contents, or `None` when missing, unreadable or empty
pub async fn read_lifecycle_message(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => {
            let text = text.trim();
            if text.is_empty() {
                debug!("Lifecycle message file {} is empty", path.display());
                None
            } else {
                Some(text.to_string())
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No lifecycle message file at {}", path.display());
            None
        }
        Err(e) => {
            warn!("Error reading message file {}: {}", path.display(), e);
            None
        }
    }
}
