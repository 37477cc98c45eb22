//! CLI command implementations

use anyhow::{Context, Result};
use chrono::{FixedOffset, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::baseline::record;
use crate::config::Config;
use crate::engine::Engine;
use crate::error::Error;
use crate::market::CoinGeckoClient;
use crate::notify::{format, Channel, ConsoleChannel, Dispatcher, TelegramChannel};

/// Telegram channels, or a log-only channel in dry-run mode
pub fn build_dispatcher(config: &Config, dry_run: bool) -> Result<Dispatcher> {
    let channels: Vec<Arc<dyn Channel>> = if dry_run {
        vec![Arc::new(ConsoleChannel::new())]
    } else {
        TelegramChannel::from_config(&config.telegram)?
    };

    Ok(Dispatcher::new(
        channels,
        Duration::from_millis(config.telegram.send_delay_ms),
    ))
}

fn build_engine(config: &Config, dry_run: bool) -> Result<Engine> {
    config.validate(dry_run)?;

    let source = CoinGeckoClient::new(&config.market, config.tokens.clone())?;
    let dispatcher = build_dispatcher(config, dry_run)?;
    Ok(Engine::new(config, Box::new(source), dispatcher)?)
}

/// Poll until Ctrl-C
pub async fn run(config: &Config, dry_run: bool) -> Result<()> {
    if dry_run {
        warn!("Running in DRY-RUN mode - messages are logged, not sent");
    }

    info!("Starting price alert bot...");
    info!(
        "Price change threshold: {}%, cooldown: {}s",
        config.alerts.price_change_threshold_pct, config.alerts.cooldown_secs
    );
    info!("Monitoring {} tokens", config.tokens.len());

    let mut engine = build_engine(config, dry_run)?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal.cancel();
        }
    });

    engine.run(shutdown).await.map_err(startup_failure)?;
    Ok(())
}

/// Only an unreachable startup test means the bot refused to start
fn startup_failure(err: Error) -> anyhow::Error {
    if matches!(err, Error::NothingDelivered) {
        anyhow::Error::new(err).context("Notification test failed, refusing to start")
    } else {
        err.into()
    }
}

/// Run a single cycle and print what happened
pub async fn once(config: &Config, dry_run: bool) -> Result<()> {
    let mut engine = build_engine(config, dry_run)?;
    engine.recover().await;

    let report = engine.run_cycle(Utc::now()).await?;

    println!("\n=== CYCLE REPORT ===\n");
    println!("Samples ingested: {}", report.ingested);
    println!("Samples rejected: {}", report.rejected);
    println!("Alerts sent: {}", report.alerts_sent);
    println!("Alerts undelivered: {}", report.alerts_failed);
    println!("Alerts in cooldown: {}", report.suppressed);
    println!("Baseline created: {}", report.baseline_created);
    println!("Summary sent: {}", report.summary_sent);

    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// Print the durable daily baseline
pub async fn baseline(config: &Config) -> Result<()> {
    let path = Path::new(&config.baseline.path);
    let offset = FixedOffset::east_opt(config.baseline.utc_offset_minutes * 60)
        .context("baseline.utc_offset_minutes out of range")?;

    println!("\n=== DAILY BASELINE ===\n");

    let Some(baseline) = record::load(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?
    else {
        println!("No baseline at {}", path.display());
        return Ok(());
    };

    println!("Taken: {}", format::baseline_label(&baseline, offset));
    println!(
        "Total market cap: {}",
        format::format_market_cap(baseline.total_market_cap)
    );
    println!("Tokens: {}\n", baseline.token_count());
    for (symbol, price) in &baseline.prices {
        let volume = baseline.volumes.get(symbol).copied().unwrap_or(0.0);
        println!(
            "  {:<8} {:>18}  vol {}",
            symbol,
            format::format_price(*price),
            format::format_market_cap(volume)
        );
    }

    Ok(())
}

/// Send a test line to every channel
pub async fn notify_test(config: &Config, dry_run: bool) -> Result<()> {
    if !dry_run {
        config.validate(false)?;
    }
    let dispatcher = build_dispatcher(config, dry_run)?;

    println!("\n=== NOTIFICATION TEST ===\n");
    println!("Channels: {:?}", dispatcher.channel_ids());

    let message = format!(
        "✅ Price alert bot test message ({})",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    );
    let outcome = dispatcher.fan_out(&message).await;

    println!(
        "Delivered: {}/{}",
        outcome.success_count,
        outcome.attempted()
    );
    for channel in &outcome.failures {
        println!("  FAILED: {}", channel);
    }

    if !outcome.delivered() {
        anyhow::bail!("No channel accepted the test message");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_uses_console() {
        let config = Config::default();
        let dispatcher = build_dispatcher(&config, true).unwrap();
        assert_eq!(dispatcher.channel_ids(), vec!["console".to_string()]);
    }

    #[test]
    fn test_one_channel_per_chat() {
        let mut config = Config::default();
        config.telegram.bot_token = "123:abc".to_string();
        config.telegram.chat_ids = vec!["1".to_string(), "2".to_string()];
        let dispatcher = build_dispatcher(&config, false).unwrap();
        assert_eq!(dispatcher.channel_count(), 2);
    }

    #[test]
    fn test_startup_failure_context() {
        let err = startup_failure(Error::NothingDelivered);
        assert!(format!("{:#}", err).contains("refusing to start"));
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::NothingDelivered)
        ));

        let err = startup_failure(Error::Config("bad window".to_string()));
        assert!(!format!("{:#}", err).contains("refusing to start"));
        assert!(err.downcast_ref::<Error>().is_some_and(Error::is_fatal));
    }

    #[tokio::test]
    async fn test_build_engine_rejects_invalid_config() {
        // No tokens configured
        let config = Config::default();
        assert!(build_engine(&config, true).is_err());
    }
}
