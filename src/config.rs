//! Configuration loading and validation

use anyhow::{Context, Result};
use chrono::TimeDelta;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::baseline::SnapshotWindow;
use crate::error::Error;
use crate::notify::telegram::TELEGRAM_API_URL;
use crate::signal::Timeframe;

/// Upper bound for every configured duration (30 days)
pub const MAX_DURATION_SECS: u64 = 30 * 24 * 60 * 60;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// CoinGecko id -> display symbol
    #[serde(default)]
    pub tokens: BTreeMap<String, String>,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default = "default_timeframes")]
    pub timeframes: Vec<Timeframe>,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub baseline: BaselineConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    #[serde(default = "default_market_api_url")]
    pub api_url: String,
    #[serde(default = "default_market_timeout_secs")]
    pub timeout_secs: u64,
    /// Optional CoinGecko demo key
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    #[serde(default = "default_threshold_pct")]
    pub price_change_threshold_pct: f64,
    #[serde(default = "default_threshold_pct")]
    pub volume_change_threshold_pct: f64,
    /// Only alert when volume moved at least as much as the volume threshold
    #[serde(default)]
    pub require_volume_confirmation: bool,
    /// Suppress dump alerts
    #[serde(default)]
    pub pumps_only: bool,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// Kept on top of the longest timeframe
    #[serde(default = "default_retention_margin_secs")]
    pub retention_margin_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BaselineConfig {
    #[serde(default = "default_baseline_path")]
    pub path: String,
    /// HH:MM, inclusive
    #[serde(default = "default_window_start")]
    pub window_start: String,
    /// HH:MM, inclusive
    #[serde(default = "default_window_end")]
    pub window_end: String,
    /// Offset used for the calendar day and the window
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default = "default_true")]
    pub notify_on_snapshot: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_telegram_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_ids: Vec<String>,
    #[serde(default = "default_send_delay_ms")]
    pub send_delay_ms: u64,
    #[serde(default = "default_telegram_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SummaryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_summary_interval_secs")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagesConfig {
    /// Text sent at startup and shutdown when the file exists
    #[serde(default = "default_lifecycle_file")]
    pub lifecycle_file: String,
}

fn default_market_api_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_market_timeout_secs() -> u64 {
    15
}

fn default_interval_secs() -> u64 {
    120
}

fn default_threshold_pct() -> f64 {
    5.0
}

fn default_cooldown_secs() -> u64 {
    300
}

fn default_timeframes() -> Vec<Timeframe> {
    vec![
        Timeframe::new("3min", 180),
        Timeframe::new("5min", 300),
        Timeframe::new("15min", 900),
    ]
}

fn default_retention_margin_secs() -> u64 {
    300
}

fn default_baseline_path() -> String {
    "daily_prices.json".to_string()
}

fn default_window_start() -> String {
    "06:00".to_string()
}

fn default_window_end() -> String {
    "06:30".to_string()
}

fn default_telegram_api_url() -> String {
    TELEGRAM_API_URL.to_string()
}

fn default_send_delay_ms() -> u64 {
    200
}

fn default_telegram_timeout_secs() -> u64 {
    10
}

fn default_summary_interval_secs() -> u64 {
    300
}

fn default_lifecycle_file() -> String {
    "bot_messages.txt".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            api_url: default_market_api_url(),
            timeout_secs: default_market_timeout_secs(),
            api_key: String::new(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            price_change_threshold_pct: default_threshold_pct(),
            volume_change_threshold_pct: default_threshold_pct(),
            require_volume_confirmation: false,
            pumps_only: false,
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            retention_margin_secs: default_retention_margin_secs(),
        }
    }
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            path: default_baseline_path(),
            window_start: default_window_start(),
            window_end: default_window_end(),
            utc_offset_minutes: 0,
            notify_on_snapshot: true,
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_url: default_telegram_api_url(),
            bot_token: String::new(),
            chat_ids: Vec::new(),
            send_delay_ms: default_send_delay_ms(),
            timeout_secs: default_telegram_timeout_secs(),
        }
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_summary_interval_secs(),
        }
    }
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            lifecycle_file: default_lifecycle_file(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tokens: BTreeMap::new(),
            market: MarketConfig::default(),
            polling: PollingConfig::default(),
            alerts: AlertsConfig::default(),
            timeframes: default_timeframes(),
            history: HistoryConfig::default(),
            baseline: BaselineConfig::default(),
            telegram: TelegramConfig::default(),
            summary: SummaryConfig::default(),
            messages: MessagesConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Telegram requirements are checked separately by [`Config::validate`]
    /// so dry runs work without credentials.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix PRICEWATCH__)
            .add_source(
                config::Environment::with_prefix("PRICEWATCH")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("telegram.chat_ids")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let mut config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.apply_env_fallbacks(
            std::env::var("BOT_TOKEN").ok(),
            std::env::var("CHAT_ID").ok(),
        );

        Ok(config)
    }

    /// Plain `BOT_TOKEN` / `CHAT_ID` (comma-separated) fill in unset telegram settings
    fn apply_env_fallbacks(&mut self, bot_token: Option<String>, chat_ids: Option<String>) {
        if self.telegram.bot_token.trim().is_empty() {
            if let Some(token) = bot_token {
                self.telegram.bot_token = token.trim().to_string();
            }
        }

        if self.telegram.chat_ids.is_empty() {
            if let Some(ids) = chat_ids {
                self.telegram.chat_ids = ids
                    .split(',')
                    .map(|id| id.trim().to_string())
                    .filter(|id| !id.is_empty())
                    .collect();
            }
        }
    }

    /// Validate configuration values. Telegram credentials are only
    /// required when messages will actually be sent.
    pub fn validate(&self, dry_run: bool) -> crate::Result<()> {
        if self.tokens.is_empty() {
            return Err(Error::Config("No tokens configured".into()));
        }

        for (id, symbol) in &self.tokens {
            if id.trim().is_empty() || symbol.trim().is_empty() {
                return Err(Error::Config(format!(
                    "Token entries need both an id and a symbol ({:?} = {:?})",
                    id, symbol
                )));
            }
        }

        check_duration("polling.interval_secs", self.polling.interval_secs)?;

        if !(self.alerts.price_change_threshold_pct > 0.0) {
            return Err(Error::Config("price_change_threshold_pct must be positive".into()));
        }

        if !(self.alerts.volume_change_threshold_pct > 0.0) {
            return Err(Error::Config("volume_change_threshold_pct must be positive".into()));
        }

        if self.alerts.cooldown_secs > MAX_DURATION_SECS {
            return Err(Error::Config(format!(
                "alerts.cooldown_secs must be at most {}, got {}",
                MAX_DURATION_SECS, self.alerts.cooldown_secs
            )));
        }

        if self.timeframes.is_empty() {
            return Err(Error::Config("At least one timeframe is required".into()));
        }

        let mut names = HashSet::new();
        for timeframe in &self.timeframes {
            check_duration(&format!("Timeframe {}", timeframe.name), timeframe.duration_secs)?;
            if !names.insert(timeframe.name.as_str()) {
                return Err(Error::Config(format!(
                    "Duplicate timeframe name: {}",
                    timeframe.name
                )));
            }
        }

        if self.history.retention_margin_secs > MAX_DURATION_SECS {
            return Err(Error::Config(format!(
                "history.retention_margin_secs must be at most {}, got {}",
                MAX_DURATION_SECS, self.history.retention_margin_secs
            )));
        }

        SnapshotWindow::parse(&self.baseline.window_start, &self.baseline.window_end)?;

        if self.baseline.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(Error::Config(format!(
                "baseline.utc_offset_minutes must be within +/-1439, got {}",
                self.baseline.utc_offset_minutes
            )));
        }

        if self.summary.enabled {
            check_duration("summary.interval_secs", self.summary.interval_secs)?;
        }

        if !dry_run {
            if self.telegram.bot_token.trim().is_empty() {
                return Err(Error::MissingEnvVar("BOT_TOKEN".into()));
            }
            if self.telegram.chat_ids.iter().all(|id| id.trim().is_empty()) {
                return Err(Error::MissingEnvVar("CHAT_ID".into()));
            }
        }

        Ok(())
    }

    /// Samples older than this relative to the newest are evicted
    pub fn retention(&self) -> TimeDelta {
        let longest = self
            .timeframes
            .iter()
            .map(|t| t.duration_secs)
            .max()
            .unwrap_or(0);
        let secs = longest
            .saturating_add(self.history.retention_margin_secs)
            .min(2 * MAX_DURATION_SECS);
        TimeDelta::seconds(secs as i64)
    }

    pub fn poll_interval(&self) -> TimeDelta {
        bounded_secs(self.polling.interval_secs)
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        let tokens: Vec<String> = self
            .tokens
            .iter()
            .map(|(id, symbol)| format!("{} ({})", symbol, id))
            .collect();
        let timeframes: Vec<String> = self.timeframes.iter().map(|t| t.to_string()).collect();

        format!(
            r#"Configuration:
  Tokens ({}):
    {}
  Market:
    api_url: {}
    timeout: {}s
    api_key: {}
  Polling:
    interval: {}s
  Alerts:
    price_threshold: {}%
    volume_threshold: {}%
    require_volume_confirmation: {}
    pumps_only: {}
    cooldown: {}s
  Timeframes: {}
  History:
    retention: {}s
  Baseline:
    path: {}
    window: {}-{} (UTC{:+}m)
    notify_on_snapshot: {}
  Telegram:
    bot_token: {}
    chat_ids: {:?}
    send_delay: {}ms
  Summary:
    enabled: {}
    interval: {}s
  Messages:
    lifecycle_file: {}
"#,
            self.tokens.len(),
            tokens.join(", "),
            self.market.api_url,
            self.market.timeout_secs,
            mask_secret(&self.market.api_key),
            self.polling.interval_secs,
            self.alerts.price_change_threshold_pct,
            self.alerts.volume_change_threshold_pct,
            self.alerts.require_volume_confirmation,
            self.alerts.pumps_only,
            self.alerts.cooldown_secs,
            timeframes.join(", "),
            self.retention().num_seconds(),
            self.baseline.path,
            self.baseline.window_start,
            self.baseline.window_end,
            self.baseline.utc_offset_minutes,
            self.baseline.notify_on_snapshot,
            mask_secret(&self.telegram.bot_token),
            self.telegram.chat_ids,
            self.telegram.send_delay_ms,
            self.summary.enabled,
            self.summary.interval_secs,
            self.messages.lifecycle_file,
        )
    }
}

/// Seconds as a `TimeDelta`, clamped to `MAX_DURATION_SECS`
pub fn bounded_secs(secs: u64) -> TimeDelta {
    TimeDelta::seconds(secs.min(MAX_DURATION_SECS) as i64)
}

fn check_duration(name: &str, secs: u64) -> crate::Result<()> {
    if secs == 0 || secs > MAX_DURATION_SECS {
        return Err(Error::Config(format!(
            "{} must be between 1 and {} seconds, got {}",
            name, MAX_DURATION_SECS, secs
        )));
    }
    Ok(())
}

fn mask_secret(value: &str) -> &'static str {
    if value.trim().is_empty() {
        "(not set)"
    } else {
        "***"
    }
}
