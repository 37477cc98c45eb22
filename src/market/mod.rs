//! Market data acquisition
//!
//! The engine asks a [`MarketDataSource`] for one batched snapshot of the
//! whole tracked set per cycle. CoinGecko is the production source.

pub mod coingecko;

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

pub use coingecko::CoinGeckoClient;

/// Latest quote for one symbol
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub price: f64,
    /// 24h traded volume in the quote currency
    pub volume: f64,
    pub market_cap: Option<f64>,
}

/// Quotes for every symbol the source could price this cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketSnapshot {
    pub quotes: BTreeMap<String, Quote>,
    /// Sum of the market caps that were reported
    pub total_market_cap: f64,
}

impl MarketSnapshot {
    pub fn from_quotes(quotes: BTreeMap<String, Quote>) -> Self {
        let total_market_cap = quotes.values().filter_map(|q| q.market_cap).sum();
        Self {
            quotes,
            total_market_cap,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }
}

/// Why a snapshot could not be produced
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("rate limited by provider")]
    RateLimited,
    #[error("network error: {0}")]
    Network(String),
    #[error("unparseable response: {0}")]
    Parse(String),
    #[error("no quotes returned")]
    Empty,
}

impl FetchError {
    /// Worth trying again next cycle without operator action
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Timeout | FetchError::RateLimited | FetchError::Network(_) | FetchError::Empty
        )
    }
}

/// Source of batched price/volume snapshots
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Human-readable source name for logs
    fn name(&self) -> &str;

    /// Fetch quotes for the whole tracked set in one call
    async fn fetch(&self) -> Result<MarketSnapshot, FetchError>;
}
