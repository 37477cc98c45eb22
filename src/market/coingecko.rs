// CoinGecko API client for batched price/volume snapshots
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{FetchError, MarketDataSource, MarketSnapshot, Quote};
use crate::config::MarketConfig;
use crate::error::{Error, Result};

const API_KEY_HEADER: &str = "x-cg-demo-api-key";

/// One entry of the `simple/price` response
#[derive(Debug, Clone, Deserialize)]
pub struct SimplePrice {
    pub usd: Option<f64>,
    pub usd_24h_vol: Option<f64>,
    pub usd_market_cap: Option<f64>,
}

pub type SimplePriceResponse = HashMap<String, SimplePrice>;

pub struct CoinGeckoClient {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    /// CoinGecko id -> symbol
    tokens: BTreeMap<String, String>,
}

impl CoinGeckoClient {
    pub fn new(config: &MarketConfig, tokens: BTreeMap<String, String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: if config.api_key.is_empty() {
                None
            } else {
                Some(config.api_key.clone())
            },
            tokens,
        })
    }

    fn ids(&self) -> String {
        self.tokens.keys().cloned().collect::<Vec<_>>().join(",")
    }

    /// Convert the raw response into quotes keyed by symbol
    pub fn snapshot_from_response(
        tokens: &BTreeMap<String, String>,
        response: &SimplePriceResponse,
    ) -> MarketSnapshot {
        let mut quotes = BTreeMap::new();

        for (cg_id, symbol) in tokens {
            let Some(entry) = response.get(cg_id) else {
                warn!(symbol = %symbol, id = %cg_id, "No data returned");
                continue;
            };

            match (entry.usd, entry.usd_24h_vol) {
                (Some(price), Some(volume)) => {
                    quotes.insert(
                        symbol.clone(),
                        Quote {
                            price,
                            volume,
                            market_cap: entry.usd_market_cap.filter(|c| *c > 0.0),
                        },
                    );
                }
                _ => warn!(symbol = %symbol, "Missing price or volume"),
            }
        }

        MarketSnapshot::from_quotes(quotes)
    }
}

#[async_trait]
impl MarketDataSource for CoinGeckoClient {
    fn name(&self) -> &str {
        "coingecko"
    }

    async fn fetch(&self) -> std::result::Result<MarketSnapshot, FetchError> {
        let url = format!("{}/simple/price", self.api_url);
        let ids = self.ids();
        debug!("Requesting {} ids from CoinGecko", self.tokens.len());

        let mut request = self.client.get(&url).query(&[
            ("ids", ids.as_str()),
            ("vs_currencies", "usd"),
            ("include_24hr_vol", "true"),
            ("include_market_cap", "true"),
        ]);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let resp = request.send().await.map_err(classify)?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }
        if !status.is_success() {
            return Err(FetchError::Network(format!("HTTP {}", status)));
        }

        let body: SimplePriceResponse = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Parse(e.to_string())
            }
        })?;

        let snapshot = Self::snapshot_from_response(&self.tokens, &body);
        info!(
            "Fetched {}/{} tokens, total market cap ${:.0}",
            snapshot.len(),
            self.tokens.len(),
            snapshot.total_market_cap
        );
        Ok(snapshot)
    }
}

fn classify(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.status() == Some(StatusCode::TOO_MANY_REQUESTS) {
        FetchError::RateLimited
    } else if e.is_decode() {
        FetchError::Parse(e.to_string())
    } else {
        FetchError::Network(e.to_string())
    }
}
