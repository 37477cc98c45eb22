//! Telegram Bot API channel
//!
//! One channel per chat id. Messages are sent as plain text through
//! `sendMessage`; Telegram answers `{"ok": false, "description": ...}` on
//! failure, which is surfaced as a delivery error for that chat only.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::Channel;
use crate::config::TelegramConfig;
use crate::error::{Error, Result};

/// Telegram Bot API base URL
pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

#[derive(Debug, Clone, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct SendMessageResponse {
    ok: bool,
    description: Option<String>,
}

pub struct TelegramChannel {
    client: Client,
    api_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramChannel {
    pub fn new(client: Client, api_url: &str, bot_token: &str, chat_id: &str) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
            chat_id: chat_id.trim().to_string(),
        }
    }

    /// Build one channel per non-blank chat id
    pub fn from_config(config: &TelegramConfig) -> Result<Vec<Arc<dyn Channel>>> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        let mut channels: Vec<Arc<dyn Channel>> = Vec::new();
        for chat_id in &config.chat_ids {
            if chat_id.trim().is_empty() {
                warn!("Empty chat ID, skipping");
                continue;
            }
            channels.push(Arc::new(Self::new(
                client.clone(),
                &config.api_url,
                &config.bot_token,
                chat_id,
            )));
        }

        info!("Telegram configured for {} chat(s)", channels.len());
        Ok(channels)
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_url, self.bot_token)
    }

    fn delivery_error(&self, reason: impl Into<String>) -> Error {
        Error::Delivery {
            channel: self.chat_id.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn id(&self) -> &str {
        &self.chat_id
    }

    async fn send(&self, text: &str) -> Result<()> {
        let request = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
            disable_web_page_preview: true,
        };

        let response = self
            .client
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            // reqwest errors embed the URL, which carries the bot token
            .map_err(|e| self.delivery_error(format!("HTTP request failed: {}", e.without_url())))?;

        let status = response.status();
        let body: SendMessageResponse = response.json().await.map_err(|e| {
            self.delivery_error(format!("HTTP {}: unreadable response: {}", status, e.without_url()))
        })?;

        if !body.ok {
            return Err(self.delivery_error(
                body.description
                    .unwrap_or_else(|| format!("HTTP {}", status)),
            ));
        }

        debug!(chat_id = %self.chat_id, "Telegram message accepted");
        Ok(())
    }
}
