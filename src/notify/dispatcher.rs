//! Notification Dispatcher
//!
//! Sends one message to every channel in configured order, pausing between
//! consecutive sends (across messages too) to stay under provider rate limits. No retries happen here: the
//! caller decides whether an undelivered alert is tried again next cycle.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::Channel;

/// Result of one fan-out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub success_count: usize,
    /// Ids of the channels that rejected the message
    pub failures: Vec<String>,
}

impl DeliveryOutcome {
    /// At least one channel accepted the message
    pub fn delivered(&self) -> bool {
        self.success_count > 0
    }

    pub fn attempted(&self) -> usize {
        self.success_count + self.failures.len()
    }
}

pub struct Dispatcher {
    channels: Vec<Arc<dyn Channel>>,
    pacing: Duration,
    /// When the previous send finished, shared by every fan-out
    last_send: Mutex<Option<Instant>>,
}

impl Dispatcher {
    pub fn new(channels: Vec<Arc<dyn Channel>>, pacing: Duration) -> Self {
        Self {
            channels,
            pacing,
            last_send: Mutex::new(None),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel_ids(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.id().to_string()).collect()
    }

    /// Attempt delivery on every channel, regardless of earlier failures
    pub async fn fan_out(&self, message: &str) -> DeliveryOutcome {
        let mut outcome = DeliveryOutcome::default();
        let mut last_send = self.last_send.lock().await;

        for channel in &self.channels {
            if let Some(last) = *last_send {
                if !self.pacing.is_zero() {
                    tokio::time::sleep_until(last + self.pacing).await;
                }
            }

            match channel.send(message).await {
                Ok(()) => {
                    debug!(channel = %channel.id(), "Message delivered");
                    outcome.success_count += 1;
                }
                Err(e) => {
                    warn!(channel = %channel.id(), "Failed to send message: {}", e);
                    outcome.failures.push(channel.id().to_string());
                }
            }
            *last_send = Some(Instant::now());
        }

        info!(
            "Message sent to {}/{} channels",
            outcome.success_count,
            self.channels.len()
        );
        if !outcome.failures.is_empty() {
            warn!("Failed channels: {:?}", outcome.failures);
        }

        outcome
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::{Error, Result};
    use async_trait::async_trait;

    /// Channel that records what it was asked to send
    pub struct RecordingChannel {
        id: String,
        fail: bool,
        pub sent: std::sync::Mutex<Vec<String>>,
    }

    impl RecordingChannel {
        pub fn ok(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                fail: false,
                sent: std::sync::Mutex::new(Vec::new()),
            })
        }

        pub fn failing(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                fail: true,
                sent: std::sync::Mutex::new(Vec::new()),
            })
        }

        pub fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        fn id(&self) -> &str {
            &self.id
        }

        async fn send(&self, text: &str) -> Result<()> {
            self.sent.lock().unwrap().push(text.to_string());
            if self.fail {
                Err(Error::Delivery {
                    channel: self.id.clone(),
                    reason: "chat not found".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }
}
