//! Notification delivery
//!
//! Messages fan out to every configured [`Channel`]. A failing channel is
//! recorded and skipped; it never stops delivery to the others.

pub mod console;
pub mod dispatcher;
pub mod format;
pub mod telegram;

use async_trait::async_trait;

use crate::error::Result;

pub use console::ConsoleChannel;
pub use dispatcher::{DeliveryOutcome, Dispatcher};
pub use telegram::TelegramChannel;

/// A single notification target
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable identifier used in logs and delivery reports
    fn id(&self) -> &str;

    /// Deliver one message
    async fn send(&self, text: &str) -> Result<()>;
}
