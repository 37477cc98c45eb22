//! Log-only channel used for dry runs

use async_trait::async_trait;
use tracing::info;

use super::Channel;
use crate::error::Result;

pub struct ConsoleChannel {
    id: String,
}

impl ConsoleChannel {
    pub fn new() -> Self {
        Self {
            id: "console".to_string(),
        }
    }
}

impl Default for ConsoleChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for ConsoleChannel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, text: &str) -> Result<()> {
        info!(channel = %self.id, "\n{}", text);
        Ok(())
    }
}
