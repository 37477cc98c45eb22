//! Error types for the alert bot

use thiserror::Error;

use crate::market::FetchError;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the alert bot
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    // Market data errors
    #[error("Market data unavailable: {0}")]
    MarketData(#[from] FetchError),

    // Baseline errors
    #[error("Baseline record is corrupt: {0}")]
    BaselineCorrupt(String),

    #[error("Baseline persistence failed: {0}")]
    BaselinePersistence(String),

    // Notification errors
    #[error("Delivery to {channel} failed: {reason}")]
    Delivery { channel: String, reason: String },

    #[error("No notification channel accepted the message")]
    NothingDelivered,

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::MarketData(e) => e.is_transient(),
            Error::Delivery { .. } | Error::NothingDelivered => true,
            _ => false,
        }
    }

    /// Check if this error must stop the process before the polling loop starts
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::MissingEnvVar(_))
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::MarketData(FetchError::Timeout).is_retryable());
        assert!(Error::MarketData(FetchError::RateLimited).is_retryable());
        assert!(!Error::MarketData(FetchError::Parse("bad".into())).is_retryable());
        assert!(Error::NothingDelivered.is_retryable());
        assert!(!Error::Config("x".into()).is_retryable());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(Error::Config("no tokens".into()).is_fatal());
        assert!(Error::MissingEnvVar("BOT_TOKEN".into()).is_fatal());
        assert!(!Error::BaselineCorrupt("missing date".into()).is_fatal());
    }
}
