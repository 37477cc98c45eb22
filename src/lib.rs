//! Price Alert Bot Library
//!
//! Multi-timeframe change detection over polled market data, with a
//! once-per-day baseline and deduplicated alert fan-out.

pub mod baseline;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod market;
pub mod notify;
pub mod signal;

// Re-export commonly used types
pub use config::Config;
pub use engine::{CycleReport, Engine};
pub use error::{Error, Result};
