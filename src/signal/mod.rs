//! Change detection and alert decisions
//!
//! - `change` - percent change over a sliding timeframe
//! - `alert` - threshold, cooldown and pump/dump classification
//! - `types` - timeframes, directions and alert events

pub mod alert;
pub mod change;
pub mod types;

pub use alert::{AlertContext, AlertEngine, Verdict};
pub use change::{ChangeCalculator, ChangeResult, InsufficientData};
pub use types::{AlertEvent, Direction, Timeframe};
