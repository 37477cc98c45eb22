//! Daily baseline
//!
//! A once-per-day reference snapshot of every tracked price and volume,
//! persisted to disk so change-since-baseline survives restarts.

pub mod manager;
pub mod record;
pub mod window;

pub use manager::{BaselineManager, BaselineState};
pub use record::{BaselineRecord, DailyBaseline};
pub use window::SnapshotWindow;
