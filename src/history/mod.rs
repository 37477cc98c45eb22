//! Price/volume history
//!
//! Keeps a bounded, time-ordered series of samples per tracked symbol.
//! Nothing here is persisted; the series rebuild from the feed after a restart.

pub mod store;

pub use store::{HistoryStore, InvalidSample, Sample};
