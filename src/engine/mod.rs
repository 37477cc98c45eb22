//! Poll-cycle orchestration
//!
//! The [`Engine`] owns every piece of mutable state (history, cooldowns,
//! the daily baseline) and is driven by a single task, one cycle at a time.

pub mod orchestrator;

pub use orchestrator::{CycleReport, Engine};
