//! # Tempograph Core
//!
//! Core crate for Tempograph: frame timing and profiling utilities shared by
//! the graph compiler and executor.

pub mod profiling;
pub mod time;

pub use time::{Clock, ManualClock, SystemClock, Timer};

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version. Call once at startup, after the logger is installed.
pub fn init() {
    log::info!("Tempograph Core v{} initialized", VERSION);
}
