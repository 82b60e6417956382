//! Abstraction over wall-clock time for dependency injection.
//!
//! Mirrors the clock-source pattern used throughout the pack: production
//! code takes `Arc<dyn Clock>` so tests can swap in a virtual clock instead
//! of sleeping or racing against `SystemTime`.

use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    /// Returns the current time as milliseconds since Unix epoch.
    fn now_millis(&self) -> u64;
}

/// Default clock backed by `std::time::SystemTime`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before Unix epoch")
            .as_millis() as u64
    }
}
