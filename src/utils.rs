//! Wall-clock helpers.
//!
//! The engine itself never reads a clock; timestamps enter the system
//! exactly once, at the sequencing boundary, and everything downstream
//! (including replay) reuses them.

use std::time::{SystemTime, UNIX_EPOCH};

/// Nanoseconds since the Unix epoch.
///
/// Returns 0 if the system clock is before the epoch.
#[must_use]
pub fn current_time_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
