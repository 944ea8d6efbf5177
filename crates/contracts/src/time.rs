//! Capture-time clock helper.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as epoch milliseconds.
///
/// Capture timestamps are assigned at decode time with this clock; a clock
/// that goes backwards yields 0 rather than panicking on the hot path.
pub fn epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
