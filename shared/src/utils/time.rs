//! Time-related utilities

use once_cell::sync::Lazy;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Anchor for process-relative timestamps
static PROCESS_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Monotonic nanoseconds since the first timestamp taken in this process
pub fn timestamp_nanos() -> u64 {
    PROCESS_EPOCH.elapsed().as_nanos() as u64
}

/// Get the current system time in nanoseconds since UNIX epoch
pub fn system_time_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Format a wall-clock nanosecond value as RFC 3339 (UTC)
pub fn format_wall_clock(nanos: u64) -> String {
    let secs = (nanos / 1_000_000_000) as i64;
    let subsec = (nanos % 1_000_000_000) as u32;
    chrono::DateTime::from_timestamp(secs, subsec)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .unwrap_or_else(|| "<invalid>".to_string())
}
