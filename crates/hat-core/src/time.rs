//! Wall-clock helpers. Components take explicit timestamps; only the outer
//! node reads the clock.

use chrono::Utc;

/// Current unix time in seconds.
pub fn unix_now_secs() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// Current unix time in milliseconds.
pub fn unix_now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
