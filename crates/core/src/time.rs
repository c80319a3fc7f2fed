//! Expiration time conversions
//!
//! Storage clients report and accept expiration as seconds remaining.
//! Entities may expose it either the same way or as an absolute unix
//! time in seconds. These helpers translate between the two.

use chrono::Utc;

/// Current unix time in seconds
pub fn now_unix_secs() -> i64 {
    Utc::now().timestamp()
}

/// Convert an absolute unix time into seconds remaining from now
///
/// Times in the past yield zero or a negative offset.
pub fn unix_time_to_offset(unix_secs: i64) -> i64 {
    unix_secs - now_unix_secs()
}

/// Convert seconds remaining into an absolute unix time
pub fn offset_to_unix_time(offset_secs: i64) -> i64 {
    now_unix_secs() + offset_secs
}
