//! Wire-format timestamp helpers.
//!
//! The store records timestamps as `YYYY-MM-DD HH:MM:SS`, UTC-normalized and
//! truncated to whole seconds. Custom timestamps supplied by the user are
//! validated against the literal pattern first and the calendar second, so a
//! well-shaped but impossible date is still rejected.

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// The wire format for event timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn timestamp_shape() -> &'static Regex {
    static SHAPE: OnceLock<Regex> = OnceLock::new();
    SHAPE.get_or_init(|| {
        Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}$")
            .unwrap_or_else(|e| panic!("invalid timestamp pattern: {e}"))
    })
}

/// Format a UTC instant to the wire format, truncated to whole seconds.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Format the current time to the wire format.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Validate a user-supplied custom timestamp.
///
/// Returns the normalized wire-format string, or `None` when the input does
/// not match the literal pattern or does not parse as a real calendar date.
pub fn validate_custom_timestamp(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if !timestamp_shape().is_match(trimmed) {
        return None;
    }
    NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_FORMAT)
        .ok()
        .map(|parsed| parsed.format(TIMESTAMP_FORMAT).to_string())
}

/// Parse a stored timestamp for sorting. Invalid values return `None` and
/// sort after all valid ones.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT).ok()
}

#[cfg(test)]
#[path = "time_test.rs"]
mod tests;
