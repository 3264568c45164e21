//! Shared utilities.
//!
//! - `time`: wire-format timestamp helpers (formatting, validation, parsing)

pub mod time;

pub use time::{
    format_timestamp, now_timestamp, parse_timestamp, validate_custom_timestamp, TIMESTAMP_FORMAT,
};
