//! Watermark text resolution.
//!
//! The watermark is either a caller-supplied string or a timestamp rendered
//! as `YYYY-MM-DD HH:MM:SS`, zero-padded and fixed width.
//!
//! # Example
//!
//! ```ignore
//! use chrono::{TimeZone, Utc};
//! use stampmark::watermark::template::{format_timestamp, resolve_text};
//!
//! let ts = Utc.with_ymd_and_hms(2024, 3, 5, 2, 1, 9).unwrap();
//! assert_eq!(format_timestamp(&ts), "2024-03-05 02:01:09");
//! assert_eq!(resolve_text(Some("ACME"), &ts), "ACME");
//! assert_eq!(resolve_text(Some(""), &ts), "2024-03-05 02:01:09");
//! ```

use chrono::{DateTime, TimeZone};
use std::fmt::Display;

/// Timestamp layout used for watermark text.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a timestamp in its own time zone. Pass a `DateTime<Local>` for
/// local wall-clock time.
pub fn format_timestamp<Tz>(timestamp: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Pick the watermark text: the pre-formatted text when it is non-empty,
/// otherwise the formatted timestamp.
pub fn resolve_text<Tz>(formatted_text: Option<&str>, timestamp: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    match formatted_text {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => format_timestamp(timestamp),
    }
}
