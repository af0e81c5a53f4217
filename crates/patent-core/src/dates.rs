//! Date parsing shared by filter translation and extraction.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Parse a provider or caller date.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS` and RFC 3339. The time part is
/// discarded.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").map(|dt| dt.date()))
        .or_else(|_| DateTime::parse_from_rfc3339(value).map(|dt| dt.date_naive()))
        .ok()
}
