//! Date parsing and age arithmetic
//!
//! Snapshot dates are stored as `YYYY/MM/DD` text. Input accepts the three
//! formats researchers actually submit; everything is normalized on entry.

use crate::{Error, Result};
use chrono::NaiveDate;

/// Normalized month length in days used for age-in-months arithmetic
pub const DAYS_PER_MONTH: f64 = 30.42;

/// Accepted input formats, tried in order
const INPUT_FORMATS: &[&str] = &["%Y/%m/%d", "%Y-%m-%d", "%m/%d/%Y"];

/// Parse a date in `YYYY/MM/DD`, `YYYY-MM-DD` or `MM/DD/YYYY` form.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let trimmed = raw.trim();
    for fmt in INPUT_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Ok(date);
        }
    }
    Err(Error::InvalidInput(format!("unparseable date: {}", raw)))
}

/// Render a date in the canonical stored form `YYYY/MM/DD`.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y/%m/%d").to_string()
}

/// Parse and normalize in one step.
pub fn normalize_date(raw: &str) -> Result<String> {
    parse_date(raw).map(format_date)
}

/// Age in months between two dates using the normalized 30.42-day month.
///
/// Negative if `later` precedes `earlier`; callers reject that case where it
/// matters (session_date must not precede birthday).
pub fn months_between(earlier: NaiveDate, later: NaiveDate) -> f64 {
    let days = (later - earlier).num_days() as f64;
    days / DAYS_PER_MONTH
}
