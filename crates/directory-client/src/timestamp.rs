//! Conversion of directory integer timestamps.
//!
//! Attributes such as `pwdLastSet` hold a Windows FILETIME: the number of 100-nanosecond
//! intervals since 1601-01-01 UTC.

use crate::Result;
use chrono::{DateTime, Utc};
use directory_core::Error;

/// Seconds between 1601-01-01 and the Unix epoch.
const FILETIME_EPOCH_OFFSET_SECS: i64 = 11_644_473_600;
const TICKS_PER_SECOND: i64 = 10_000_000;

/// Converts a FILETIME tick count to a UTC timestamp.
///
/// Returns `None` if the value lies outside the representable calendar range.
#[must_use]
pub fn filetime_to_datetime(ticks: i64) -> Option<DateTime<Utc>> {
    let seconds = ticks.div_euclid(TICKS_PER_SECOND) - FILETIME_EPOCH_OFFSET_SECS;
    let nanos = u32::try_from(ticks.rem_euclid(TICKS_PER_SECOND) * 100).ok()?;
    DateTime::from_timestamp(seconds, nanos)
}

/// Parses the textual attribute value and converts it.
///
/// # Errors
///
/// Returns [`Error::FormatError`] if the value is not an integer or is out of range.
pub fn parse_filetime(value: &str) -> Result<DateTime<Utc>> {
    let ticks: i64 = value
        .trim()
        .parse()
        .map_err(|err| Error::FormatError(format!("invalid directory timestamp `{value}`: {err}")))?;
    filetime_to_datetime(ticks)
        .ok_or_else(|| Error::FormatError(format!("directory timestamp `{value}` out of range")))
}
