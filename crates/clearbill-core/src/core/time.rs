// crates/clearbill-core/src/core/time.rs
// ============================================================================
// Module: Clearbill Time Model
// Description: Canonical timestamp and service-date representations.
// Purpose: Provide absolute UTC time values and tolerant date parsing.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! All Clearbill timestamps are absolute UTC instants. The core never reads
//! the wall clock directly: hosts supply the current time to every operation,
//! and the store assigns its own timestamps to audit rows. Service dates are
//! calendar dates without a time component.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use time::Date;
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Canonical UTC timestamp used in Clearbill records.
///
/// # Invariants
/// - Values are explicitly provided by callers or assigned by the store; the
///   core never reads wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(#[serde(with = "time::serde::rfc3339")] OffsetDateTime);

impl Timestamp {
    /// Creates a timestamp from an offset date-time, normalized to UTC.
    #[must_use]
    pub fn new(value: OffsetDateTime) -> Self {
        Self(value.to_offset(time::UtcOffset::UTC))
    }

    /// Creates a timestamp from unix microseconds.
    #[must_use]
    pub fn from_unix_micros(micros: i64) -> Option<Self> {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(micros) * 1_000)
            .ok()
            .map(Self::new)
    }

    /// Returns the timestamp as unix microseconds.
    #[must_use]
    pub fn unix_micros(&self) -> i64 {
        let nanos = self.0.unix_timestamp_nanos() / 1_000;
        i64::try_from(nanos).unwrap_or(i64::MAX)
    }

    /// Returns the underlying offset date-time.
    #[must_use]
    pub const fn as_odt(&self) -> OffsetDateTime {
        self.0
    }

    /// Returns the calendar date of this instant (UTC).
    #[must_use]
    pub const fn date(&self) -> Date {
        self.0.date()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.format(&Rfc3339) {
            Ok(rendered) => f.write_str(&rendered),
            Err(_) => f.write_str("<invalid timestamp>"),
        }
    }
}

// ============================================================================
// SECTION: Tolerant Date Parsing
// ============================================================================

/// Accepted service-date formats, most common first.
const DATE_FORMATS: [&[BorrowedFormatItem<'static>]; 5] = [
    format_description!("[year]-[month]-[day]"),
    format_description!("[month padding:none]/[day padding:none]/[year]"),
    format_description!("[month padding:none]-[day padding:none]-[year]"),
    format_description!("[month repr:long] [day padding:none], [year]"),
    format_description!("[day padding:none] [month repr:long] [year]"),
];

/// Parses a service date from common formats (ISO, US numeric, long form).
///
/// Invalid or empty values return `None` rather than an error: a malformed
/// date never fails ingestion on its own.
#[must_use]
pub fn parse_service_date(raw: &str) -> Option<Date> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    for format in &DATE_FORMATS {
        if let Ok(date) = Date::parse(trimmed, format) {
            return Some(date);
        }
    }
    None
}
