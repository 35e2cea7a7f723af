//! Timestamps for `Created`/`LastEdited` columns and archive dates.
//!
//! Timestamps are stored as `YYYY-MM-DD HH:MM:SS` text so that lexical
//! comparison in SQL matches chronological order.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use verso_error::{Result, VersoError};

const STORAGE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const QUERY_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A second-precision, timezone-naive point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timestamp(NaiveDateTime);

impl Timestamp {
    /// Parse an ISO 8601 date (`2024-03-01`, read as midnight) or datetime
    /// (`2024-03-01 10:00:00` or `2024-03-01T10:00:00`).
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let invalid = || VersoError::InvalidArchiveDate {
            value: input.to_owned(),
        };
        if trimmed.is_empty() {
            return Err(VersoError::MissingArchiveDate);
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, STORAGE_FORMAT) {
            return Ok(Self(dt));
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, QUERY_FORMAT) {
            return Ok(Self(dt));
        }
        let date = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|_| invalid())?;
        date.and_hms_opt(0, 0, 0).map(Self).ok_or_else(invalid)
    }

    pub const fn from_naive(dt: NaiveDateTime) -> Self {
        Self(dt)
    }

    pub const fn as_naive(self) -> NaiveDateTime {
        self.0
    }

    /// Shift by a number of seconds (negative moves backwards).
    #[must_use]
    pub fn plus_seconds(self, seconds: i64) -> Self {
        Self(self.0 + chrono::Duration::seconds(seconds))
    }

    /// The form used in request query strings (no spaces).
    pub fn to_query_value(self) -> String {
        self.0.format(QUERY_FORMAT).to_string()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(STORAGE_FORMAT))
    }
}

impl FromStr for Timestamp {
    type Err = VersoError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Timestamp {
    type Error = VersoError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Timestamp> for String {
    fn from(ts: Timestamp) -> Self {
        ts.to_string()
    }
}

impl From<Timestamp> for crate::SqlValue {
    fn from(ts: Timestamp) -> Self {
        Self::Text(ts.to_string())
    }
}

/// Source of the current time for `Created`/`LastEdited` stamping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time in UTC, truncated to whole seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let now = chrono::Utc::now().naive_utc();
        Timestamp(now.with_nanosecond(0).unwrap_or(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_formats() {
        let a = Timestamp::parse("2024-03-01 10:20:30").unwrap();
        let b = Timestamp::parse("2024-03-01T10:20:30").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "2024-03-01 10:20:30");
        assert_eq!(a.to_query_value(), "2024-03-01T10:20:30");

        let midnight = Timestamp::parse("2024-03-01").unwrap();
        assert_eq!(midnight.to_string(), "2024-03-01 00:00:00");
        assert!(midnight < a);
    }

    #[test]
    fn rejected_formats() {
        assert!(matches!(
            Timestamp::parse("yesterday"),
            Err(VersoError::InvalidArchiveDate { .. })
        ));
        assert!(matches!(
            Timestamp::parse("2024-13-01"),
            Err(VersoError::InvalidArchiveDate { .. })
        ));
        assert!(matches!(
            Timestamp::parse("  "),
            Err(VersoError::MissingArchiveDate)
        ));
    }

    #[test]
    fn arithmetic_keeps_lexical_order() {
        let t = Timestamp::parse("2024-03-01 23:59:59").unwrap();
        let later = t.plus_seconds(1);
        assert_eq!(later.to_string(), "2024-03-02 00:00:00");
        assert!(t.to_string() < later.to_string());
    }

    #[test]
    fn system_clock_has_second_precision() {
        let now = SystemClock.now();
        assert_eq!(now.as_naive().nanosecond(), 0);
    }
}
