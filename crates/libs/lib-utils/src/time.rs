//! # Time Utilities
//!
//! Unix timestamps for login stamps and token claims, RFC3339 parsing for stats windows.

use chrono::{DateTime, Utc};

/// Current time as a Unix timestamp in seconds.
pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}

/// Parse an RFC3339 timestamp (any offset) into UTC.
pub fn parse_utc(moment: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(moment.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| Error::FailToDateParse(moment.to_string()))
}

// region:    --- Error
#[derive(Debug)]
pub enum Error {
    FailToDateParse(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::FailToDateParse(moment) => write!(fmt, "invalid RFC3339 timestamp: {moment}"),
        }
    }
}

impl std::error::Error for Error {}
// endregion: --- Error
