//! Instant - microsecond-precision point on the version timeline
//!
//! Instants are stored as signed microseconds since the Unix epoch (UTC).
//! The representation is deliberately wider than the calendar range so that
//! corrupted `end` values above `MAX_INSTANT` survive a round trip through the
//! table and can be detected and repaired.

use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Largest calendar instant, 9999-12-31 23:59:59.999999.
///
/// A version whose `end` equals this value has no scheduled end.
pub const MAX_INSTANT: Instant = Instant(253_402_300_799_999_999);

/// Smallest calendar instant, 0001-01-01 00:00:00.
pub const MIN_INSTANT: Instant = Instant(-62_135_596_800_000_000);

/// 3000-01-01 00:00:00.
///
/// Far enough ahead to never be a real edit time, but strictly below
/// `MAX_INSTANT`. Any `end` above it marks an open version.
pub const FUTURE: Instant = Instant(32_503_680_000_000_000);

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
const PARSE_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"];

/// A point in time, microseconds since the Unix epoch (UTC).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Instant(i64);

impl Instant {
    /// Creates an instant from raw microseconds since the epoch.
    #[inline]
    pub const fn from_micros(micros: i64) -> Self {
        Instant(micros)
    }

    /// Returns the raw microseconds since the epoch.
    #[inline]
    pub const fn as_micros(self) -> i64 {
        self.0
    }

    /// Converts a chrono UTC timestamp.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Instant(dt.timestamp_micros())
    }

    /// Builds an instant from calendar fields (UTC). Returns `None` for
    /// impossible dates.
    pub fn from_ymd_hms(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(Self::from_datetime)
    }

    /// Converts back to a chrono timestamp, if representable.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_micros(self.0)
    }

    /// True for the open-version sentinel.
    #[inline]
    pub fn is_max(self) -> bool {
        self == MAX_INSTANT
    }

    /// True when an `end` value marks an open version (anything past `FUTURE`).
    #[inline]
    pub fn is_open_end(self) -> bool {
        self > FUTURE
    }

    /// Clamps values past `FUTURE` down to `MAX_INSTANT`.
    #[inline]
    pub fn clamp_open(self) -> Self {
        if self > FUTURE {
            MAX_INSTANT
        } else {
            self
        }
    }

    /// Adds a number of microseconds, saturating at the representable range.
    #[inline]
    pub fn plus_micros(self, micros: i64) -> Self {
        Instant(self.0.saturating_add(micros))
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        let micros = rhs.num_microseconds().unwrap_or(i64::MAX);
        self.plus_micros(micros)
    }
}

impl Sub<Duration> for Instant {
    type Output = Instant;

    fn sub(self, rhs: Duration) -> Instant {
        let micros = rhs.num_microseconds().unwrap_or(i64::MAX);
        Instant(self.0.saturating_sub(micros))
    }
}

impl From<DateTime<Utc>> for Instant {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_datetime(dt)
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.format(DISPLAY_FORMAT)),
            None => write!(f, "@{}us", self.0),
        }
    }
}

/// Error returned when an instant cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseInstantError {
    input: String,
}

impl fmt::Display for ParseInstantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid instant '{}': expected YYYY-MM-DD HH:MM:SS[.ffffff]",
            self.input
        )
    }
}

impl std::error::Error for ParseInstantError {}

impl FromStr for Instant {
    type Err = ParseInstantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        for format in PARSE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Ok(Self::from_datetime(naive.and_utc()));
            }
        }
        Err(ParseInstantError {
            input: s.to_string(),
        })
    }
}
