//! Lockdate value type for fidelity bond unlock times
//!
//! A lockdate is a string-encoded year-month (`YYYY-MM`) that always
//! represents the 1st of that UTC month at 00:00:00.000. It is the only
//! time representation the fidelity bond workflow deals in: the backend
//! derives time-locked addresses from it and reports it back as the
//! `locktime` of bond UTXOs.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::LockdateError;

/// Milliseconds since the Unix epoch, UTC
pub type Timestamp = i64;

/// A maximum of years for a timelock to be accepted.
///
/// This prevents users from locking up their coins for an awful amount of
/// time by accident. An "advanced" mode may drop or increase this
/// substantially.
pub const DEFAULT_MAX_TIMELOCK_YEARS: i32 = 10;

/// The months ahead for the initial lock date.
///
/// It is recommended to lock for a period of between 3 months and 1 year
/// initially; this value sits at the lower end of that recommendation.
pub(crate) const INITIAL_LOCKDATE_MONTHS_AHEAD: i32 = 3;

const MIN_YEAR: i32 = 1000;
const MAX_YEAR: i32 = 9999;

/// A min/max year-offset window relative to "now", bounding the lockdates a
/// user may select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearsRange {
    pub min: i32,
    pub max: i32,
}

impl YearsRange {
    /// Create a years range. Fails if `max <= min`.
    pub fn new(min: i32, max: i32) -> Result<Self, LockdateError> {
        if max <= min {
            return Err(LockdateError::invalid_input(
                "Invalid values for range of years",
            ));
        }
        Ok(Self { min, max })
    }
}

impl Default for YearsRange {
    fn default() -> Self {
        Self {
            min: 0,
            max: DEFAULT_MAX_TIMELOCK_YEARS,
        }
    }
}

/// A fidelity bond unlock date: the start of a UTC month
///
/// The year is always exactly four digits; years outside `1000..=9999` are
/// rejected both when parsing and when converting from a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Lockdate {
    year: i32,
    month: u32,
}

impl Lockdate {
    /// Create a lockdate from a year and a 1-based month
    pub fn new(year: i32, month: u32) -> Result<Self, LockdateError> {
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(LockdateError::invalid_input(format!(
                "year out of range: {}",
                year
            )));
        }
        if !(1..=12).contains(&month) {
            return Err(LockdateError::invalid_input(format!(
                "month out of range: {}",
                month
            )));
        }
        Ok(Self { year, month })
    }

    /// The UTC year
    pub fn year(&self) -> i32 {
        self.year
    }

    /// The 1-based UTC month
    pub fn month(&self) -> u32 {
        self.month
    }

    /// Lockdate for the UTC year/month containing the given timestamp
    ///
    /// Negative timestamps map to pre-1970 months (e.g. -1ms is `1969-12`).
    /// Timestamps outside the representable range, or whose UTC year does
    /// not fit in four digits, are rejected.
    pub fn from_timestamp(timestamp_ms: Timestamp) -> Result<Self, LockdateError> {
        let datetime = DateTime::<Utc>::from_timestamp_millis(timestamp_ms).ok_or_else(|| {
            LockdateError::invalid_input(format!("unrepresentable timestamp: {}", timestamp_ms))
        })?;
        Self::new(datetime.year(), datetime.month())
    }

    /// Timestamp of the start of this lockdate's UTC month
    pub fn to_timestamp(&self) -> Timestamp {
        // year/month are validated at construction
        let date = NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .expect("lockdate year/month validated at construction");
        date.and_hms_opt(0, 0, 0)
            .expect("midnight is always a valid time")
            .and_utc()
            .timestamp_millis()
    }

    /// An initial lockdate a few months after `now`, clamped into `range`
    ///
    /// The result is at least [`INITIAL_LOCKDATE_MONTHS_AHEAD`] months (plus
    /// one, so that a full month remains selectable) after `now`, moved
    /// forward to the start of the range's minimum year when the naive date
    /// would fall below the window.
    pub fn initial(now_ms: Timestamp, range: &YearsRange) -> Result<Self, LockdateError> {
        let now = DateTime::<Utc>::from_timestamp_millis(now_ms).ok_or_else(|| {
            LockdateError::invalid_input(format!("unrepresentable timestamp: {}", now_ms))
        })?;

        let min_months_ahead = std::cmp::max(range.min * 12, INITIAL_LOCKDATE_MONTHS_AHEAD + 1);
        let month0 = now.month() as i32 - 1 + min_months_ahead;
        let year = now.year() + month0.div_euclid(12);
        let month = month0.rem_euclid(12) as u32 + 1;
        Self::new(year, month)
    }

    /// Years a user may pick a lockdate in, given the current time
    ///
    /// In December the window shifts forward by one year since no month of
    /// the current year remains selectable.
    pub fn selectable_years(now_ms: Timestamp, range: &YearsRange) -> Vec<i32> {
        let now = match DateTime::<Utc>::from_timestamp_millis(now_ms) {
            Some(now) => now,
            None => return vec![],
        };
        let extra = range.min + if now.month() == 12 { 1 } else { 0 };
        let start = now.year() + extra;
        (start..start + (range.max - range.min)).collect()
    }

    /// The twelve months of `year` with an "already past" flag per month
    ///
    /// A month is disabled when the resulting lockdate would not lie in the
    /// future relative to `now` within the given range; for years below the
    /// window every month is disabled.
    pub fn selectable_months(
        year: i32,
        now_ms: Timestamp,
        range: &YearsRange,
    ) -> Vec<SelectableMonth> {
        let min_month = Self::min_selectable_month(year, now_ms, range);
        (1..=12)
            .map(|month| SelectableMonth {
                month,
                disabled: month < min_month,
            })
            .collect()
    }

    // Returns 13 when no month of the year is selectable.
    fn min_selectable_month(year: i32, now_ms: Timestamp, range: &YearsRange) -> u32 {
        let now = match DateTime::<Utc>::from_timestamp_millis(now_ms) {
            Some(now) => now,
            None => return 13,
        };
        let min_year = now.year() + range.min;
        if year > min_year {
            1
        } else if year < min_year {
            13
        } else {
            now.month() + 1
        }
    }
}

/// One entry of the month selector for a given year
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectableMonth {
    /// 1-based month
    pub month: u32,
    /// True when picking this month would produce an already-past lockdate
    pub disabled: bool,
}

impl fmt::Display for Lockdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Lockdate {
    type Err = LockdateError;

    /// Parse a `YYYY-MM` string: exactly four year digits, exactly two
    /// month digits, month in `01..=12`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year_part, month_part) = s
            .split_once('-')
            .ok_or_else(|| LockdateError::invalid_format(s))?;
        if year_part.len() != 4
            || month_part.len() != 2
            || !year_part.bytes().all(|b| b.is_ascii_digit())
            || !month_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(LockdateError::invalid_format(s));
        }

        let year: i32 = year_part
            .parse()
            .map_err(|_| LockdateError::invalid_format(s))?;
        let month: u32 = month_part
            .parse()
            .map_err(|_| LockdateError::invalid_format(s))?;
        Self::new(year, month).map_err(|_| LockdateError::invalid_format(s))
    }
}

impl TryFrom<String> for Lockdate {
    type Error = LockdateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Lockdate> for String {
    fn from(value: Lockdate) -> Self {
        value.to_string()
    }
}
