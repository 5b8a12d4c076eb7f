//! Half-open booking windows and the minute-resolution timestamp format.
//!
//! Every reservation claims a slot for `[start, end)`. Two windows that only
//! touch (`a.end == b.start`) do not overlap, so back-to-back bookings of the
//! same slot are allowed.

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::fmt;

use super::error::LedgerError;

/// Storage and wire format for instants: sortable as text.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

const TIMESTAMP_FORMAT_T: &str = "%Y-%m-%dT%H:%M";

/// Format an instant as `YYYY-MM-DD HH:MM`.
pub fn format_timestamp(t: NaiveDateTime) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

/// Years whose timestamps are exactly four digits wide, so text order is time order.
const MIN_YEAR: i32 = 1000;
const MAX_YEAR: i32 = 9999;

fn year_in_range(date: NaiveDate) -> bool {
    (MIN_YEAR..=MAX_YEAR).contains(&date.year())
}

/// Parse `YYYY-MM-DD HH:MM` (or the `T`-separated form) into a minute-resolution instant.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT_T))
        .ok()
        .filter(|t| year_in_range(t.date()))
}

/// Parse a time of day as `HH:MM`.
pub fn parse_time_of_day(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()
}

/// Parse a calendar date as `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .ok()
        .filter(|d| year_in_range(*d))
}

/// Drop seconds and sub-second precision.
pub fn truncate_to_minute(t: NaiveDateTime) -> NaiveDateTime {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

/// A claimed interval `[start, end)` with `end > start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl Window {
    /// Build a window from explicit instants. Rejects empty or backwards windows,
    /// and instants outside the four-digit year range.
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, LedgerError> {
        let start = truncate_to_minute(start);
        let end = truncate_to_minute(end);
        if !year_in_range(start.date()) || !year_in_range(end.date()) {
            return Err(LedgerError::DateOutOfRange);
        }
        if end <= start {
            return Err(LedgerError::InvalidWindow);
        }
        Ok(Self { start, end })
    }

    /// Build a window from a booking date plus entry and exit times of day.
    ///
    /// An exit at or before the entry time means the stay runs past midnight,
    /// so the end lands on the following day.
    pub fn from_entry_exit(
        date: NaiveDate,
        entry: NaiveTime,
        exit: NaiveTime,
    ) -> Result<Self, LedgerError> {
        let exit_date = if exit <= entry {
            date.checked_add_days(Days::new(1))
                .ok_or(LedgerError::DateOutOfRange)?
        } else {
            date
        };
        Self::new(date.and_time(entry), exit_date.and_time(exit))
    }

    /// Half-open overlap: `!(a.end <= b.start || a.start >= b.end)`.
    pub fn overlaps(&self, other: &Window) -> bool {
        !(self.end <= other.start || self.start >= other.end)
    }

    pub fn start_text(&self) -> String {
        format_timestamp(self.start)
    }

    pub fn end_text(&self) -> String {
        format_timestamp(self.end)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start_text(), self.end_text())
    }
}
