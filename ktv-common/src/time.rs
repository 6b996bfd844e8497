//! Clock port and broadcast-day time utilities
//!
//! All schedule arithmetic is done in whole seconds since local midnight
//! (`u32`, `0..=86_400`). Weekdays follow the `0 = Sunday` numbering used
//! by the grid files.

use std::sync::{Mutex, PoisonError};

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};

use crate::{Error, Result};

/// Seconds in one broadcast day
pub const SECONDS_PER_DAY: u32 = 86_400;

/// Source of "now" for everything that depends on wall-clock time.
///
/// Injected everywhere instead of calling `Local::now()` directly, so that
/// rotation cooldowns, daily caps and the playhead can be tested at fixed
/// instants.
pub trait Clock: Send + Sync {
    /// Current local wall-clock time
    fn now(&self) -> NaiveDateTime;

    /// Current local calendar date
    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// Wall clock backed by the operating system's local time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Manually driven clock for tests and simulations
#[derive(Debug)]
pub struct FixedClock {
    at: Mutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(at: NaiveDateTime) -> Self {
        Self { at: Mutex::new(at) }
    }

    /// Jump to an absolute instant
    pub fn set(&self, at: NaiveDateTime) {
        *self.at.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    /// Move forward (or backward, with a negative delta)
    pub fn advance(&self, delta: chrono::Duration) {
        let mut at = self.at.lock().unwrap_or_else(PoisonError::into_inner);
        *at += delta;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.at.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Parse `HH:MM` or `HH:MM:SS` into seconds since midnight.
///
/// `24:00` is accepted as the end of the day. Anything else outside
/// `00:00:00..=23:59:59` is rejected.
///
/// ```
/// use ktv_common::time::parse_clock;
///
/// assert_eq!(parse_clock("07:00").unwrap(), 25_200);
/// assert_eq!(parse_clock("07:39:19").unwrap(), 27_559);
/// assert_eq!(parse_clock("24:00").unwrap(), 86_400);
/// assert!(parse_clock("7h").is_err());
/// ```
pub fn parse_clock(text: &str) -> Result<u32> {
    let text = text.trim();
    if text == "24:00" || text == "24:00:00" {
        return Ok(SECONDS_PER_DAY);
    }

    let time = NaiveTime::parse_from_str(text, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .map_err(|e| Error::Config(format!("Invalid time of day '{}', expected HH:MM[:SS]: {}", text, e)))?;

    // chrono reads `:60` as a leap second
    if time.nanosecond() >= 1_000_000_000 {
        return Err(Error::Config(format!("Invalid time of day '{}': no leap seconds", text)));
    }

    Ok(time.num_seconds_from_midnight())
}

/// Format seconds since midnight as `HH:MM:SS`
pub fn format_clock(seconds: u32) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

/// Format a duration for grid listings: `M:SS` below an hour, `H:MM:SS` above
pub fn format_duration(seconds: u32) -> String {
    if seconds < 3600 {
        format!("{}:{:02}", seconds / 60, seconds % 60)
    } else {
        format!(
            "{}:{:02}:{:02}",
            seconds / 3600,
            (seconds % 3600) / 60,
            seconds % 60
        )
    }
}

/// Whole seconds elapsed since local midnight (sub-second part truncated)
pub fn seconds_since_midnight(time: NaiveTime) -> u32 {
    time.num_seconds_from_midnight()
}

/// Instant at `seconds` past midnight of `date`
pub fn at_clock(date: NaiveDate, seconds: u32) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN) + chrono::Duration::seconds(i64::from(seconds))
}

/// Weekday index with Sunday = 0
pub fn weekday_index(weekday: Weekday) -> u32 {
    weekday.num_days_from_sunday()
}

/// Inverse of [`weekday_index`]
pub fn weekday_from_index(index: u32) -> Option<Weekday> {
    match index {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}

/// Parse a weekday given as an index (`0` = Sunday) or an English name
pub fn parse_weekday(text: &str) -> Result<Weekday> {
    let trimmed = text.trim();
    if let Ok(index) = trimmed.parse::<u32>() {
        return weekday_from_index(index)
            .ok_or_else(|| Error::InvalidInput(format!("Weekday index out of range: {}", index)));
    }
    trimmed
        .parse::<Weekday>()
        .map_err(|_| Error::InvalidInput(format!("Unknown weekday: {}", text)))
}

/// First date on or after `from` that falls on `weekday`
pub fn next_date_for_weekday(from: NaiveDate, weekday: Weekday) -> NaiveDate {
    let ahead = (7 + weekday_index(weekday) - weekday_index(from.weekday())) % 7;
    from + chrono::Duration::days(i64::from(ahead))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clock_accepts_both_forms() {
        assert_eq!(parse_clock("00:00").unwrap(), 0);
        assert_eq!(parse_clock("20:00").unwrap(), 72_000);
        assert_eq!(parse_clock("09:20:30").unwrap(), 33_630);
        assert_eq!(parse_clock(" 7:05 ").unwrap(), 25_500);
    }

    #[test]
    fn test_parse_clock_rejects_malformed() {
        for bad in ["", "7", "07:", "07:60", "25:00", "24:01", "07:00:60", "07:00:61", "aa:bb", "07:00:00:00"] {
            assert!(parse_clock(bad).is_err(), "'{}' should be rejected", bad);
        }
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0), "00:00:00");
        assert_eq!(format_clock(27_559), "07:39:19");
        assert_eq!(format_clock(SECONDS_PER_DAY), "24:00:00");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30), "0:30");
        assert_eq!(format_duration(438), "7:18");
        assert_eq!(format_duration(3661), "1:01:01");
    }

    #[test]
    fn test_fixed_clock_advance() {
        let start = NaiveDate::from_ymd_opt(2025, 11, 4)
            .unwrap()
            .and_hms_opt(7, 0, 0)
            .unwrap();
        let clock = FixedClock::new(start);
        clock.advance(chrono::Duration::minutes(90));
        assert_eq!(clock.now().time(), NaiveTime::from_hms_opt(8, 30, 0).unwrap());
        assert_eq!(clock.today(), start.date());
    }

    #[test]
    fn test_weekday_round_trip_and_parse() {
        for index in 0..7 {
            let weekday = weekday_from_index(index).unwrap();
            assert_eq!(weekday_index(weekday), index);
        }
        assert_eq!(weekday_from_index(7), None);
        assert_eq!(parse_weekday("0").unwrap(), Weekday::Sun);
        assert_eq!(parse_weekday("saturday").unwrap(), Weekday::Sat);
        assert_eq!(parse_weekday("Mon").unwrap(), Weekday::Mon);
        assert!(parse_weekday("9").is_err());
        assert!(parse_weekday("someday").is_err());
    }

    #[test]
    fn test_next_date_for_weekday() {
        // 2025-11-04 is a Tuesday
        let tuesday = NaiveDate::from_ymd_opt(2025, 11, 4).unwrap();
        assert_eq!(next_date_for_weekday(tuesday, Weekday::Tue), tuesday);
        assert_eq!(
            next_date_for_weekday(tuesday, Weekday::Mon),
            NaiveDate::from_ymd_opt(2025, 11, 10).unwrap()
        );
    }

    #[test]
    fn test_at_clock() {
        let date = NaiveDate::from_ymd_opt(2025, 11, 4).unwrap();
        assert_eq!(
            at_clock(date, 25_200),
            date.and_hms_opt(7, 0, 0).unwrap()
        );
    }
}
