//! Clock helpers for the clinic day.
//!
//! A clinic runs on one local offset. "Today" for lab-request deduplication
//! and queue snapshots starts at local midnight in that offset.

use time::{Date, OffsetDateTime, Time, UtcOffset, format_description::BorrowedFormatItem};

use crate::error::{CoreError, Result};

time::serde::format_description!(pub calendar_date, Date, "[year]-[month]-[day]");

const OFFSET_FORMAT: &[BorrowedFormatItem<'static>] =
    time::macros::format_description!("[offset_hour sign:mandatory]:[offset_minute]");

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = time::macros::format_description!("[year]-[month]-[day]");

pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Parse an offset such as `+05:30` or `-03:00`.
pub fn parse_utc_offset(value: &str) -> Result<UtcOffset> {
    UtcOffset::parse(value.trim(), OFFSET_FORMAT)
        .map_err(|e| CoreError::InvalidOffset(format!("'{value}': {e}")))
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(value: &str) -> Result<Date> {
    Date::parse(value.trim(), DATE_FORMAT)
        .map_err(|e| CoreError::invalid_date(format!("'{value}': {e}")))
}

pub fn format_date(date: Date) -> String {
    date.format(DATE_FORMAT).unwrap_or_else(|_| date.to_string())
}

/// Clinic-local wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClinicClock {
    offset: UtcOffset,
}

impl ClinicClock {
    pub fn new(offset: UtcOffset) -> Self {
        Self { offset }
    }

    pub fn utc() -> Self {
        Self::new(UtcOffset::UTC)
    }

    pub fn offset(&self) -> UtcOffset {
        self.offset
    }

    /// Start of the clinic day containing `instant`, expressed in UTC.
    pub fn day_start(&self, instant: OffsetDateTime) -> OffsetDateTime {
        instant
            .to_offset(self.offset)
            .replace_time(Time::MIDNIGHT)
            .to_offset(UtcOffset::UTC)
    }

    pub fn today_start(&self) -> OffsetDateTime {
        self.day_start(now_utc())
    }

    pub fn today(&self) -> Date {
        now_utc().to_offset(self.offset).date()
    }
}

impl Default for ClinicClock {
    fn default() -> Self {
        Self::utc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_parse_offset() {
        let offset = parse_utc_offset("+05:30").unwrap();
        assert_eq!(offset.whole_minutes(), 330);
        assert_eq!(parse_utc_offset("-03:00").unwrap().whole_hours(), -3);
        assert!(parse_utc_offset("IST").is_err());
    }

    #[test]
    fn test_day_start_respects_offset() {
        let clock = ClinicClock::new(parse_utc_offset("+05:30").unwrap());
        // 20:00 UTC is already 01:30 the next day in +05:30
        let start = clock.day_start(datetime!(2024-03-10 20:00 UTC));
        assert_eq!(start, datetime!(2024-03-10 18:30 UTC));

        let start = clock.day_start(datetime!(2024-03-10 10:00 UTC));
        assert_eq!(start, datetime!(2024-03-09 18:30 UTC));
    }

    #[test]
    fn test_date_roundtrip_format() {
        let date = parse_date("2024-07-01").unwrap();
        assert_eq!(format_date(date), "2024-07-01");
        assert!(parse_date("07/01/2024").is_err());
    }
}
