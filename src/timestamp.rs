//! MS-DOS date/time stamps as stored in ZIP headers.
//!
//! ZIP records store the last modification time as two 16-bit fields:
//!
//! ```text
//! time: hhhhh mmmmmm sssss   (seconds / 2)
//! date: yyyyyyy mmmm ddddd   (years since 1980)
//! ```
//!
//! The format has two-second precision and no time zone: readers take the
//! fields as local wall-clock time, so [`DosDateTime::now`] and
//! [`DosDateTime::from_system_time`] convert through the local time zone.
//! Values outside 1980-01-01 through 2107-12-31 clamp to the nearest end.
//!
//! # Example
//!
//! ```rust
//! use zipweave::DosDateTime;
//!
//! let ts = DosDateTime::from_parts(2024, 2, 29, 13, 37, 42).unwrap();
//! assert_eq!(ts.year(), 2024);
//! assert_eq!(ts.second(), 42);
//!
//! // Seconds are stored halved.
//! let odd = DosDateTime::from_parts(2024, 2, 29, 13, 37, 43).unwrap();
//! assert_eq!(odd.second(), 42);
//! ```

use std::time::SystemTime;

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, Timelike};

/// First year representable in a DOS date.
const MIN_YEAR: i32 = 1980;

/// Last year representable in a DOS date (7-bit year offset).
const MAX_YEAR: i32 = 1980 + 127;

/// A ZIP modification timestamp in MS-DOS format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DosDateTime {
    date: u16,
    time: u16,
}

impl DosDateTime {
    /// All-zero date and time.
    ///
    /// Used for reproducible archives where the timestamp must not depend
    /// on when the archive was built.
    pub const ZERO: Self = Self { date: 0, time: 0 };

    /// 1980-01-01 00:00:00, the earliest valid DOS timestamp.
    pub const MIN: Self = Self {
        date: (1 << 5) | 1,
        time: 0,
    };

    /// 2107-12-31 23:59:58, the latest valid DOS timestamp.
    pub const MAX: Self = Self {
        date: (127 << 9) | (12 << 5) | 31,
        time: (23 << 11) | (59 << 5) | 29,
    };

    /// Creates a timestamp from the raw header fields.
    #[inline]
    pub const fn from_raw(date: u16, time: u16) -> Self {
        Self { date, time }
    }

    /// Creates a timestamp from calendar components.
    ///
    /// Returns `None` if any component is out of range for the DOS format.
    /// Odd seconds are rounded down.
    pub fn from_parts(
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
    ) -> Option<Self> {
        if !(MIN_YEAR..=MAX_YEAR).contains(&i32::from(year))
            || hour > 23
            || minute > 59
            || second > 59
        {
            return None;
        }
        NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))?;

        let date = ((year - MIN_YEAR as u16) << 9) | (u16::from(month) << 5) | u16::from(day);
        let time = (u16::from(hour) << 11) | (u16::from(minute) << 5) | u16::from(second / 2);
        Some(Self { date, time })
    }

    /// Converts wall-clock date and time fields, clamping to the DOS range.
    pub fn from_naive(datetime: NaiveDateTime) -> Self {
        let year = datetime.year();
        if year < MIN_YEAR {
            return Self::MIN;
        }
        if year > MAX_YEAR {
            return Self::MAX;
        }
        Self::from_parts(
            year as u16,
            datetime.month() as u8,
            datetime.day() as u8,
            datetime.hour() as u8,
            datetime.minute() as u8,
            datetime.second() as u8,
        )
        .unwrap_or(Self::MIN)
    }

    /// Converts a [`SystemTime`] to local wall-clock time.
    pub fn from_system_time(time: SystemTime) -> Self {
        Self::from_naive(DateTime::<Local>::from(time).naive_local())
    }

    /// Converts seconds since the Unix epoch, taking the UTC fields.
    pub fn from_unix_secs(secs: i64) -> Self {
        match DateTime::from_timestamp(secs, 0) {
            Some(utc) => Self::from_naive(utc.naive_utc()),
            None if secs < 0 => Self::MIN,
            None => Self::MAX,
        }
    }

    /// Returns the current local time.
    pub fn now() -> Self {
        Self::from_naive(Local::now().naive_local())
    }

    /// Raw date field.
    #[inline]
    pub const fn date(&self) -> u16 {
        self.date
    }

    /// Raw time field.
    #[inline]
    pub const fn time(&self) -> u16 {
        self.time
    }

    /// Calendar year.
    pub fn year(&self) -> u16 {
        (self.date >> 9) + MIN_YEAR as u16
    }

    /// Month, 1-12 for valid stamps.
    pub fn month(&self) -> u8 {
        ((self.date >> 5) & 0x0F) as u8
    }

    /// Day of month, 1-31 for valid stamps.
    pub fn day(&self) -> u8 {
        (self.date & 0x1F) as u8
    }

    /// Hour, 0-23.
    pub fn hour(&self) -> u8 {
        (self.time >> 11) as u8
    }

    /// Minute, 0-59.
    pub fn minute(&self) -> u8 {
        ((self.time >> 5) & 0x3F) as u8
    }

    /// Second, always even.
    pub fn second(&self) -> u8 {
        ((self.time & 0x1F) * 2) as u8
    }
}
