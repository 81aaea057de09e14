//! Timestamp encodings used by the save object.
//!
//! Packed timestamps are a single big-endian `u32`:
//!
//! ```text
//!  31 30        20 19  16 15   11 10    6 5      0
//! +--+------------+------+-------+-------+--------+
//! |  |  year (11) | mon  | day   | hour  | minute |
//! +--+------------+------+-------+-------+--------+
//! ```
//!
//! `mon` is zero based. Records that were never written decode to garbage,
//! so every field is clamped before it becomes a calendar value.

use std::fmt;

use jiff::civil::{Date, DateTime, Time};
use serde::Serialize;

pub const MIN_YEAR: i16 = 2006;
pub const MAX_YEAR: i16 = 2030;
pub const DEFAULT_YEAR: i16 = 2020;

const DEFAULT_DATE: Date = Date::constant(DEFAULT_YEAR, 1, 1);

/// Raw fields of a packed timestamp, before any validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedDate {
    pub year: u16,
    /// one based
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
}

impl PackedDate {
    pub fn from_raw(raw: u32) -> Self {
        Self {
            year: ((raw >> 20) & 0x7FF) as u16,
            month: ((raw >> 16) & 0xF) as u8 + 1,
            day: ((raw >> 11) & 0x1F) as u8,
            hour: ((raw >> 6) & 0x1F) as u8,
            minute: (raw & 0x3F) as u8,
        }
    }

    /// Packs the fields back into the save encoding. Fields wider than their
    /// bit range are masked, so out-of-range input survives only as far as
    /// the encoding can carry it.
    pub fn to_raw(self) -> u32 {
        ((self.year as u32 & 0x7FF) << 20)
            | ((self.month.wrapping_sub(1) as u32 & 0xF) << 16)
            | ((self.day as u32 & 0x1F) << 11)
            | ((self.hour as u32 & 0x1F) << 6)
            | (self.minute as u32 & 0x3F)
    }

    /// True when every field is inside its calendar range without clamping.
    pub fn is_plausible(&self) -> bool {
        (MIN_YEAR as u16..=MAX_YEAR as u16).contains(&self.year)
            && (1..=12).contains(&self.month)
            && (1..=31).contains(&self.day)
            && self.hour <= 23
            && self.minute <= 59
    }

    /// Converts to a civil date-time, replacing implausible fields with
    /// defaults instead of failing.
    pub fn to_datetime(self) -> DateTime {
        let year = match self.year as i16 {
            y if (MIN_YEAR..=MAX_YEAR).contains(&y) => y,
            _ => DEFAULT_YEAR,
        };
        let month = match self.month {
            m @ 1..=12 => m as i8,
            _ => 1,
        };
        let day = match self.day {
            d @ 1..=31 => d as i8,
            _ => 1,
        };
        let hour = if self.hour <= 23 { self.hour as i8 } else { 0 };
        let minute = if self.minute <= 59 { self.minute as i8 } else { 0 };

        let first = Date::new(year, month, 1).unwrap_or(DEFAULT_DATE);
        // day 31 in a 30 day month
        let date = Date::new(year, month, day.min(first.days_in_month())).unwrap_or(first);
        let time = Time::new(hour, minute, 0, 0).unwrap_or(Time::midnight());
        date.to_datetime(time)
    }
}

pub fn unpack_timestamp(raw: u32) -> DateTime {
    PackedDate::from_raw(raw).to_datetime()
}

/// Date of birth as stored: BCD digits, not validated as a calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BirthDate {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl BirthDate {
    /// Decodes `YY YY MM DD` where every nibble is one decimal digit.
    pub fn from_bcd(bytes: [u8; 4]) -> Self {
        Self {
            year: bcd_byte(bytes[0]) as u16 * 100 + bcd_byte(bytes[1]) as u16,
            month: bcd_byte(bytes[2]),
            day: bcd_byte(bytes[3]),
        }
    }

    pub fn to_date(self) -> Option<Date> {
        Date::new(i16::try_from(self.year).ok()?, self.month as i8, self.day as i8).ok()
    }
}

impl fmt::Display for BirthDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

fn bcd_byte(b: u8) -> u8 {
    (b >> 4) * 10 + (b & 0xF)
}

#[cfg(test)]
mod tests {
    use jiff::civil::datetime;

    use super::*;

    #[test]
    fn test_known_timestamp() {
        assert_eq!(unpack_timestamp(0x7E7455CF), datetime(2023, 5, 10, 23, 15, 0, 0));
    }

    #[test]
    fn test_pack_unpack() {
        let packed = PackedDate {
            year: 2019,
            month: 12,
            day: 31,
            hour: 7,
            minute: 59,
        };
        let raw = packed.to_raw();
        assert_eq!(PackedDate::from_raw(raw), packed);
        assert_eq!(unpack_timestamp(raw), datetime(2019, 12, 31, 7, 59, 0, 0));
    }

    #[test]
    fn test_month_13_defaults_to_january() {
        let raw = PackedDate {
            year: 2021,
            month: 13,
            day: 4,
            hour: 10,
            minute: 30,
        }
        .to_raw();
        let unpacked = PackedDate::from_raw(raw);
        assert_eq!(unpacked.month, 13);
        assert!(!unpacked.is_plausible());
        assert_eq!(unpack_timestamp(raw), datetime(2021, 1, 4, 10, 30, 0, 0));
    }

    #[test]
    fn test_zeroed_record_is_safe() {
        assert_eq!(unpack_timestamp(0), datetime(2020, 1, 1, 0, 0, 0, 0));
        // month 16, day 31, hour 31, minute 63
        assert_eq!(unpack_timestamp(u32::MAX), datetime(2020, 1, 31, 0, 0, 0, 0));
    }

    #[test]
    fn test_out_of_range_time_fields() {
        let raw = PackedDate {
            year: 2010,
            month: 6,
            day: 15,
            hour: 25,
            minute: 61,
        }
        .to_raw();
        assert_eq!(unpack_timestamp(raw), datetime(2010, 6, 15, 0, 0, 0, 0));
    }

    #[test]
    fn test_day_past_month_end_is_clamped() {
        let raw = PackedDate {
            year: 2023,
            month: 2,
            day: 31,
            hour: 12,
            minute: 0,
        }
        .to_raw();
        assert_eq!(unpack_timestamp(raw), datetime(2023, 2, 28, 12, 0, 0, 0));
    }

    #[test]
    fn test_bcd_birth_date() {
        let dob = BirthDate::from_bcd([0x19, 0x85, 0x07, 0x23]);
        assert_eq!(
            dob,
            BirthDate {
                year: 1985,
                month: 7,
                day: 23
            }
        );
        assert_eq!(dob.to_string(), "1985-07-23");
        assert_eq!(dob.to_date(), Some(jiff::civil::date(1985, 7, 23)));
    }

    #[test]
    fn test_unset_birth_date_still_formats() {
        let dob = BirthDate::from_bcd([0, 0, 0, 0]);
        assert_eq!(dob.to_string(), "0000-00-00");
        assert_eq!(dob.to_date(), None);
    }
}
