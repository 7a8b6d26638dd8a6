//! CF time-axis decoding: `<unit> since <reference>` plus a calendar.

use std::str::FromStr;

use chrono::{Datelike, NaiveDate};

use cmipdrs_core::RecoveredDate;

use crate::error::ReadError;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Decoded dates beyond this many years from the reference are rejected.
const MAX_YEAR_SPAN: f64 = 100_000.0;

const NOLEAP_MONTHS: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
const ALL_LEAP_MONTHS: [u32; 12] = [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Days,
    Hours,
    Minutes,
    Seconds,
}

impl TimeUnit {
    fn seconds(self) -> f64 {
        match self {
            TimeUnit::Days => SECONDS_PER_DAY,
            TimeUnit::Hours => 3_600.0,
            TimeUnit::Minutes => 60.0,
            TimeUnit::Seconds => 1.0,
        }
    }

    fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "days" | "day" | "d" => Some(TimeUnit::Days),
            "hours" | "hour" | "hrs" | "hr" | "h" => Some(TimeUnit::Hours),
            "minutes" | "minute" | "mins" | "min" => Some(TimeUnit::Minutes),
            "seconds" | "second" | "secs" | "sec" | "s" => Some(TimeUnit::Seconds),
            _ => None,
        }
    }
}

/// Calendars a time axis may declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Calendar {
    /// `standard`, `gregorian` and `proleptic_gregorian`, all decoded with
    /// proleptic Gregorian arithmetic.
    #[default]
    Gregorian,
    NoLeap,
    AllLeap,
    Day360,
}

impl FromStr for Calendar {
    type Err = ReadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" | "gregorian" | "proleptic_gregorian" => Ok(Calendar::Gregorian),
            "noleap" | "365_day" => Ok(Calendar::NoLeap),
            "all_leap" | "366_day" => Ok(Calendar::AllLeap),
            "360_day" => Ok(Calendar::Day360),
            _ => Err(ReadError::UnsupportedCalendar {
                calendar: s.to_string(),
            }),
        }
    }
}

impl Calendar {
    fn month_lengths(self, year: i32) -> [u32; 12] {
        match self {
            Calendar::Gregorian if is_gregorian_leap(year) => ALL_LEAP_MONTHS,
            Calendar::Gregorian | Calendar::NoLeap => NOLEAP_MONTHS,
            Calendar::AllLeap => ALL_LEAP_MONTHS,
            Calendar::Day360 => [30; 12],
        }
    }

    fn is_valid(self, year: i32, month: u32, day: u32) -> bool {
        (1..=12).contains(&month) && day >= 1 && day <= self.month_lengths(year)[month as usize - 1]
    }

    /// Day number of a date, counted from year 0 in fixed-length calendars.
    fn day_number(self, year: i32, month: u32, day: u32) -> Option<i64> {
        match self {
            Calendar::Gregorian => {
                NaiveDate::from_ymd_opt(year, month, day).map(|d| d.num_days_from_ce() as i64)
            }
            _ => {
                let lengths = self.month_lengths(year);
                let year_len: u32 = lengths.iter().sum();
                let before: u32 = lengths[..month as usize - 1].iter().sum();
                Some(year as i64 * year_len as i64 + before as i64 + day as i64 - 1)
            }
        }
    }

    fn from_day_number(self, n: i64) -> Option<RecoveredDate> {
        match self {
            Calendar::Gregorian => {
                let days = i32::try_from(n).ok()?;
                let date = NaiveDate::from_num_days_from_ce_opt(days)?;
                Some(RecoveredDate::new(date.year(), date.month(), date.day()))
            }
            _ => {
                let lengths = self.month_lengths(0);
                let year_len: i64 = lengths.iter().map(|&d| d as i64).sum();
                let year = i32::try_from(n.div_euclid(year_len)).ok()?;
                let mut remaining = n.rem_euclid(year_len) as u32;
                for (i, len) in lengths.iter().enumerate() {
                    if remaining < *len {
                        return Some(RecoveredDate::new(year, i as u32 + 1, remaining + 1));
                    }
                    remaining -= len;
                }
                None
            }
        }
    }
}

fn is_gregorian_leap(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Parsed `<unit> since <reference>` string.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeUnits {
    pub unit: TimeUnit,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    /// Seconds past midnight on the reference day.
    pub seconds_of_day: f64,
}

impl FromStr for TimeUnits {
    type Err = ReadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ReadError::BadTimeUnits {
            units: s.to_string(),
        };
        let mut words = s.split_whitespace();
        let unit = words.next().and_then(TimeUnit::parse).ok_or_else(bad)?;
        if !words.next().is_some_and(|w| w.eq_ignore_ascii_case("since")) {
            return Err(bad());
        }
        let reference = words.next().ok_or_else(bad)?;

        // `2001-01-01T00:00:00Z` carries the clock in the same word.
        let (date_part, inline_clock) = match reference.split_once('T') {
            Some((date, clock)) => (date, Some(clock.trim_end_matches('Z'))),
            None => (reference, None),
        };
        let mut fields = date_part.splitn(3, '-');
        let year: i32 = fields.next().and_then(|f| f.parse().ok()).ok_or_else(bad)?;
        let month: u32 = fields.next().and_then(|f| f.parse().ok()).ok_or_else(bad)?;
        let day: u32 = fields.next().and_then(|f| f.parse().ok()).ok_or_else(bad)?;

        let clock = inline_clock.or_else(|| words.next().filter(|w| w.contains(':')));
        let seconds_of_day = match clock {
            Some(clock) => parse_clock(clock).ok_or_else(bad)?,
            None => 0.0,
        };

        Ok(Self {
            unit,
            year,
            month,
            day,
            seconds_of_day,
        })
    }
}

/// `H:M[:S[.f]]`
fn parse_clock(clock: &str) -> Option<f64> {
    let mut parts = clock.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes = match parts.next() {
        Some(m) => m.parse::<f64>().ok()?,
        None => 0.0,
    };
    let seconds = match parts.next() {
        Some(s) => s.parse::<f64>().ok()?,
        None => 0.0,
    };
    Some(hours * 3_600.0 + minutes * 60.0 + seconds)
}

impl TimeUnits {
    /// Calendar date of a time coordinate value.
    pub fn decode(&self, value: f64, calendar: Calendar) -> Result<RecoveredDate, ReadError> {
        let out_of_range = || ReadError::TimeOutOfRange { value };
        if !calendar.is_valid(self.year, self.month, self.day) {
            return Err(ReadError::BadTimeUnits {
                units: format!("reference {}-{}-{}", self.year, self.month, self.day),
            });
        }

        let offset_days = (self.seconds_of_day + value * self.unit.seconds()) / SECONDS_PER_DAY;
        if !offset_days.is_finite() || offset_days.abs() > MAX_YEAR_SPAN * 366.0 {
            return Err(out_of_range());
        }

        let reference = calendar
            .day_number(self.year, self.month, self.day)
            .ok_or_else(out_of_range)?;
        calendar
            .from_day_number(reference + offset_days.floor() as i64)
            .ok_or_else(out_of_range)
    }
}

/// Decode with an explicit calendar name (`None` means `standard`).
pub fn decode_time(
    value: f64,
    units: &str,
    calendar: Option<&str>,
) -> Result<RecoveredDate, ReadError> {
    let units: TimeUnits = units.parse()?;
    let calendar = match calendar {
        Some(name) => name.parse()?,
        None => Calendar::default(),
    };
    units.decode(value, calendar)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        let units: TimeUnits = "days since 1850-1-1".parse().unwrap();
        assert_eq!(units.unit, TimeUnit::Days);
        assert_eq!((units.year, units.month, units.day), (1850, 1, 1));
        assert_eq!(units.seconds_of_day, 0.0);

        let units: TimeUnits = "hours since 2001-01-01 12:30:00.0".parse().unwrap();
        assert_eq!(units.unit, TimeUnit::Hours);
        assert_eq!(units.seconds_of_day, 45_000.0);

        let units: TimeUnits = "seconds since 2001-01-01T06:00:00Z".parse().unwrap();
        assert_eq!(units.seconds_of_day, 21_600.0);
    }

    #[test]
    fn test_bad_units() {
        assert!(matches!(
            "days since 20O1-1-1".parse::<TimeUnits>(),
            Err(ReadError::BadTimeUnits { .. })
        ));
        assert!("months since 2001-1-1".parse::<TimeUnits>().is_err());
        assert!("days after 2001-1-1".parse::<TimeUnits>().is_err());
        assert!("days".parse::<TimeUnits>().is_err());
    }

    #[test]
    fn test_gregorian_decode() {
        assert_eq!(
            decode_time(15.5, "days since 1860-01-01", None).unwrap(),
            RecoveredDate::new(1860, 1, 16)
        );
        // 2000 is a leap year.
        assert_eq!(
            decode_time(59.0, "days since 2000-01-01", Some("gregorian")).unwrap(),
            RecoveredDate::new(2000, 2, 29)
        );
        assert_eq!(
            decode_time(-1.0, "days since 2000-01-01", Some("standard")).unwrap(),
            RecoveredDate::new(1999, 12, 31)
        );
        assert_eq!(
            decode_time(36.0, "hours since 2001-01-01 00:00:00", None).unwrap(),
            RecoveredDate::new(2001, 1, 2)
        );
    }

    #[test]
    fn test_noleap_decode() {
        assert_eq!(
            decode_time(59.0, "days since 2000-01-01", Some("noleap")).unwrap(),
            RecoveredDate::new(2000, 3, 1)
        );
        assert_eq!(
            decode_time(365.0 * 140.0 - 1.0, "days since 1860-01-01", Some("365_day")).unwrap(),
            RecoveredDate::new(1999, 12, 31)
        );
        assert_eq!(
            decode_time(-1.0, "days since 0001-01-01", Some("noleap")).unwrap(),
            RecoveredDate::new(0, 12, 31)
        );
    }

    #[test]
    fn test_all_leap_decode() {
        assert_eq!(
            decode_time(59.0, "days since 2001-01-01", Some("all_leap")).unwrap(),
            RecoveredDate::new(2001, 2, 29)
        );
    }

    #[test]
    fn test_360_day_decode() {
        assert_eq!(
            decode_time(59.0, "days since 2001-01-01", Some("360_day")).unwrap(),
            RecoveredDate::new(2001, 2, 30)
        );
        assert_eq!(
            decode_time(360.0, "days since 2001-01-01", Some("360_day")).unwrap(),
            RecoveredDate::new(2002, 1, 1)
        );
    }

    #[test]
    fn test_unsupported_calendar() {
        assert!(matches!(
            decode_time(0.0, "days since 2001-01-01", Some("julian")),
            Err(ReadError::UnsupportedCalendar { .. })
        ));
    }

    #[test]
    fn test_out_of_range() {
        assert!(matches!(
            decode_time(f64::NAN, "days since 2001-01-01", None),
            Err(ReadError::TimeOutOfRange { .. })
        ));
        assert!(matches!(
            decode_time(1e20, "days since 2001-01-01", None),
            Err(ReadError::TimeOutOfRange { .. })
        ));
    }

    #[test]
    fn test_invalid_reference_day() {
        assert!(decode_time(0.0, "days since 2001-02-30", None).is_err());
        assert!(decode_time(0.0, "days since 2001-02-30", Some("360_day")).is_ok());
    }
}
