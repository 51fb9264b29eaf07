//! Wall-clock `HH:MM` times.
//!
//! Timetables and observed arrivals are compared on a same-day clock with
//! minute resolution; dates are ignored.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDateTime, Timelike};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AnalysisError;

const MINUTES_PER_DAY: u32 = 24 * 60;
const NANOS_PER_MINUTE: u64 = 60_000_000_000;

/// A time of day with minute resolution, `00:00` to `23:59`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime {
    minutes: u16,
}

impl ClockTime {
    /// `None` unless `hour < 24` and `minute < 60`.
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        if hour >= 24 || minute >= 60 {
            return None;
        }
        Some(Self { minutes: (hour * 60 + minute) as u16 })
    }

    /// Round a timestamp to the nearest minute and drop its date.
    ///
    /// Exactly half a minute rounds to the even minute, so `10:00:30` becomes
    /// `10:00` and `10:01:30` becomes `10:02`. `23:59:45` wraps to `00:00`.
    pub fn rounded(datetime: &NaiveDateTime) -> Self {
        let time = datetime.time();
        let mut minutes = time.num_seconds_from_midnight() / 60;
        // Leap seconds carry nanoseconds >= 1e9
        let remainder = (time.second() % 60) as u64 * 1_000_000_000 + time.nanosecond() as u64;
        let half = NANOS_PER_MINUTE / 2;
        if remainder > half || (remainder == half && minutes % 2 == 1) {
            minutes += 1;
        }
        Self { minutes: (minutes % MINUTES_PER_DAY) as u16 }
    }

    pub fn hour(&self) -> u32 {
        self.minutes as u32 / 60
    }

    pub fn minute(&self) -> u32 {
        self.minutes as u32 % 60
    }

    /// Signed minutes from `self` to `other` on the same day.
    pub fn minutes_until(&self, other: ClockTime) -> i64 {
        other.minutes as i64 - self.minutes as i64
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for ClockTime {
    type Err = AnalysisError;

    /// Parses `H:MM` or `HH:MM`. Hours past midnight (`24:15`, `25:40`) wrap
    /// into the same day.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AnalysisError::InvalidClockTime(s.to_string());

        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        let digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if hour.is_empty() || minute.len() != 2 || !digits(hour) || !digits(minute) {
            return Err(invalid());
        }
        let hour: u32 = hour.parse().map_err(|_| invalid())?;
        let minute: u32 = minute.parse().map_err(|_| invalid())?;

        Self::new(hour % 24, minute).ok_or_else(invalid)
    }
}

impl Serialize for ClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        let t: ClockTime = "5:07".parse().unwrap();
        assert_eq!(t.hour(), 5);
        assert_eq!(t.minute(), 7);
        assert_eq!(t.to_string(), "05:07");
        assert_eq!("10:30".parse::<ClockTime>().unwrap().to_string(), "10:30");
    }

    #[test]
    fn test_parse_wraps_past_midnight() {
        assert_eq!("25:40".parse::<ClockTime>().unwrap(), ClockTime::new(1, 40).unwrap());
        assert_eq!("24:00".parse::<ClockTime>().unwrap(), ClockTime::new(0, 0).unwrap());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "10", "10:7", "10:60", "ab:cd", ":30", "10:300", "+5:30", "10:+5", "-1:30"] {
            assert!(bad.parse::<ClockTime>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_minutes_until() {
        let scheduled = ClockTime::new(10, 30).unwrap();
        assert_eq!(scheduled.minutes_until(ClockTime::new(10, 32).unwrap()), 2);
        assert_eq!(scheduled.minutes_until(ClockTime::new(10, 25).unwrap()), -5);
        assert_eq!(scheduled.minutes_until(scheduled), 0);
    }

    #[test]
    fn test_rounded() {
        assert_eq!(ClockTime::rounded(&at("2024-01-29 10:04:29")).to_string(), "10:04");
        assert_eq!(ClockTime::rounded(&at("2024-01-29 10:04:31")).to_string(), "10:05");
        assert_eq!(ClockTime::rounded(&at("2024-01-29 10:00:30")).to_string(), "10:00");
        assert_eq!(ClockTime::rounded(&at("2024-01-29 10:01:30")).to_string(), "10:02");
        assert_eq!(ClockTime::rounded(&at("2024-01-29 23:59:45")).to_string(), "00:00");
    }

    #[test]
    fn test_serde_as_string() {
        let t = ClockTime::new(7, 5).unwrap();
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"07:05\"");
        let back: ClockTime = serde_json::from_str("\"7:05\"").unwrap();
        assert_eq!(back, t);
    }
}
