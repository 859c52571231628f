use chrono::NaiveTime;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::BookingError;

lazy_static! {
    static ref TWELVE_HOUR: Regex =
        Regex::new(r"^(?i)(\d{1,2}):(\d{2})\s*([ap])\.?\s*m\.?$").unwrap();
    static ref TWENTY_FOUR_HOUR: Regex = Regex::new(r"^(\d{1,2}):(\d{2})$").unwrap();
}

/// Time of day of a class. Stored and exchanged in the display form
/// ("6:00 AM"), compared chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotTime {
    hour: u8,
    minute: u8,
}

impl SlotTime {
    pub fn new(hour: u8, minute: u8) -> Option<SlotTime> {
        (hour < 24 && minute < 60).then_some(SlotTime { hour, minute })
    }

    /// Parses "H:MM AM/PM" or 24-hour "HH:MM".
    pub fn parse(input: &str) -> Result<SlotTime, BookingError> {
        let invalid = || BookingError::InvalidTimeFormat(input.to_string());
        let trimmed = input.trim();

        if let Some(caps) = TWELVE_HOUR.captures(trimmed) {
            let hour: u8 = caps[1].parse().map_err(|_| invalid())?;
            let minute: u8 = caps[2].parse().map_err(|_| invalid())?;
            if !(1..=12).contains(&hour) {
                return Err(invalid());
            }
            let pm = caps[3].eq_ignore_ascii_case("p");
            let hour = match (hour, pm) {
                (12, false) => 0,
                (12, true) => 12,
                (h, false) => h,
                (h, true) => h + 12,
            };
            return SlotTime::new(hour, minute).ok_or_else(invalid);
        }

        if let Some(caps) = TWENTY_FOUR_HOUR.captures(trimmed) {
            let hour: u8 = caps[1].parse().map_err(|_| invalid())?;
            let minute: u8 = caps[2].parse().map_err(|_| invalid())?;
            return SlotTime::new(hour, minute).ok_or_else(invalid);
        }

        Err(invalid())
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn to_naive(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour as u32, self.minute as u32, 0).unwrap_or(NaiveTime::MIN)
    }
}

impl fmt::Display for SlotTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let meridiem = if self.hour < 12 { "AM" } else { "PM" };
        let hour = match self.hour % 12 {
            0 => 12,
            h => h,
        };
        write!(f, "{}:{:02} {}", hour, self.minute, meridiem)
    }
}

impl std::str::FromStr for SlotTime {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SlotTime::parse(s)
    }
}

impl Serialize for SlotTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SlotTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        SlotTime::parse(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("6:00 AM", 6, 0)]
    #[test_case("06:00 AM", 6, 0)]
    #[test_case("12:00 AM", 0, 0)]
    #[test_case("12:30 PM", 12, 30)]
    #[test_case("7:45 pm", 19, 45)]
    #[test_case("9:15PM", 21, 15)]
    #[test_case("8:00 a.m.", 8, 0)]
    #[test_case("18:30", 18, 30)]
    #[test_case("0:05", 0, 5)]
    fn parses_display_and_24h_forms(input: &str, hour: u8, minute: u8) {
        let time = SlotTime::parse(input).unwrap();
        assert_eq!((time.hour(), time.minute()), (hour, minute));
    }

    #[test_case("")]
    #[test_case("6 AM")]
    #[test_case("13:00 PM")]
    #[test_case("0:30 AM")]
    #[test_case("6:60 AM")]
    #[test_case("24:00")]
    #[test_case("6:0 AM")]
    #[test_case("six o'clock")]
    fn rejects_malformed_times(input: &str) {
        assert!(matches!(
            SlotTime::parse(input),
            Err(BookingError::InvalidTimeFormat(_))
        ));
    }

    #[test]
    fn canonical_display_strings_survive_a_round_trip() {
        for hour in 0..24u8 {
            for minute in [0u8, 15, 30, 45] {
                let canonical = SlotTime::new(hour, minute).unwrap().to_string();
                assert_eq!(SlotTime::parse(&canonical).unwrap().to_string(), canonical);
            }
        }
    }

    #[test]
    fn orders_chronologically_not_lexically() {
        let early = SlotTime::parse("9:00 AM").unwrap();
        let late = SlotTime::parse("10:00 AM").unwrap();
        let evening = SlotTime::parse("1:00 PM").unwrap();
        assert!(early < late && late < evening);
    }

    #[test]
    fn serializes_as_display_string() {
        let time = SlotTime::parse("17:00").unwrap();
        assert_eq!(serde_json::to_string(&time).unwrap(), "\"5:00 PM\"");
        let back: SlotTime = serde_json::from_str("\"5:00 PM\"").unwrap();
        assert_eq!(back, time);
    }
}
