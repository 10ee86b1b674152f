//! Time bucketing for windowed summaries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

const MICROS_PER_SECOND: i64 = 1_000_000;

/// Fixed-width, epoch-aligned bucket width such as `5m`, `1h` or `1d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    seconds: i64,
}

impl TimeWindow {
    pub fn from_seconds(seconds: i64) -> Result<Self> {
        if seconds <= 0 {
            return Err(Error::InvalidInput(format!(
                "Time window must be positive, got {}s",
                seconds
            )));
        }
        Ok(Self { seconds })
    }

    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    /// Start of the half-open bucket `[start, start + width)` containing `timestamp`.
    pub fn bucket_start(&self, timestamp: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let width = self
            .seconds
            .checked_mul(MICROS_PER_SECOND)
            .ok_or_else(|| Error::InvalidInput(format!("Time window {} is too large", self)))?;

        let floored = timestamp.timestamp_micros().div_euclid(width) * width;
        DateTime::<Utc>::from_timestamp_micros(floored).ok_or_else(|| {
            Error::InvalidInput(format!(
                "Bucket start for {} is out of range",
                timestamp.to_rfc3339()
            ))
        })
    }
}

fn unit_seconds(unit: &str) -> Option<i64> {
    match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => Some(1),
        "m" | "min" | "mins" | "minute" | "minutes" | "T" => Some(60),
        "h" | "H" | "hour" | "hours" => Some(60 * 60),
        "d" | "D" | "day" | "days" => Some(24 * 60 * 60),
        "w" | "W" | "week" | "weeks" => Some(7 * 24 * 60 * 60),
        _ => None,
    }
}

impl FromStr for TimeWindow {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let invalid = || {
            Error::InvalidInput(format!(
                "Invalid time window '{}': expected e.g. '30s', '5m', '1h', '1d'",
                s
            ))
        };

        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (amount, unit) = trimmed.split_at(split);

        let amount: i64 = amount.parse().map_err(|_| invalid())?;
        let per_unit = unit_seconds(unit.trim()).ok_or_else(invalid)?;
        let seconds = amount.checked_mul(per_unit).ok_or_else(invalid)?;

        Self::from_seconds(seconds)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (amount, unit) = [(7 * 24 * 60 * 60, "w"), (24 * 60 * 60, "d"), (60 * 60, "h"), (60, "m")]
            .into_iter()
            .find(|(width, _)| self.seconds % width == 0)
            .map(|(width, unit)| (self.seconds / width, unit))
            .unwrap_or((self.seconds, "s"));
        write!(f, "{}{}", amount, unit)
    }
}

impl Serialize for TimeWindow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeWindow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_units() {
        assert_eq!("5m".parse::<TimeWindow>().unwrap().seconds(), 300);
        assert_eq!("15min".parse::<TimeWindow>().unwrap().seconds(), 900);
        assert_eq!("1h".parse::<TimeWindow>().unwrap().seconds(), 3600);
        assert_eq!("1d".parse::<TimeWindow>().unwrap().seconds(), 86_400);
        assert_eq!(" 30s ".parse::<TimeWindow>().unwrap().seconds(), 30);
    }

    #[test]
    fn test_parse_rejects_invalid() {
        for raw in ["", "m", "0m", "5", "5x", "-5m", "1.5h"] {
            assert!(
                matches!(raw.parse::<TimeWindow>(), Err(Error::InvalidInput(_))),
                "{:?} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_display_normalizes() {
        assert_eq!("60m".parse::<TimeWindow>().unwrap().to_string(), "1h");
        assert_eq!("90s".parse::<TimeWindow>().unwrap().to_string(), "90s");
    }

    #[test]
    fn test_bucket_start_floors_to_epoch_multiple() {
        let window: TimeWindow = "5m".parse().unwrap();
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 7, 42).unwrap();
        assert_eq!(
            window.bucket_start(ts).unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 5, 0).unwrap()
        );

        let boundary = Utc.with_ymd_and_hms(2025, 1, 1, 0, 10, 0).unwrap();
        assert_eq!(window.bucket_start(boundary).unwrap(), boundary);
    }

    #[test]
    fn test_bucket_start_before_epoch() {
        let window: TimeWindow = "1h".parse().unwrap();
        let ts = Utc.with_ymd_and_hms(1969, 12, 31, 23, 30, 0).unwrap();
        assert_eq!(
            window.bucket_start(ts).unwrap(),
            Utc.with_ymd_and_hms(1969, 12, 31, 23, 0, 0).unwrap()
        );
    }
}
