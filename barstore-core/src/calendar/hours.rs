//! Daily market open/close in a fixed exchange timezone.

use super::ConfigError;
use chrono::{DateTime, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

const US_OPEN: NaiveTime = clock_const(9, 30);
const US_CLOSE: NaiveTime = clock_const(16, 0);

/// Compile-time clock time; an invalid constant fails the build.
const fn clock_const(hour: u32, min: u32) -> NaiveTime {
    match NaiveTime::from_hms_opt(hour, min, 0) {
        Some(time) => time,
        None => panic!("invalid clock constant"),
    }
}

/// Regular session hours. Timestamps outside `[open, close)` are not on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketHours {
    pub timezone: Tz,
    #[serde(with = "clock")]
    pub open: NaiveTime,
    #[serde(with = "clock")]
    pub close: NaiveTime,
}

impl MarketHours {
    pub fn new(timezone: Tz, open: NaiveTime, close: NaiveTime) -> Result<Self, ConfigError> {
        let hours = Self {
            timezone,
            open,
            close,
        };
        hours.validate()?;
        Ok(hours)
    }

    /// US equities: 09:30-16:00 America/New_York.
    pub fn us_equity() -> Self {
        Self {
            timezone: chrono_tz::America::New_York,
            open: US_OPEN,
            close: US_CLOSE,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.open >= self.close {
            return Err(ConfigError::InvalidHours {
                open: self.open,
                close: self.close,
            });
        }
        Ok(())
    }

    /// Resolve an exchange-local wall-clock time to a UTC instant.
    ///
    /// Ambiguous local times (DST fall-back) resolve to the earlier instant;
    /// non-existent local times (DST spring-forward gap) yield `None`.
    pub fn localize(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
        match self.timezone.from_local_datetime(&date.and_time(time)) {
            LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
            LocalResult::None => None,
        }
    }

    /// Exchange-local calendar date of an instant.
    pub fn session_date(&self, ts: DateTime<Utc>) -> NaiveDate {
        ts.with_timezone(&self.timezone).date_naive()
    }

    /// Exchange-local time of day of an instant.
    pub fn time_of_day(&self, ts: DateTime<Utc>) -> NaiveTime {
        ts.with_timezone(&self.timezone).time()
    }

    /// Whether an instant falls within `[open, close)` local time.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        let t = self.time_of_day(ts);
        t >= self.open && t < self.close
    }
}

impl Default for MarketHours {
    fn default() -> Self {
        Self::us_equity()
    }
}

/// `HH:MM` (seconds optional on input) serde for clock times.
mod clock {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(|e| serde::de::Error::custom(format!("invalid clock time '{raw}': {e}")))
    }
}
