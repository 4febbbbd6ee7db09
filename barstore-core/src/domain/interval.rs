//! Bar interval: a fixed duration such as `5m` or `1h`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Fixed bar interval, stored in whole seconds.
///
/// The value is not validated on construction; the index builder rejects
/// intervals outside `(0, 24h]` with a configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Interval {
    secs: i64,
}

#[derive(Debug, Error, PartialEq)]
pub enum IntervalParseError {
    #[error("empty interval")]
    Empty,

    #[error("invalid interval '{0}': expected <n>m or <n>h (e.g. 5m, 1h)")]
    Invalid(String),
}

impl Interval {
    /// Longest interval the canonical index accepts.
    pub const MAX: Interval = Interval::hours(24);

    pub const fn from_secs(secs: i64) -> Self {
        Self { secs }
    }

    pub const fn minutes(n: i64) -> Self {
        Self { secs: n * 60 }
    }

    pub const fn hours(n: i64) -> Self {
        Self { secs: n * 3600 }
    }

    pub fn as_secs(&self) -> i64 {
        self.secs
    }

    /// Positive and no longer than [`Interval::MAX`].
    pub fn is_intraday(&self) -> bool {
        self.secs > 0 && self.secs <= Self::MAX.secs
    }

    /// Saturates at `chrono::Duration::MAX` for out-of-range values.
    pub fn as_duration(&self) -> chrono::Duration {
        chrono::Duration::try_seconds(self.secs).unwrap_or(chrono::Duration::MAX)
    }

    /// Yahoo chart API interval code, if the provider supports this interval.
    pub fn yahoo_code(&self) -> Option<&'static str> {
        match self.secs {
            60 => Some("1m"),
            120 => Some("2m"),
            300 => Some("5m"),
            900 => Some("15m"),
            1800 => Some("30m"),
            3600 => Some("60m"),
            5400 => Some("90m"),
            _ => None,
        }
    }
}

impl FromStr for Interval {
    type Err = IntervalParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(IntervalParseError::Empty);
        }
        let unit_len = s.chars().last().map_or(0, char::len_utf8);
        let (digits, unit) = s.split_at(s.len() - unit_len);
        let invalid = || IntervalParseError::Invalid(s.to_string());
        let n: i64 = digits.parse().map_err(|_| invalid())?;
        let unit_secs = match unit {
            "m" => 60,
            "h" => 3600,
            _ => return Err(invalid()),
        };
        n.checked_mul(unit_secs)
            .map(Interval::from_secs)
            .ok_or_else(invalid)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.secs != 0 && self.secs % 3600 == 0 {
            write!(f, "{}h", self.secs / 3600)
        } else if self.secs % 60 == 0 {
            write!(f, "{}m", self.secs / 60)
        } else {
            write!(f, "{}s", self.secs)
        }
    }
}

impl TryFrom<String> for Interval {
    type Error = IntervalParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(value: Interval) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minutes_and_hours() {
        assert_eq!("5m".parse::<Interval>().unwrap(), Interval::minutes(5));
        assert_eq!("1h".parse::<Interval>().unwrap(), Interval::hours(1));
        assert_eq!("15m".parse::<Interval>().unwrap().as_secs(), 900);
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!("".parse::<Interval>(), Err(IntervalParseError::Empty));
        assert!("5d".parse::<Interval>().is_err());
        assert!("m".parse::<Interval>().is_err());
        assert!("five".parse::<Interval>().is_err());
    }

    #[test]
    fn overflowing_count_is_rejected_not_panicking() {
        assert_eq!(
            "200000000000000000m".parse::<Interval>(),
            Err(IntervalParseError::Invalid("200000000000000000m".into()))
        );
        assert!("9223372036854775807h".parse::<Interval>().is_err());
    }

    #[test]
    fn intraday_bounds() {
        assert!(Interval::minutes(1).is_intraday());
        assert!(Interval::hours(24).is_intraday());
        assert!(!Interval::minutes(24 * 60 + 1).is_intraday());
        assert!(!Interval::from_secs(0).is_intraday());
        assert!(!"1000000000000m".parse::<Interval>().unwrap().is_intraday());
    }

    #[test]
    fn huge_interval_duration_saturates() {
        assert_eq!(Interval::from_secs(i64::MAX).as_duration(), chrono::Duration::MAX);
    }

    #[test]
    fn display_roundtrips() {
        for s in ["1m", "5m", "90m", "2h"] {
            assert_eq!(s.parse::<Interval>().unwrap().to_string(), s);
        }
        // 60m renders as the hour form
        assert_eq!(Interval::minutes(60).to_string(), "1h");
    }

    #[test]
    fn yahoo_codes() {
        assert_eq!(Interval::minutes(5).yahoo_code(), Some("5m"));
        assert_eq!(Interval::hours(1).yahoo_code(), Some("60m"));
        assert_eq!(Interval::minutes(7).yahoo_code(), None);
    }
}
