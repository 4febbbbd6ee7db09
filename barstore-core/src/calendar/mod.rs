//! Trading calendar, market hours, and the canonical intraday index.
//!
//! The calendar decides which dates are sessions; market hours fix the
//! daily open/close in the exchange timezone; the index builder combines
//! both with a bar interval into the canonical timestamp grid.

pub mod hours;
pub mod index;

pub use hours::MarketHours;
pub use index::CanonicalIndex;

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Invalid interval, hours, or configuration. Fatal: raised before any fetch.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("interval must be positive, got {secs}s")]
    NonPositiveInterval { secs: i64 },

    #[error("interval {secs}s is longer than one day")]
    IntervalTooLong { secs: i64 },

    #[error("market open {open} must be before close {close}")]
    InvalidHours { open: NaiveTime, close: NaiveTime },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Oracle for which calendar dates are trading sessions.
pub trait TradingCalendar: Send + Sync {
    fn is_trading_day(&self, date: NaiveDate) -> bool;

    /// Trading days in `[start, end)`, ascending.
    fn trading_days(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        start
            .iter_days()
            .take_while(|d| *d < end)
            .filter(|d| self.is_trading_day(*d))
            .collect()
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Monday through Friday, no holidays.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeekdayCalendar;

impl TradingCalendar for WeekdayCalendar {
    fn is_trading_day(&self, date: NaiveDate) -> bool {
        !is_weekend(date)
    }
}

/// Weekdays minus an explicit holiday list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HolidayCalendar {
    holidays: BTreeSet<NaiveDate>,
    weekends_closed: bool,
}

impl HolidayCalendar {
    pub fn new(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            holidays: holidays.into_iter().collect(),
            weekends_closed: true,
        }
    }

    /// Treat Saturdays and Sundays as sessions too (only holidays are closed).
    pub fn with_weekends_open(mut self) -> Self {
        self.weekends_closed = false;
        self
    }

    pub fn holidays(&self) -> &BTreeSet<NaiveDate> {
        &self.holidays
    }
}

impl Default for HolidayCalendar {
    fn default() -> Self {
        Self::new([])
    }
}

impl TradingCalendar for HolidayCalendar {
    fn is_trading_day(&self, date: NaiveDate) -> bool {
        !(self.weekends_closed && is_weekend(date)) && !self.holidays.contains(&date)
    }
}
