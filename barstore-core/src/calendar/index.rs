//! Canonical intraday index: the expected bar timestamps for a date range.

use super::{ConfigError, MarketHours, TradingCalendar};
use crate::domain::Interval;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::collections::BTreeSet;

/// Strictly increasing bar timestamps, one per interval per trading session.
///
/// Timestamps are UTC instants; the exchange timezone and interval that
/// produced them travel with the index.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalIndex {
    timestamps: Vec<DateTime<Utc>>,
    sessions: Vec<NaiveDate>,
    timezone: Tz,
    interval: Interval,
}

impl CanonicalIndex {
    /// Build the index for sessions in `[start, end)`.
    ///
    /// Each session emits `open, open + interval, ...` strictly before
    /// `close`; a trailing partial interval is not emitted. Days the
    /// calendar rejects produce nothing.
    pub fn build(
        start: NaiveDate,
        end: NaiveDate,
        interval: Interval,
        hours: &MarketHours,
        calendar: &dyn TradingCalendar,
    ) -> Result<Self, ConfigError> {
        if interval.as_secs() <= 0 {
            return Err(ConfigError::NonPositiveInterval {
                secs: interval.as_secs(),
            });
        }
        if !interval.is_intraday() {
            return Err(ConfigError::IntervalTooLong {
                secs: interval.as_secs(),
            });
        }
        hours.validate()?;

        let step = interval.as_duration();
        let mut timestamps = Vec::new();
        let mut sessions = Vec::new();

        for day in calendar.trading_days(start, end) {
            let close = day.and_time(hours.close);
            let mut local = day.and_time(hours.open);
            while local < close {
                if let Some(ts) = hours.localize(day, local.time()) {
                    if timestamps.last().map_or(true, |last| ts > *last) {
                        timestamps.push(ts);
                        sessions.push(day);
                    }
                }
                match local.checked_add_signed(step) {
                    Some(next) => local = next,
                    None => break,
                }
            }
        }

        Ok(Self {
            timestamps,
            sessions,
            timezone: hours.timezone,
            interval,
        })
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    /// Row of a timestamp on the grid (exact instant match).
    pub fn position(&self, ts: DateTime<Utc>) -> Option<usize> {
        self.timestamps.binary_search(&ts).ok()
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.position(ts).is_some()
    }

    /// Exchange-local session date of the row.
    pub fn session_of(&self, row: usize) -> Option<NaiveDate> {
        self.sessions.get(row).copied()
    }

    /// Distinct session dates, ascending.
    pub fn sessions(&self) -> Vec<NaiveDate> {
        let mut out: Vec<NaiveDate> = Vec::new();
        for day in &self.sessions {
            if out.last() != Some(day) {
                out.push(*day);
            }
        }
        out
    }

    /// A copy of this index keeping only rows whose session is in `keep`.
    pub fn retain_sessions(&self, keep: &BTreeSet<NaiveDate>) -> CanonicalIndex {
        let (timestamps, sessions) = self
            .timestamps
            .iter()
            .zip(&self.sessions)
            .filter(|(_, day)| keep.contains(day))
            .map(|(ts, day)| (*ts, *day))
            .unzip();
        CanonicalIndex {
            timestamps,
            sessions,
            timezone: self.timezone,
            interval: self.interval,
        }
    }
}
