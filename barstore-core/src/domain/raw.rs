//! Raw provider output, before alignment.

use super::field::Field;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One intraday bar as delivered by a provider. Any field may be missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    pub timestamp: DateTime<Utc>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

impl RawBar {
    /// Bar with every field set.
    pub fn ohlcv(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open: Some(open),
            high: Some(high),
            low: Some(low),
            close: Some(close),
            volume: Some(volume),
        }
    }

    pub fn get(&self, field: Field) -> Option<f64> {
        let value = match field {
            Field::Open => self.open,
            Field::High => self.high,
            Field::Low => self.low,
            Field::Close => self.close,
            Field::Volume => self.volume,
        };
        // NaN from a provider is a missing value, not an observation
        value.filter(|v| !v.is_nan())
    }

    /// True if no field carries a value.
    pub fn is_empty(&self) -> bool {
        Field::ALL.iter().all(|f| self.get(*f).is_none())
    }
}

/// Provider output for one ticker over a requested range.
///
/// Timestamps are not guaranteed to be sorted, unique, or on the canonical grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTickerFrame {
    pub ticker: String,
    pub bars: Vec<RawBar>,
}

impl RawTickerFrame {
    pub fn new(ticker: impl Into<String>, bars: Vec<RawBar>) -> Self {
        Self {
            ticker: ticker.into(),
            bars,
        }
    }

    pub fn empty(ticker: impl Into<String>) -> Self {
        Self::new(ticker, Vec::new())
    }

    /// Number of bars with at least one non-missing field.
    pub fn observation_count(&self) -> usize {
        self.bars.iter().filter(|b| !b.is_empty()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_counts_as_missing() {
        let bar = RawBar {
            timestamp: DateTime::from_timestamp(0, 0).unwrap(),
            open: Some(f64::NAN),
            high: None,
            low: None,
            close: None,
            volume: None,
        };
        assert!(bar.is_empty());
        assert_eq!(bar.get(Field::Open), None);
    }

    #[test]
    fn observation_count_skips_empty_rows() {
        let ts = DateTime::from_timestamp(0, 0).unwrap();
        let frame = RawTickerFrame::new(
            "SPY",
            vec![
                RawBar::ohlcv(ts, 1.0, 2.0, 0.5, 1.5, 100.0),
                RawBar {
                    timestamp: ts,
                    open: None,
                    high: None,
                    low: None,
                    close: None,
                    volume: None,
                },
            ],
        );
        assert_eq!(frame.observation_count(), 1);
    }
}
