//! Wide multi-ticker bar frame: one timestamp axis, one column per (ticker, field).
//!
//! The same type carries a freshly combined update and the persisted store
//! contents. Cells are `Option<f64>`; a combined frame never has nulls, a
//! store may have nulls only in columns added by schema widening.

use super::field::ColumnKey;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("timestamps not strictly increasing at row {row}: {prev} >= {next}")]
    NotStrictlyIncreasing {
        row: usize,
        prev: DateTime<Utc>,
        next: DateTime<Utc>,
    },

    #[error("column {key} has {actual} rows, expected {expected}")]
    LengthMismatch {
        key: String,
        expected: usize,
        actual: usize,
    },
}

/// Multi-ticker frame keyed by (timestamp, ticker, field).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BarFrame {
    timestamps: Vec<DateTime<Utc>>,
    columns: BTreeMap<ColumnKey, Vec<Option<f64>>>,
}

impl BarFrame {
    /// Build a frame, checking the timestamp axis is strictly increasing and
    /// every column has one cell per timestamp.
    pub fn new(
        timestamps: Vec<DateTime<Utc>>,
        columns: BTreeMap<ColumnKey, Vec<Option<f64>>>,
    ) -> Result<Self, FrameError> {
        for (row, pair) in timestamps.windows(2).enumerate() {
            if pair[0] >= pair[1] {
                return Err(FrameError::NotStrictlyIncreasing {
                    row: row + 1,
                    prev: pair[0],
                    next: pair[1],
                });
            }
        }
        for (key, cells) in &columns {
            if cells.len() != timestamps.len() {
                return Err(FrameError::LengthMismatch {
                    key: key.to_string(),
                    expected: timestamps.len(),
                    actual: cells.len(),
                });
            }
        }
        Ok(Self {
            timestamps,
            columns,
        })
    }

    /// Number of rows (timestamps).
    pub fn height(&self) -> usize {
        self.timestamps.len()
    }

    /// Number of (ticker, field) columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn columns(&self) -> &BTreeMap<ColumnKey, Vec<Option<f64>>> {
        &self.columns
    }

    pub fn column(&self, key: &ColumnKey) -> Option<&[Option<f64>]> {
        self.columns.get(key).map(|c| c.as_slice())
    }

    pub fn column_keys(&self) -> BTreeSet<ColumnKey> {
        self.columns.keys().cloned().collect()
    }

    /// Distinct tickers, sorted.
    pub fn tickers(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self.columns.keys().map(|k| k.ticker.as_str()).collect();
        set.into_iter().map(String::from).collect()
    }

    /// Row index of a timestamp, if present.
    pub fn row_of(&self, ts: DateTime<Utc>) -> Option<usize> {
        self.timestamps.binary_search(&ts).ok()
    }

    /// Cell value at (timestamp, column). `None` if absent or null.
    pub fn value(&self, ts: DateTime<Utc>, key: &ColumnKey) -> Option<f64> {
        let row = self.row_of(ts)?;
        self.columns.get(key)?.get(row).copied().flatten()
    }

    /// Total number of null cells.
    pub fn null_count(&self) -> usize {
        self.columns
            .values()
            .map(|c| c.iter().filter(|v| v.is_none()).count())
            .sum()
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamps.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamps.last().copied()
    }

    pub fn into_parts(self) -> (Vec<DateTime<Utc>>, BTreeMap<ColumnKey, Vec<Option<f64>>>) {
        (self.timestamps, self.columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Field;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn close_column(ticker: &str, values: &[f64]) -> (ColumnKey, Vec<Option<f64>>) {
        (
            ColumnKey::new(ticker, Field::Close),
            values.iter().copied().map(Some).collect(),
        )
    }

    #[test]
    fn rejects_unsorted_axis() {
        let err = BarFrame::new(vec![ts(10), ts(5)], BTreeMap::new()).unwrap_err();
        assert!(matches!(err, FrameError::NotStrictlyIncreasing { row: 1, .. }));
    }

    #[test]
    fn rejects_duplicate_timestamps() {
        assert!(BarFrame::new(vec![ts(10), ts(10)], BTreeMap::new()).is_err());
    }

    #[test]
    fn rejects_short_column() {
        let columns = BTreeMap::from([close_column("SPY", &[1.0])]);
        let err = BarFrame::new(vec![ts(1), ts(2)], columns).unwrap_err();
        assert!(matches!(
            err,
            FrameError::LengthMismatch {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn lookup_by_timestamp_and_key() {
        let columns = BTreeMap::from([close_column("SPY", &[1.0, 2.0]), close_column("QQQ", &[3.0, 4.0])]);
        let frame = BarFrame::new(vec![ts(1), ts(2)], columns).unwrap();

        assert_eq!(frame.height(), 2);
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.tickers(), vec!["QQQ".to_string(), "SPY".to_string()]);
        assert_eq!(frame.value(ts(2), &ColumnKey::new("SPY", Field::Close)), Some(2.0));
        assert_eq!(frame.value(ts(3), &ColumnKey::new("SPY", Field::Close)), None);
        assert_eq!(frame.null_count(), 0);
    }
}
