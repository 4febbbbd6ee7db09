//! Multi-ticker combiner: per-ticker aligned frames into one wide frame.
//!
//! Pure reshape. Every input must sit on the same canonical index, so the
//! combined frame's timestamp axis is exactly that index.

use super::align::AlignedTickerFrame;
use crate::calendar::CanonicalIndex;
use crate::domain::{BarFrame, ColumnKey, Field, FrameError};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CombineError {
    #[error("{ticker} is not aligned to the canonical index: {expected} rows expected, got {actual}")]
    IndexMismatch {
        ticker: String,
        expected: usize,
        actual: usize,
    },

    #[error("ticker {0} appears more than once")]
    DuplicateTicker(String),

    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Combine aligned frames into a frame with columns `tickers x fields`.
pub fn combine(
    index: &CanonicalIndex,
    frames: Vec<AlignedTickerFrame>,
) -> Result<BarFrame, CombineError> {
    let mut seen = BTreeSet::new();
    let mut columns = BTreeMap::new();

    for frame in frames {
        if !seen.insert(frame.ticker().to_string()) {
            return Err(CombineError::DuplicateTicker(frame.ticker().to_string()));
        }
        if frame.timestamps() != index.timestamps() {
            return Err(CombineError::IndexMismatch {
                ticker: frame.ticker().to_string(),
                expected: index.len(),
                actual: frame.len(),
            });
        }

        let (ticker, _, values) = frame.into_columns();
        for (field, cells) in Field::ALL.into_iter().zip(values) {
            columns.insert(
                ColumnKey::new(ticker.clone(), field),
                cells.into_iter().map(Some).collect::<Vec<_>>(),
            );
        }
    }

    Ok(BarFrame::new(index.timestamps().to_vec(), columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{MarketHours, WeekdayCalendar};
    use crate::data::align::align_ticker;
    use crate::domain::{Interval, RawBar, RawTickerFrame};
    use chrono::{NaiveDate, NaiveTime};

    fn index(days: u32) -> CanonicalIndex {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        CanonicalIndex::build(
            start,
            start + chrono::Days::new(days.into()),
            Interval::minutes(30),
            &MarketHours::us_equity(),
            &WeekdayCalendar,
        )
        .unwrap()
    }

    fn aligned(ticker: &str, index: &CanonicalIndex, price: f64) -> AlignedTickerFrame {
        let first = index.timestamps()[0];
        let raw = RawTickerFrame::new(ticker, vec![RawBar::ohlcv(first, price, price, price, price, 1.0)]);
        align_ticker(&raw, index).unwrap()
    }

    #[test]
    fn columns_are_tickers_times_fields() {
        let index = index(1);
        let frame = combine(
            &index,
            vec![aligned("SPY", &index, 470.0), aligned("QQQ", &index, 400.0)],
        )
        .unwrap();

        assert_eq!(frame.height(), index.len());
        assert_eq!(frame.width(), 10);
        assert_eq!(frame.tickers(), vec!["QQQ".to_string(), "SPY".to_string()]);
        assert_eq!(frame.null_count(), 0);
        let last = *index.timestamps().last().unwrap();
        assert_eq!(frame.value(last, &ColumnKey::new("SPY", Field::High)), Some(470.0));
    }

    #[test]
    fn no_frames_gives_empty_columns_on_full_axis() {
        let index = index(1);
        let frame = combine(&index, Vec::new()).unwrap();
        assert_eq!(frame.height(), 13);
        assert_eq!(frame.width(), 0);
    }

    #[test]
    fn rejects_frame_on_another_index() {
        let one_day = index(1);
        let two_days = index(2);
        let err = combine(&one_day, vec![aligned("SPY", &two_days, 1.0)]).unwrap_err();
        assert_eq!(
            err,
            CombineError::IndexMismatch {
                ticker: "SPY".into(),
                expected: 13,
                actual: 26
            }
        );
    }

    #[test]
    fn rejects_duplicate_ticker() {
        let index = index(1);
        let err = combine(&index, vec![aligned("SPY", &index, 1.0), aligned("SPY", &index, 2.0)])
            .unwrap_err();
        assert_eq!(err, CombineError::DuplicateTicker("SPY".into()));
    }

    #[test]
    fn values_pass_through_unchanged() {
        let index = index(1);
        let hours = MarketHours::us_equity();
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let noon = hours.localize(day, NaiveTime::from_hms_opt(12, 0, 0).unwrap()).unwrap();
        let raw = RawTickerFrame::new("IWM", vec![RawBar::ohlcv(noon, 1.0, 2.0, 0.5, 1.5, 10.0)]);
        let aligned = align_ticker(&raw, &index).unwrap();
        let expected = aligned.column(Field::Low).to_vec();

        let frame = combine(&index, vec![aligned]).unwrap();
        let low: Vec<f64> = frame
            .column(&ColumnKey::new("IWM", Field::Low))
            .unwrap()
            .iter()
            .map(|v| v.unwrap())
            .collect();
        assert_eq!(low, expected);
    }
}
