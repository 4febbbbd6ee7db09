//! Per-ticker alignment onto the canonical index, followed by gap-fill.
//!
//! Given raw bars for one ticker, keep only those on the grid, reindex to one
//! row per canonical timestamp, then fill the holes. The result has exactly
//! as many rows as the index and no missing cells.

use super::fill::{fill_gaps, FillCounts};
use crate::calendar::CanonicalIndex;
use crate::domain::{Field, RawTickerFrame};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FillError {
    #[error("incomplete data for {ticker}: {detail}")]
    IncompleteData { ticker: String, detail: String },
}

/// What happened to a ticker's raw rows during alignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlignStats {
    /// Grid rows with at least one observed field.
    pub observed_rows: usize,
    /// Raw rows not on the grid (extended hours, off-grid timestamps, other days).
    pub off_grid: usize,
    /// Raw rows repeating a timestamp already seen (first one wins).
    pub duplicates: usize,
    pub fill: FillCounts,
}

/// One ticker's bars on the canonical grid, fully filled.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedTickerFrame {
    ticker: String,
    timestamps: Vec<DateTime<Utc>>,
    columns: [Vec<f64>; 5],
    stats: AlignStats,
}

impl AlignedTickerFrame {
    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn column(&self, field: Field) -> &[f64] {
        &self.columns[field.index()]
    }

    pub fn stats(&self) -> AlignStats {
        self.stats
    }

    pub(crate) fn into_columns(self) -> (String, Vec<DateTime<Utc>>, [Vec<f64>; 5]) {
        (self.ticker, self.timestamps, self.columns)
    }
}

/// Sessions of the index on which the ticker has at least one observation.
pub fn observed_sessions(raw: &RawTickerFrame, index: &CanonicalIndex) -> BTreeSet<NaiveDate> {
    raw.bars
        .iter()
        .filter(|bar| !bar.is_empty())
        .filter_map(|bar| index.position(bar.timestamp))
        .filter_map(|row| index.session_of(row))
        .collect()
}

/// Align a raw frame onto the index and gap-fill it.
///
/// Fails with `IncompleteData` if the ticker has no observation on the grid,
/// or if some field is missing on every row (nothing to fill from).
pub fn align_ticker(
    raw: &RawTickerFrame,
    index: &CanonicalIndex,
) -> Result<AlignedTickerFrame, FillError> {
    let n = index.len();
    let mut cells: [Vec<Option<f64>>; 5] = std::array::from_fn(|_| vec![None; n]);
    let mut seen = vec![false; n];
    let mut stats = AlignStats::default();

    for bar in &raw.bars {
        if bar.is_empty() {
            continue;
        }
        let Some(row) = index.position(bar.timestamp) else {
            stats.off_grid += 1;
            continue;
        };
        if seen[row] {
            stats.duplicates += 1;
            continue;
        }
        seen[row] = true;
        for field in Field::ALL {
            cells[field.index()][row] = bar.get(field);
        }
    }
    stats.observed_rows = seen.iter().filter(|s| **s).count();

    if stats.off_grid > 0 {
        tracing::debug!(ticker = %raw.ticker, rows = stats.off_grid, "dropped off-grid rows");
    }
    if stats.observed_rows == 0 {
        return Err(FillError::IncompleteData {
            ticker: raw.ticker.clone(),
            detail: format!(
                "no observations on the {}-row canonical index ({} raw rows)",
                n,
                raw.bars.len()
            ),
        });
    }

    let mut columns: [Vec<f64>; 5] = Default::default();
    for field in Field::ALL {
        let column = &mut cells[field.index()];
        stats.fill += fill_gaps(column);
        columns[field.index()] = column
            .iter()
            .copied()
            .collect::<Option<Vec<f64>>>()
            .ok_or_else(|| FillError::IncompleteData {
                ticker: raw.ticker.clone(),
                detail: format!("field '{field}' has no observations"),
            })?;
    }

    Ok(AlignedTickerFrame {
        ticker: raw.ticker.clone(),
        timestamps: index.timestamps().to_vec(),
        columns,
        stats,
    })
}
