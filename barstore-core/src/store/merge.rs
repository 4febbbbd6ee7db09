//! In-memory incremental merge of an incoming frame into stored history.

use super::{SchemaPolicy, StoreError};
use crate::domain::{BarFrame, ColumnKey};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// Result of merging one frame into another.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub frame: BarFrame,
    /// Rows appended (timestamps absent from the existing frame).
    pub appended_rows: usize,
    /// Columns introduced by widening, sorted.
    pub added_columns: Vec<ColumnKey>,
}

impl MergeOutcome {
    /// True if the merged frame differs from the existing one.
    pub fn changed(&self) -> bool {
        self.appended_rows > 0 || !self.added_columns.is_empty()
    }
}

#[derive(Clone, Copy)]
enum Source {
    Existing(usize),
    Incoming(usize),
}

/// Merge `incoming` into `existing`.
///
/// Only rows whose timestamp is absent from `existing` are taken from
/// `incoming`; overlapping timestamps keep the stored values untouched.
/// The result stays strictly increasing. `Strict` only constrains a
/// non-empty `existing`; any column set may create a store.
pub fn merge_frames(
    existing: BarFrame,
    incoming: &BarFrame,
    policy: SchemaPolicy,
) -> Result<MergeOutcome, StoreError> {
    let stored_keys = existing.column_keys();
    let incoming_keys = incoming.column_keys();
    let added_columns: Vec<ColumnKey> = incoming_keys.difference(&stored_keys).cloned().collect();

    if policy == SchemaPolicy::Strict
        && !stored_keys.is_empty()
        && stored_keys != incoming_keys
    {
        let missing: Vec<String> = stored_keys
            .difference(&incoming_keys)
            .map(ToString::to_string)
            .collect();
        let added: Vec<String> = added_columns.iter().map(ToString::to_string).collect();
        return Err(StoreError::SchemaMismatch(format!(
            "column sets differ (new: [{}], missing: [{}])",
            added.join(", "),
            missing.join(", ")
        )));
    }

    let (stored_ts, mut stored_cols) = existing.into_parts();
    let (sources, timestamps) = interleave(&stored_ts, incoming.timestamps());
    let appended_rows = timestamps.len() - stored_ts.len();

    let all_keys: BTreeSet<ColumnKey> = stored_keys.union(&incoming_keys).cloned().collect();
    let mut columns = BTreeMap::new();
    for key in all_keys {
        let stored = stored_cols.remove(&key);
        let fresh = incoming.column(&key);
        let cells: Vec<Option<f64>> = sources
            .iter()
            .map(|src| match *src {
                Source::Existing(i) => stored.as_ref().and_then(|c| c[i]),
                Source::Incoming(j) => fresh.and_then(|c| c[j]),
            })
            .collect();
        columns.insert(key, cells);
    }

    Ok(MergeOutcome {
        frame: BarFrame::new(timestamps, columns)?,
        appended_rows,
        added_columns,
    })
}

/// Two-pointer walk over both sorted axes. Incoming timestamps already in
/// the stored axis are skipped.
fn interleave(
    stored: &[DateTime<Utc>],
    incoming: &[DateTime<Utc>],
) -> (Vec<Source>, Vec<DateTime<Utc>>) {
    let mut sources = Vec::with_capacity(stored.len() + incoming.len());
    let mut timestamps = Vec::with_capacity(stored.len() + incoming.len());
    let (mut i, mut j) = (0, 0);

    while i < stored.len() || j < incoming.len() {
        let take_stored = match (stored.get(i), incoming.get(j)) {
            (Some(s), Some(n)) if s == n => {
                j += 1;
                true
            }
            (Some(s), Some(n)) => s < n,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if take_stored {
            sources.push(Source::Existing(i));
            timestamps.push(stored[i]);
            i += 1;
        } else {
            sources.push(Source::Incoming(j));
            timestamps.push(incoming[j]);
            j += 1;
        }
    }
    (sources, timestamps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Field;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn frame(ticker: &str, rows: &[(i64, f64)]) -> BarFrame {
        let timestamps = rows.iter().map(|(t, _)| ts(*t)).collect();
        let columns = ColumnKey::for_ticker(ticker)
            .map(|k| (k, rows.iter().map(|(_, v)| Some(*v)).collect()))
            .collect();
        BarFrame::new(timestamps, columns).unwrap()
    }

    fn close(ticker: &str) -> ColumnKey {
        ColumnKey::new(ticker, Field::Close)
    }

    #[test]
    fn appends_only_new_timestamps_in_order() {
        let stored = frame("SPY", &[(10, 1.0), (30, 3.0)]);
        let incoming = frame("SPY", &[(20, 2.0), (30, 99.0), (40, 4.0)]);

        let out = merge_frames(stored, &incoming, SchemaPolicy::Widen).unwrap();
        assert_eq!(out.appended_rows, 2);
        assert!(out.added_columns.is_empty());
        assert_eq!(out.frame.timestamps(), &[ts(10), ts(20), ts(30), ts(40)]);
        // overlapping row keeps the stored value
        assert_eq!(
            out.frame.column(&close("SPY")).unwrap(),
            &[Some(1.0), Some(2.0), Some(3.0), Some(4.0)]
        );
    }

    #[test]
    fn full_overlap_changes_nothing() {
        let stored = frame("SPY", &[(10, 1.0), (20, 2.0)]);
        let out = merge_frames(stored.clone(), &stored, SchemaPolicy::Widen).unwrap();
        assert!(!out.changed());
        assert_eq!(out.frame, stored);
    }

    #[test]
    fn merging_into_empty_takes_incoming_verbatim() {
        let incoming = frame("QQQ", &[(10, 1.0), (20, 2.0)]);
        let out = merge_frames(BarFrame::default(), &incoming, SchemaPolicy::Widen).unwrap();
        assert_eq!(out.frame, incoming);
        assert_eq!(out.appended_rows, 2);
        assert_eq!(out.added_columns.len(), 5);
    }

    #[test]
    fn widen_adds_new_ticker_with_nulls_for_old_rows() {
        let stored = frame("SPY", &[(10, 1.0), (20, 2.0)]);
        let incoming = frame("IWM", &[(20, 7.0), (30, 8.0)]);

        let out = merge_frames(stored, &incoming, SchemaPolicy::Widen).unwrap();
        assert_eq!(out.appended_rows, 1);
        assert_eq!(out.added_columns.len(), 5);
        assert!(out.added_columns.iter().all(|k| k.ticker == "IWM"));

        // stored rows untouched, new ticker null before its first appended row
        assert_eq!(
            out.frame.column(&close("SPY")).unwrap(),
            &[Some(1.0), Some(2.0), None]
        );
        assert_eq!(
            out.frame.column(&close("IWM")).unwrap(),
            &[None, None, Some(8.0)]
        );
    }

    #[test]
    fn strict_rejects_column_change() {
        let stored = frame("SPY", &[(10, 1.0)]);
        let incoming = frame("IWM", &[(20, 2.0)]);
        let err = merge_frames(stored, &incoming, SchemaPolicy::Strict).unwrap_err();
        match err {
            StoreError::SchemaMismatch(msg) => {
                assert!(msg.contains("IWM.close"));
                assert!(msg.contains("SPY.open"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn strict_accepts_same_columns() {
        let stored = frame("SPY", &[(10, 1.0)]);
        let incoming = frame("SPY", &[(20, 2.0)]);
        let out = merge_frames(stored, &incoming, SchemaPolicy::Strict).unwrap();
        assert_eq!(out.appended_rows, 1);
    }

    #[test]
    fn strict_allows_creating_from_empty() {
        let incoming = frame("SPY", &[(10, 1.0), (20, 2.0)]);
        let out = merge_frames(BarFrame::default(), &incoming, SchemaPolicy::Strict).unwrap();
        assert_eq!(out.appended_rows, 2);
        assert_eq!(out.added_columns.len(), 5);
    }
}
