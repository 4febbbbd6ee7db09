//! Parquet-backed bar store with a metadata sidecar.
//!
//! Layout: `{path}` holds the long-format table, `{path}.meta.json` holds the
//! timezone, interval, ticker list, and a content hash checked on load.
//!
//! Both files are first written in full to temporaries in the same
//! directory and synced. Only then are they renamed into place, so a failed
//! write leaves the previous store and sidecar intact.

use super::merge::merge_frames;
use super::schema::{BarSchema, SYMBOL, TIMESTAMP};
use super::{SchemaPolicy, StoreContext, StoreError};
use crate::domain::{BarFrame, ColumnKey, Field, Interval};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Metadata sidecar for a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMeta {
    pub timezone: Tz,
    pub interval: Interval,
    /// Number of distinct timestamps.
    pub row_count: usize,
    pub tickers: Vec<String>,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub data_hash: String,
    pub updated_at: DateTime<Utc>,
}

impl StoreMeta {
    fn describe(frame: &BarFrame, ctx: StoreContext) -> Self {
        Self {
            timezone: ctx.timezone,
            interval: ctx.interval,
            row_count: frame.height(),
            tickers: frame.tickers(),
            first_timestamp: frame.first_timestamp(),
            last_timestamp: frame.last_timestamp(),
            data_hash: content_hash(frame),
            updated_at: Utc::now(),
        }
    }

    fn context(&self) -> StoreContext {
        StoreContext {
            timezone: self.timezone,
            interval: self.interval,
        }
    }
}

/// Store contents as loaded from disk.
#[derive(Debug, Clone)]
pub struct StoredFrame {
    pub frame: BarFrame,
    /// `None` if the sidecar is missing (e.g. a table written by another tool).
    pub meta: Option<StoreMeta>,
}

/// Outcome of one merge into the store.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeReport {
    /// The store did not exist before this merge.
    pub created: bool,
    pub rows_before: usize,
    pub rows_appended: usize,
    pub rows_after: usize,
    pub columns_added: Vec<ColumnKey>,
    /// False when the merge changed nothing and the file was left alone.
    pub written: bool,
}

/// A bar store at a fixed path.
pub struct BarStore {
    path: PathBuf,
}

impl BarStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn meta_path(&self) -> PathBuf {
        sibling(&self.path, "meta.json")
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read only the sidecar.
    pub fn read_meta(&self) -> Result<Option<StoreMeta>, StoreError> {
        let meta_path = self.meta_path();
        if !meta_path.exists() {
            return Ok(None);
        }
        let content =
            fs::read_to_string(&meta_path).map_err(|e| StoreError::io(&meta_path, e))?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                path: meta_path,
                reason: format!("unreadable metadata: {e}"),
            })
    }

    /// Load the store, or `None` if it does not exist yet.
    ///
    /// A table that fails schema validation, holds duplicate
    /// (timestamp, symbol) rows, or disagrees with its sidecar hash is
    /// reported as `Corrupt` and left in place.
    pub fn load(&self) -> Result<Option<StoredFrame>, StoreError> {
        if !self.exists() {
            return Ok(None);
        }
        let file = fs::File::open(&self.path).map_err(|e| StoreError::io(&self.path, e))?;
        let df = ParquetReader::new(file)
            .finish()
            .map_err(|e| self.corrupt(format!("unreadable parquet: {e}")))?;
        BarSchema::validate(&df).map_err(|e| self.corrupt(e.to_string()))?;
        let frame = dataframe_to_frame(&df).map_err(|reason| self.corrupt(reason))?;

        let meta = self.read_meta()?;
        match &meta {
            Some(meta) if meta.data_hash != content_hash(&frame) => {
                return Err(self.corrupt("content hash does not match metadata".into()));
            }
            Some(_) => {}
            None => tracing::warn!(path = %self.path.display(), "store has no metadata sidecar"),
        }

        Ok(Some(StoredFrame { frame, meta }))
    }

    /// Merge `incoming` into the store and persist the result.
    ///
    /// Creates the store if absent. Nothing is written when the merge adds
    /// no rows and no columns, or when `incoming` has no columns at all.
    pub fn merge(
        &self,
        incoming: &BarFrame,
        ctx: StoreContext,
        policy: SchemaPolicy,
    ) -> Result<MergeReport, StoreError> {
        let stored = self.load()?;
        let created = stored.is_none();

        let existing = match stored {
            Some(StoredFrame { frame, meta }) => {
                let meta = meta.ok_or_else(|| StoreError::MissingMetadata {
                    path: self.meta_path(),
                })?;
                check_context(&meta.context(), &ctx)?;
                frame
            }
            None => BarFrame::default(),
        };
        let rows_before = existing.height();

        if incoming.width() == 0 {
            tracing::info!(
                path = %self.path.display(),
                "nothing to merge: incoming frame has no columns"
            );
            return Ok(MergeReport {
                created: false,
                rows_before,
                rows_appended: 0,
                rows_after: rows_before,
                columns_added: Vec::new(),
                written: false,
            });
        }

        let outcome = merge_frames(existing, incoming, policy)?;
        let written = created || outcome.changed();
        if written {
            self.persist(&outcome.frame, ctx)?;
        }

        tracing::info!(
            path = %self.path.display(),
            created,
            appended = outcome.appended_rows,
            columns_added = outcome.added_columns.len(),
            rows = outcome.frame.height(),
            "store merge complete"
        );

        Ok(MergeReport {
            created,
            rows_before,
            rows_appended: outcome.appended_rows,
            rows_after: outcome.frame.height(),
            columns_added: outcome.added_columns,
            written,
        })
    }

    /// Atomically replace the store contents with `frame`.
    pub fn persist(&self, frame: &BarFrame, ctx: StoreContext) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let mut df = frame_to_dataframe(frame)?;
        let meta = StoreMeta::describe(frame, ctx);
        let json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| StoreError::Metadata(format!("serialize metadata: {e}")))?;

        let meta_path = self.meta_path();
        let data_tmp = sibling(&self.path, "tmp");
        let meta_tmp = sibling(&meta_path, "tmp");

        stage(&data_tmp, |file| {
            ParquetWriter::new(file)
                .finish(&mut df)
                .map(|_| ())
                .map_err(|e| StoreError::Parquet(format!("write parquet: {e}")))
        })?;
        let staged_meta = stage(&meta_tmp, |file| {
            file.write_all(&json).map_err(|e| StoreError::io(&meta_tmp, e))
        });
        if let Err(e) = staged_meta {
            let _ = fs::remove_file(&data_tmp);
            return Err(e);
        }

        if let Err(e) = commit(&data_tmp, &self.path) {
            let _ = fs::remove_file(&meta_tmp);
            return Err(e);
        }
        commit(&meta_tmp, &meta_path)
    }

    fn corrupt(&self, reason: String) -> StoreError {
        StoreError::Corrupt {
            path: self.path.clone(),
            reason,
        }
    }
}

fn check_context(stored: &StoreContext, incoming: &StoreContext) -> Result<(), StoreError> {
    if stored.timezone != incoming.timezone {
        return Err(StoreError::SchemaMismatch(format!(
            "store timezone is {}, update uses {}",
            stored.timezone, incoming.timezone
        )));
    }
    if stored.interval != incoming.interval {
        return Err(StoreError::SchemaMismatch(format!(
            "store interval is {}, update uses {}",
            stored.interval, incoming.interval
        )));
    }
    Ok(())
}

/// `{path}.{suffix}` next to `path`.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Write `tmp` in full and sync it. The temp file is removed on failure.
pub(crate) fn stage(
    tmp: &Path,
    write: impl FnOnce(&mut fs::File) -> Result<(), StoreError>,
) -> Result<(), StoreError> {
    let result = (|| {
        let mut file = fs::File::create(tmp).map_err(|e| StoreError::io(tmp, e))?;
        write(&mut file)?;
        file.sync_all().map_err(|e| StoreError::io(tmp, e))
    })();
    if result.is_err() {
        let _ = fs::remove_file(tmp);
    }
    result
}

/// Rename a staged file over `dest`.
pub(crate) fn commit(tmp: &Path, dest: &Path) -> Result<(), StoreError> {
    fs::rename(tmp, dest).map_err(|e| {
        let _ = fs::remove_file(tmp);
        StoreError::io(dest, e)
    })
}

/// blake3 over timestamps and every cell, in column-key order.
fn content_hash(frame: &BarFrame) -> String {
    let mut hasher = blake3::Hasher::new();
    for ts in frame.timestamps() {
        hasher.update(&ts.timestamp_millis().to_le_bytes());
    }
    for (key, cells) in frame.columns() {
        hasher.update(key.to_string().as_bytes());
        for cell in cells {
            match cell {
                Some(v) => hasher.update(&[1]).update(&v.to_bits().to_le_bytes()),
                None => hasher.update(&[0]),
            };
        }
    }
    hasher.finalize().to_hex().to_string()
}

// ── Parquet conversion ─────────────────────────────────────────────

/// Wide frame to long table: one row per (timestamp, ticker).
fn frame_to_dataframe(frame: &BarFrame) -> Result<DataFrame, StoreError> {
    let tickers = frame.tickers();
    let rows = frame.height() * tickers.len();

    let mut millis = Vec::with_capacity(rows);
    let mut symbols = Vec::with_capacity(rows);
    let mut values: [Vec<Option<f64>>; 5] = std::array::from_fn(|_| Vec::with_capacity(rows));

    let ticker_columns: Vec<[Option<&[Option<f64>]>; 5]> = tickers
        .iter()
        .map(|t| Field::ALL.map(|f| frame.column(&ColumnKey::new(t.as_str(), f))))
        .collect();

    for (row, ts) in frame.timestamps().iter().enumerate() {
        for (ticker, cols) in tickers.iter().zip(&ticker_columns) {
            millis.push(ts.timestamp_millis());
            symbols.push(ticker.as_str());
            for field in Field::ALL {
                values[field.index()].push(cols[field.index()].and_then(|c| c[row]));
            }
        }
    }

    let mut columns = vec![
        Column::new(TIMESTAMP.into(), millis)
            .cast(&BarSchema::timestamp_dtype())
            .map_err(|e| StoreError::Parquet(format!("timestamp cast: {e}")))?,
        Column::new(SYMBOL.into(), symbols),
    ];
    for (field, cells) in Field::ALL.into_iter().zip(values) {
        columns.push(Column::new(field.name().into(), cells));
    }

    DataFrame::new(columns).map_err(|e| StoreError::Parquet(format!("dataframe creation: {e}")))
}

/// Long table back to a wide frame. Errors are returned as a reason string
/// for the caller to wrap as `Corrupt`.
fn dataframe_to_frame(df: &DataFrame) -> Result<BarFrame, String> {
    let df = df
        .clone()
        .lazy()
        .sort(
            [TIMESTAMP, SYMBOL],
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .collect()
        .map_err(|e| format!("sort: {e}"))?;

    let col_err = |name: &str, e: PolarsError| format!("column '{name}': {e}");
    let ts_col = df
        .column(TIMESTAMP)
        .and_then(|c| c.cast(&DataType::Int64))
        .map_err(|e| col_err(TIMESTAMP, e))?;
    let ts_ca = ts_col.i64().map_err(|e| col_err(TIMESTAMP, e))?;
    let sym_ca = df
        .column(SYMBOL)
        .and_then(|c| c.str())
        .map_err(|e| col_err(SYMBOL, e))?;
    let field_cas = Field::ALL
        .iter()
        .map(|f| {
            df.column(f.name())
                .and_then(|c| c.f64())
                .map_err(|e| col_err(f.name(), e))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut timestamps: Vec<DateTime<Utc>> = Vec::new();
    let mut cells: BTreeMap<String, [Vec<Option<f64>>; 5]> = BTreeMap::new();
    let mut seen: BTreeSet<(i64, &str)> = BTreeSet::new();

    for i in 0..df.height() {
        let ms = ts_ca
            .get(i)
            .ok_or_else(|| format!("null timestamp at row {i}"))?;
        let symbol = sym_ca
            .get(i)
            .ok_or_else(|| format!("null symbol at row {i}"))?;
        if !seen.insert((ms, symbol)) {
            return Err(format!("duplicate row for {symbol} at {ms}ms"));
        }
        let ts = DateTime::from_timestamp_millis(ms)
            .ok_or_else(|| format!("timestamp out of range at row {i}: {ms}"))?;
        if timestamps.last() != Some(&ts) {
            timestamps.push(ts);
        }
        let row = timestamps.len() - 1;

        let entry = cells
            .entry(symbol.to_string())
            .or_insert_with(|| std::array::from_fn(|_| Vec::new()));
        for (field, ca) in Field::ALL.iter().zip(&field_cas) {
            let column = &mut entry[field.index()];
            column.resize(row, None);
            column.push(ca.get(i));
        }
    }

    let height = timestamps.len();
    let mut columns = BTreeMap::new();
    for (ticker, mut per_field) in cells {
        for field in Field::ALL {
            let mut column = std::mem::take(&mut per_field[field.index()]);
            column.resize(height, None);
            columns.insert(ColumnKey::new(ticker.clone(), field), column);
        }
    }

    BarFrame::new(timestamps, columns).map_err(|e| e.to_string())
}
