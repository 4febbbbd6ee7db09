//! Resumable per-session download cache.
//!
//! Layout: `{cache_dir}/{interval}/symbol={TICKER}/{YYYY-MM-DD}.parquet`,
//! one file per (ticker, session) holding the raw provider bars for that
//! session. Sessions already on disk are never requested again, so an
//! interrupted update resumes where it stopped.
//!
//! Only sessions whose close has passed are written; the current session is
//! always refetched. A session the provider returned no bars for is cached
//! as an empty file.

use super::provider::{BarProvider, ProviderError};
use crate::calendar::{MarketHours, TradingCalendar};
use crate::domain::{Field, Interval, RawBar, RawTickerFrame};
use crate::store::parquet::{commit, stage};
use crate::store::schema::{BarSchema, TIMESTAMP};
use crate::store::StoreError;
use chrono::{DateTime, Days, NaiveDate, Utc};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Raw bars on disk, keyed by (interval, ticker, session).
#[derive(Debug, Clone)]
pub struct SessionCache {
    cache_dir: PathBuf,
}

impl SessionCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// `{cache_dir}/{interval}/symbol={TICKER}/`
    fn ticker_dir(&self, ticker: &str, interval: Interval) -> PathBuf {
        self.cache_dir
            .join(interval.to_string())
            .join(format!("symbol={ticker}"))
    }

    pub fn session_path(&self, ticker: &str, interval: Interval, day: NaiveDate) -> PathBuf {
        self.ticker_dir(ticker, interval)
            .join(format!("{}.parquet", day.format("%Y-%m-%d")))
    }

    pub fn contains(&self, ticker: &str, interval: Interval, day: NaiveDate) -> bool {
        self.session_path(ticker, interval, day).exists()
    }

    /// Bars of one cached session, in file order.
    pub fn load_session(
        &self,
        ticker: &str,
        interval: Interval,
        day: NaiveDate,
    ) -> Result<Vec<RawBar>, StoreError> {
        let path = self.session_path(ticker, interval, day);
        let file = fs::File::open(&path).map_err(|e| StoreError::io(&path, e))?;
        let df = ParquetReader::new(file)
            .finish()
            .map_err(|e| corrupt(&path, format!("unreadable parquet: {e}")))?;
        dataframe_to_bars(&df).map_err(|reason| corrupt(&path, reason))
    }

    /// Write one session atomically, replacing any previous file.
    pub fn write_session(
        &self,
        ticker: &str,
        interval: Interval,
        day: NaiveDate,
        bars: &[RawBar],
    ) -> Result<(), StoreError> {
        let dir = self.ticker_dir(ticker, interval);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let path = self.session_path(ticker, interval, day);
        let tmp = path.with_extension("parquet.tmp");
        let mut df = bars_to_dataframe(bars)?;
        stage(&tmp, |file| {
            ParquetWriter::new(file)
                .finish(&mut df)
                .map(|_| ())
                .map_err(|e| StoreError::Parquet(format!("write session cache: {e}")))
        })?;
        commit(&tmp, &path)
    }
}

fn corrupt(path: &Path, reason: String) -> StoreError {
    StoreError::Corrupt {
        path: path.to_path_buf(),
        reason,
    }
}

fn bars_to_dataframe(bars: &[RawBar]) -> Result<DataFrame, StoreError> {
    let millis: Vec<i64> = bars.iter().map(|b| b.timestamp.timestamp_millis()).collect();
    let mut columns = vec![Column::new(TIMESTAMP.into(), millis)
        .cast(&BarSchema::timestamp_dtype())
        .map_err(|e| StoreError::Parquet(format!("timestamp cast: {e}")))?];
    for field in Field::ALL {
        let cells: Vec<Option<f64>> = bars.iter().map(|b| b.get(field)).collect();
        columns.push(Column::new(field.name().into(), cells));
    }
    DataFrame::new(columns).map_err(|e| StoreError::Parquet(format!("dataframe creation: {e}")))
}

fn dataframe_to_bars(df: &DataFrame) -> Result<Vec<RawBar>, String> {
    let col_err = |name: &str, e: PolarsError| format!("column '{name}': {e}");
    let ts_col = df
        .column(TIMESTAMP)
        .and_then(|c| c.cast(&DataType::Int64))
        .map_err(|e| col_err(TIMESTAMP, e))?;
    let ts_ca = ts_col.i64().map_err(|e| col_err(TIMESTAMP, e))?;
    let field_cas = Field::ALL
        .iter()
        .map(|f| {
            df.column(f.name())
                .and_then(|c| c.f64())
                .map_err(|e| col_err(f.name(), e))
        })
        .collect::<Result<Vec<_>, _>>()?;

    (0..df.height())
        .map(|i| {
            let ms = ts_ca
                .get(i)
                .ok_or_else(|| format!("null timestamp at row {i}"))?;
            let timestamp = DateTime::from_timestamp_millis(ms)
                .ok_or_else(|| format!("timestamp out of range at row {i}: {ms}"))?;
            let value = |field: Field| field_cas[field.index()].get(i);
            Ok(RawBar {
                timestamp,
                open: value(Field::Open),
                high: value(Field::High),
                low: value(Field::Low),
                close: value(Field::Close),
                volume: value(Field::Volume),
            })
        })
        .collect()
}

/// Provider wrapper that serves completed sessions from a [`SessionCache`]
/// and fetches only the sessions missing from it.
///
/// Missing sessions are fetched in contiguous runs of trading days. Cache
/// read and write failures are logged and never fail the fetch: an
/// unreadable session is refetched and overwritten.
pub struct CachingProvider {
    inner: Box<dyn BarProvider>,
    cache: SessionCache,
    hours: MarketHours,
    calendar: Arc<dyn TradingCalendar>,
}

impl CachingProvider {
    pub fn new(
        inner: Box<dyn BarProvider>,
        cache: SessionCache,
        hours: MarketHours,
        calendar: Arc<dyn TradingCalendar>,
    ) -> Self {
        Self {
            inner,
            cache,
            hours,
            calendar,
        }
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// The session has closed and its bars can no longer change.
    fn is_complete(&self, day: NaiveDate) -> bool {
        self.hours
            .localize(day, self.hours.close)
            .map_or(false, |close| close <= Utc::now())
    }

    fn cached_session(
        &self,
        ticker: &str,
        interval: Interval,
        day: NaiveDate,
    ) -> Option<Vec<RawBar>> {
        if !self.cache.contains(ticker, interval, day) {
            return None;
        }
        match self.cache.load_session(ticker, interval, day) {
            Ok(bars) => Some(bars),
            Err(e) => {
                tracing::warn!(ticker, %day, error = %e, "unreadable session cache, refetching");
                None
            }
        }
    }

    /// Fetch `days` (consecutive trading days) from the inner provider and
    /// cache each completed session.
    fn fetch_run(
        &self,
        ticker: &str,
        days: &[NaiveDate],
        end: NaiveDate,
        interval: Interval,
    ) -> Result<Vec<RawBar>, ProviderError> {
        let (Some(first), Some(last)) = (days.first(), days.last()) else {
            return Ok(Vec::new());
        };
        let run_end = last.checked_add_days(Days::new(1)).unwrap_or(end).min(end);
        let fresh = self.inner.fetch(ticker, *first, run_end, interval)?;

        let mut by_session: BTreeMap<NaiveDate, Vec<RawBar>> = BTreeMap::new();
        for bar in fresh.bars {
            by_session
                .entry(self.hours.session_date(bar.timestamp))
                .or_default()
                .push(bar);
        }

        let mut bars = Vec::new();
        for day in days {
            let session = by_session.remove(day).unwrap_or_default();
            if self.is_complete(*day) {
                if let Err(e) = self.cache.write_session(ticker, interval, *day, &session) {
                    tracing::warn!(ticker, %day, error = %e, "failed to write session cache");
                }
            }
            bars.extend(session);
        }
        Ok(bars)
    }
}

impl BarProvider for CachingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn fetch(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
        interval: Interval,
    ) -> Result<RawTickerFrame, ProviderError> {
        let mut bars = Vec::new();
        let mut run: Vec<NaiveDate> = Vec::new();
        let mut hits = 0usize;

        for day in self.calendar.trading_days(start, end) {
            match self.cached_session(ticker, interval, day) {
                Some(cached) => {
                    hits += 1;
                    bars.extend(self.fetch_run(ticker, &run, end, interval)?);
                    run.clear();
                    bars.extend(cached);
                }
                None => run.push(day),
            }
        }
        let fetched_sessions = run.len();
        bars.extend(self.fetch_run(ticker, &run, end, interval)?);

        tracing::debug!(ticker, cached = hits, last_run = fetched_sessions, "session cache");
        bars.sort_by_key(|b| b.timestamp);
        Ok(RawTickerFrame::new(ticker, bars))
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }
}
