//! `update_store`: fetch, align, combine, and merge into the bar store.
//!
//! Per-ticker failures (provider errors, tickers with no usable data) are
//! recorded in the report and never abort the run. Configuration and store
//! errors abort before anything is written.

use crate::config::UpdateConfig;
use crate::report::{FailureStage, TickerFailure, TickerSuccess, UpdateProgress, UpdateReport};
use barstore_core::calendar::{CanonicalIndex, ConfigError, MarketHours, TradingCalendar};
use barstore_core::data::{
    align_ticker, combine, fetch_all, observed_sessions, BarProvider, CombineError,
};
use barstore_core::domain::{Interval, RawTickerFrame};
use barstore_core::store::{BarStore, SchemaPolicy, StoreContext, StoreError};
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("combine error: {0}")]
    Combine(#[from] CombineError),
}

/// Everything one update run needs besides the provider and calendar.
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub tickers: BTreeSet<String>,
    /// First session date, inclusive.
    pub start: NaiveDate,
    /// Last session date, exclusive.
    pub end: NaiveDate,
    pub store_path: PathBuf,
    pub interval: Interval,
    pub hours: MarketHours,
    pub schema_policy: SchemaPolicy,
    /// Fetch tickers on the rayon pool.
    pub parallel: bool,
}

impl UpdateRequest {
    /// US equity hours, widening schema policy, parallel fetch.
    pub fn new(
        tickers: impl IntoIterator<Item = impl Into<String>>,
        start: NaiveDate,
        end: NaiveDate,
        store_path: impl Into<PathBuf>,
        interval: Interval,
    ) -> Self {
        Self {
            tickers: tickers.into_iter().map(Into::into).collect(),
            start,
            end,
            store_path: store_path.into(),
            interval,
            hours: MarketHours::us_equity(),
            schema_policy: SchemaPolicy::default(),
            parallel: true,
        }
    }

    /// Request for the config's universe, hours, interval, and store.
    pub fn from_config(config: &UpdateConfig, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            tickers: config.universe.tickers.iter().cloned().collect(),
            start,
            end,
            store_path: config.store.path.clone(),
            interval: config.market.interval,
            hours: config.market.hours,
            schema_policy: config.store.schema_policy,
            parallel: true,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.end < self.start {
            return Err(ConfigError::Invalid(format!(
                "end date {} is before start date {}",
                self.end, self.start
            )));
        }
        if let Some(bad) = self.tickers.iter().find(|t| t.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("blank ticker: {bad:?}")));
        }
        Ok(())
    }
}

/// Run one incremental update.
///
/// Steps: build the canonical index (config errors surface here, before any
/// fetch), fetch every ticker, drop sessions on which no ticker has data,
/// align and fill each ticker, combine, and merge into the store.
pub fn update_store(
    req: &UpdateRequest,
    provider: &dyn BarProvider,
    calendar: &dyn TradingCalendar,
    progress: &dyn UpdateProgress,
) -> Result<UpdateReport, UpdateError> {
    req.validate()?;
    let index = CanonicalIndex::build(req.start, req.end, req.interval, &req.hours, calendar)?;

    if index.is_empty() {
        tracing::info!(
            start = %req.start,
            end = %req.end,
            "no trading sessions in range, nothing to fetch"
        );
        return Ok(UpdateReport::default());
    }

    let tickers: Vec<String> = req.tickers.iter().cloned().collect();
    tracing::info!(
        tickers = tickers.len(),
        sessions = index.sessions().len(),
        rows = index.len(),
        interval = %req.interval,
        provider = provider.name(),
        "starting update"
    );

    let mut report = UpdateReport::default();
    let mut fetched: Vec<RawTickerFrame> = Vec::new();
    for fetch in fetch_all(provider, &tickers, req.start, req.end, req.interval, req.parallel) {
        match fetch.result {
            Ok(raw) => fetched.push(raw),
            Err(e) => record_failure(
                &mut report,
                progress,
                fetch.ticker,
                FailureStage::Fetch,
                e.to_string(),
            ),
        }
    }

    let live: BTreeSet<NaiveDate> = fetched
        .iter()
        .flat_map(|raw| observed_sessions(raw, &index))
        .collect();
    let index = if live.len() < index.sessions().len() {
        let pruned = index.retain_sessions(&live);
        tracing::debug!(
            dropped = index.sessions().len() - live.len(),
            "dropped sessions with no observations for any ticker"
        );
        pruned
    } else {
        index
    };
    report.index_rows = index.len();
    report.sessions = live.len();

    let mut aligned = Vec::with_capacity(fetched.len());
    for raw in &fetched {
        match align_ticker(raw, &index) {
            Ok(frame) => {
                let stats = frame.stats();
                let success = TickerSuccess {
                    ticker: raw.ticker.clone(),
                    observed_rows: stats.observed_rows,
                    filled_cells: stats.fill.total(),
                };
                progress.on_ticker(&raw.ticker, &Ok(success.clone()));
                report.succeeded.push(success);
                aligned.push(frame);
            }
            Err(e) => record_failure(
                &mut report,
                progress,
                raw.ticker.clone(),
                FailureStage::Align,
                e.to_string(),
            ),
        }
    }

    if aligned.is_empty() {
        tracing::warn!(
            failed = report.failed.len(),
            "no ticker produced data, store left untouched"
        );
        return Ok(report);
    }

    let combined = combine(&index, aligned)?;
    let ctx = StoreContext {
        timezone: req.hours.timezone,
        interval: req.interval,
    };
    let merge = BarStore::new(&req.store_path).merge(&combined, ctx, req.schema_policy)?;
    progress.on_merge(&merge);
    report.merge = Some(merge);

    Ok(report)
}

fn record_failure(
    report: &mut UpdateReport,
    progress: &dyn UpdateProgress,
    ticker: String,
    stage: FailureStage,
    reason: String,
) {
    let failure = TickerFailure {
        ticker,
        stage,
        reason,
    };
    progress.on_ticker(&failure.ticker, &Err(failure.clone()));
    report.failed.push(failure);
}
