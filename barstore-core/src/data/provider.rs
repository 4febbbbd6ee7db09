//! Bar provider trait and structured provider errors.
//!
//! The BarProvider trait abstracts over data sources (Yahoo Finance,
//! synthetic data, test mocks) so the merge engine only ever sees
//! completed `RawTickerFrame`s.

use crate::domain::{Interval, RawTickerFrame};
use chrono::NaiveDate;
use thiserror::Error;

/// Per-ticker fetch failure. The update run treats any of these as
/// "no data for this ticker in this range" and carries on.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("symbol not found: {ticker}")]
    SymbolNotFound { ticker: String },

    #[error("interval {interval} is not supported by {provider}")]
    UnsupportedInterval { interval: Interval, provider: String },

    #[error("hard stop: data provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("provider error: {0}")]
    Other(String),
}

/// Source of raw intraday bars.
///
/// Implementations must be shareable across threads: the fetch fan-out
/// calls `fetch` for several tickers concurrently.
pub trait BarProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch bars for a ticker over `[start, end)` at the given interval.
    ///
    /// The result may include bars outside regular hours, duplicates, or
    /// gaps; alignment deals with all of those.
    fn fetch(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
        interval: Interval,
    ) -> Result<RawTickerFrame, ProviderError>;

    /// Whether the provider currently accepts requests.
    fn is_available(&self) -> bool {
        true
    }
}
