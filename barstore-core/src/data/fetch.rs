//! Per-ticker fetch fan-out.
//!
//! Tickers are fetched independently on the rayon pool; results come back in
//! the order the tickers were given. The merge engine only ever sees the
//! collected results.

use super::provider::{BarProvider, ProviderError};
use crate::domain::{Interval, RawTickerFrame};
use chrono::NaiveDate;
use rayon::prelude::*;

/// Outcome of fetching one ticker.
#[derive(Debug)]
pub struct TickerFetch {
    pub ticker: String,
    pub result: Result<RawTickerFrame, ProviderError>,
}

/// Fetch every ticker, in parallel when `parallel` is set.
///
/// A failure for one ticker never affects the others. Once the provider
/// reports itself unavailable (circuit breaker open), remaining tickers fail
/// fast without a request.
pub fn fetch_all(
    provider: &dyn BarProvider,
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
    interval: Interval,
    parallel: bool,
) -> Vec<TickerFetch> {
    let fetch_one = |ticker: &String| {
        let result = if provider.is_available() {
            provider.fetch(ticker, start, end, interval)
        } else {
            Err(ProviderError::CircuitBreakerTripped)
        };
        match &result {
            Ok(frame) => tracing::debug!(
                ticker = %ticker,
                provider = provider.name(),
                bars = frame.bars.len(),
                observed = frame.observation_count(),
                "fetched"
            ),
            Err(e) => tracing::warn!(
                ticker = %ticker,
                provider = provider.name(),
                error = %e,
                "fetch failed"
            ),
        }
        TickerFetch {
            ticker: ticker.clone(),
            result,
        }
    };

    if parallel {
        tickers.par_iter().map(fetch_one).collect()
    } else {
        tickers.iter().map(fetch_one).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RawBar;
    use chrono::DateTime;

    struct FlakyProvider;

    impl BarProvider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        fn fetch(
            &self,
            ticker: &str,
            _start: NaiveDate,
            _end: NaiveDate,
            _interval: Interval,
        ) -> Result<RawTickerFrame, ProviderError> {
            if ticker == "BAD" {
                return Err(ProviderError::SymbolNotFound {
                    ticker: ticker.to_string(),
                });
            }
            let ts = DateTime::from_timestamp(1_704_205_800, 0).unwrap();
            Ok(RawTickerFrame::new(
                ticker,
                vec![RawBar::ohlcv(ts, 1.0, 1.0, 1.0, 1.0, 1.0)],
            ))
        }
    }

    struct ClosedProvider;

    impl BarProvider for ClosedProvider {
        fn name(&self) -> &str {
            "closed"
        }

        fn fetch(
            &self,
            _ticker: &str,
            _start: NaiveDate,
            _end: NaiveDate,
            _interval: Interval,
        ) -> Result<RawTickerFrame, ProviderError> {
            panic!("fetch must not be called while unavailable")
        }

        fn is_available(&self) -> bool {
            false
        }
    }

    fn tickers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    }

    #[test]
    fn failures_are_isolated_and_order_is_kept() {
        for parallel in [false, true] {
            let out = fetch_all(
                &FlakyProvider,
                &tickers(&["AAPL", "BAD", "MSFT"]),
                day(),
                day(),
                Interval::minutes(5),
                parallel,
            );
            let names: Vec<&str> = out.iter().map(|f| f.ticker.as_str()).collect();
            assert_eq!(names, vec!["AAPL", "BAD", "MSFT"]);
            assert!(out[0].result.is_ok());
            assert!(out[1].result.is_err());
            assert!(out[2].result.is_ok());
        }
    }

    #[test]
    fn unavailable_provider_fails_fast() {
        let out = fetch_all(
            &ClosedProvider,
            &tickers(&["AAPL", "MSFT"]),
            day(),
            day(),
            Interval::minutes(5),
            true,
        );
        assert!(out
            .iter()
            .all(|f| matches!(f.result, Err(ProviderError::CircuitBreakerTripped))));
    }
}
