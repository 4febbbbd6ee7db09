//! Yahoo Finance intraday provider.
//!
//! Fetches bars from the v8 chart API with pre/post-market data included;
//! alignment later drops everything outside regular hours. Handles rate
//! limiting, retries with exponential backoff, and the circuit breaker.
//!
//! Yahoo has no official API and changes its response format without
//! notice; every parse failure maps to `ResponseFormatChanged`.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{BarProvider, ProviderError};
use crate::domain::{Interval, RawBar, RawTickerFrame};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

pub struct YahooProvider {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    timezone: Tz,
    max_retries: u32,
    base_delay: Duration,
}

impl YahooProvider {
    /// `timezone` is the exchange timezone used to turn request dates into
    /// epoch bounds.
    pub fn new(circuit_breaker: Arc<CircuitBreaker>, timezone: Tz) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| ProviderError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            circuit_breaker,
            timezone,
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        })
    }

    fn local_midnight(&self, date: NaiveDate) -> i64 {
        self.timezone
            .from_local_datetime(&date.and_time(NaiveTime::default()))
            .earliest()
            .map(|dt| dt.timestamp())
            .unwrap_or_else(|| date.and_time(NaiveTime::default()).and_utc().timestamp())
    }

    /// Chart API URL covering `[start, end)` in exchange-local days.
    fn chart_url(&self, ticker: &str, start: NaiveDate, end: NaiveDate, code: &str) -> String {
        let period1 = self.local_midnight(start);
        let period2 = self.local_midnight(end);
        format!(
            "https://query2.finance.yahoo.com/v8/finance/chart/{ticker}\
             ?period1={period1}&period2={period2}&interval={code}\
             &includePrePost=true"
        )
    }

    fn parse_response(ticker: &str, resp: ChartResponse) -> Result<RawTickerFrame, ProviderError> {
        let result = resp.chart.result.ok_or_else(|| match resp.chart.error {
            Some(err) if err.code == "Not Found" => ProviderError::SymbolNotFound {
                ticker: ticker.to_string(),
            },
            Some(err) => {
                ProviderError::ResponseFormatChanged(format!("{}: {}", err.code, err.description))
            }
            None => ProviderError::ResponseFormatChanged("empty result with no error".into()),
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ResponseFormatChanged("result array is empty".into()))?;

        // No timestamps: the range had no trading at all for this symbol.
        let Some(timestamps) = data.timestamp else {
            return Ok(RawTickerFrame::empty(ticker));
        };

        let quote = data.indicators.quote.into_iter().next().unwrap_or_default();

        let mut bars = Vec::with_capacity(timestamps.len());
        for (i, &ts) in timestamps.iter().enumerate() {
            let timestamp = DateTime::<Utc>::from_timestamp(ts, 0).ok_or_else(|| {
                ProviderError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
            })?;
            let bar = RawBar {
                timestamp,
                open: quote.open.get(i).copied().flatten(),
                high: quote.high.get(i).copied().flatten(),
                low: quote.low.get(i).copied().flatten(),
                close: quote.close.get(i).copied().flatten(),
                volume: quote.volume.get(i).copied().flatten(),
            };
            if !bar.is_empty() {
                bars.push(bar);
            }
        }

        Ok(RawTickerFrame::new(ticker, bars))
    }

    fn fetch_with_retry(&self, ticker: &str, url: &str) -> Result<RawTickerFrame, ProviderError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                std::thread::sleep(self.base_delay * 2u32.pow(attempt - 1));
            }

            if !self.circuit_breaker.is_allowed() {
                return Err(ProviderError::CircuitBreakerTripped);
            }

            let resp = match self.client.get(url).send() {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    self.circuit_breaker.record_failure();
                    tracing::debug!(ticker, attempt, error = %e, "yahoo request failed, retrying");
                    last_error = Some(ProviderError::NetworkUnreachable(e.to_string()));
                    continue;
                }
                Err(e) => return Err(ProviderError::NetworkUnreachable(e.to_string())),
            };

            let status = resp.status();
            if status == reqwest::StatusCode::FORBIDDEN {
                self.circuit_breaker.trip();
                return Err(ProviderError::CircuitBreakerTripped);
            }
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                self.circuit_breaker.record_failure();
                let retry_after = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                last_error = Some(ProviderError::RateLimited {
                    retry_after_secs: retry_after,
                });
                continue;
            }
            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Err(ProviderError::AuthenticationRequired(
                    "Yahoo Finance requires authentication".into(),
                ));
            }
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(ProviderError::SymbolNotFound {
                    ticker: ticker.to_string(),
                });
            }
            if !status.is_success() {
                self.circuit_breaker.record_failure();
                last_error = Some(ProviderError::Other(format!("HTTP {status} for {ticker}")));
                continue;
            }

            let chart: ChartResponse = resp.json().map_err(|e| {
                ProviderError::ResponseFormatChanged(format!("failed to parse response for {ticker}: {e}"))
            })?;
            let frame = Self::parse_response(ticker, chart)?;
            self.circuit_breaker.record_success();
            return Ok(frame);
        }

        Err(last_error.unwrap_or_else(|| ProviderError::Other("max retries exceeded".into())))
    }
}

impl BarProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
        interval: Interval,
    ) -> Result<RawTickerFrame, ProviderError> {
        let code = interval
            .yahoo_code()
            .ok_or_else(|| ProviderError::UnsupportedInterval {
                interval,
                provider: self.name().to_string(),
            })?;
        if !self.circuit_breaker.is_allowed() {
            return Err(ProviderError::CircuitBreakerTripped);
        }
        let url = self.chart_url(ticker, start, end, code);
        self.fetch_with_retry(ticker, &url)
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::BreakerState;

    fn parse(json: &str) -> Result<RawTickerFrame, ProviderError> {
        let resp: ChartResponse = serde_json::from_str(json).unwrap();
        YahooProvider::parse_response("SPY", resp)
    }

    #[test]
    fn parses_quotes_and_skips_empty_rows() {
        let frame = parse(
            r#"{"chart":{"result":[{"timestamp":[1704205800,1704206100,1704206400],
            "indicators":{"quote":[{"open":[470.0,null,471.0],"high":[471.0,null,472.0],
            "low":[469.5,null,470.5],"close":[470.5,null,471.5],"volume":[1000,null,1200]}]}}],
            "error":null}}"#,
        )
        .unwrap();

        assert_eq!(frame.ticker, "SPY");
        assert_eq!(frame.bars.len(), 2);
        assert_eq!(frame.bars[0].timestamp.timestamp(), 1704205800);
        assert_eq!(frame.bars[1].close, Some(471.5));
        assert_eq!(frame.bars[1].volume, Some(1200.0));
    }

    #[test]
    fn missing_timestamps_is_an_empty_frame() {
        let frame = parse(
            r#"{"chart":{"result":[{"indicators":{"quote":[{}]}}],"error":null}}"#,
        )
        .unwrap();
        assert!(frame.bars.is_empty());
    }

    #[test]
    fn not_found_maps_to_symbol_not_found() {
        let err = parse(
            r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found"}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ProviderError::SymbolNotFound { .. }));
    }

    #[test]
    fn unsupported_interval_is_rejected_before_any_request() {
        let provider = YahooProvider::new(
            Arc::new(CircuitBreaker::default_provider()),
            chrono_tz::America::New_York,
        )
        .unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let err = provider
            .fetch("SPY", day, day, Interval::minutes(7))
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedInterval { .. }));
    }

    #[test]
    fn refused_connections_trip_the_breaker() {
        // Bind then drop to get a local port nothing listens on
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let breaker = Arc::new(CircuitBreaker::new(Duration::from_secs(60), 2));
        let mut provider =
            YahooProvider::new(Arc::clone(&breaker), chrono_tz::America::New_York).unwrap();
        provider.max_retries = 1;
        provider.base_delay = Duration::from_millis(1);

        let err = provider
            .fetch_with_retry("SPY", &format!("http://127.0.0.1:{port}/chart"))
            .unwrap_err();
        assert!(!matches!(err, ProviderError::SymbolNotFound { .. }));
        assert!(matches!(breaker.state(), BreakerState::Open { .. }));
        assert!(!provider.is_available());
    }

    #[test]
    fn url_bounds_are_exchange_local_midnights() {
        let provider = YahooProvider::new(
            Arc::new(CircuitBreaker::default_provider()),
            chrono_tz::America::New_York,
        )
        .unwrap();
        let url = provider.chart_url(
            "SPY",
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
            "5m",
        );
        // 2024-01-02T05:00:00Z and 2024-01-03T05:00:00Z
        assert!(url.contains("period1=1704171600"));
        assert!(url.contains("period2=1704258000"));
        assert!(url.contains("interval=5m"));
    }
}
