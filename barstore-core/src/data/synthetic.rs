//! Deterministic synthetic intraday bars for offline runs and tests.
//!
//! Each (ticker, session) pair seeds its own random walk, so the same bar
//! comes out identical no matter which date range requested it. Results are
//! obviously fake; nothing marks them apart from the provider name.

use super::provider::{BarProvider, ProviderError};
use crate::calendar::{MarketHours, TradingCalendar, WeekdayCalendar};
use crate::domain::{Interval, RawBar, RawTickerFrame};
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub struct SyntheticProvider {
    hours: MarketHours,
    /// Probability that a bar is left out, producing gaps to fill.
    gap_probability: f64,
    /// Emit a few bars before the open, as real providers do with pre/post data.
    extended_hours: bool,
}

impl SyntheticProvider {
    pub fn new(hours: MarketHours) -> Self {
        Self {
            hours,
            gap_probability: 0.05,
            extended_hours: true,
        }
    }

    pub fn with_gap_probability(mut self, p: f64) -> Self {
        self.gap_probability = p.clamp(0.0, 1.0);
        self
    }

    pub fn with_extended_hours(mut self, enabled: bool) -> Self {
        self.extended_hours = enabled;
        self
    }

    fn rng_for(ticker: &str, day: NaiveDate) -> StdRng {
        let mut hasher = blake3::Hasher::new();
        hasher.update(ticker.as_bytes());
        hasher.update(day.to_string().as_bytes());
        StdRng::from_seed(*hasher.finalize().as_bytes())
    }

    fn session_bars(&self, ticker: &str, day: NaiveDate, interval: Interval) -> Vec<RawBar> {
        let mut rng = Self::rng_for(ticker, day);
        let step = interval.as_duration();
        let mut price: f64 = rng.gen_range(20.0..500.0);
        let mut bars = Vec::new();

        let close = day.and_time(self.hours.close);
        let mut local = day.and_time(self.hours.open);
        if self.extended_hours {
            local -= step * 3;
        }

        while local < close {
            let ret: f64 = rng.gen_range(-0.004..0.004);
            let open = price;
            let next = price * (1.0 + ret);
            let high = open.max(next) * (1.0 + rng.gen_range(0.0..0.001));
            let low = open.min(next) * (1.0 - rng.gen_range(0.0..0.001));
            let volume = f64::from(rng.gen_range(1_000u32..50_000));
            let skip = rng.gen_bool(self.gap_probability);
            price = next;

            if !skip {
                if let Some(ts) = self.hours.localize(day, local.time()) {
                    bars.push(RawBar::ohlcv(ts, open, high, low, next, volume));
                }
            }
            local += step;
        }
        bars
    }
}

impl BarProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
        interval: Interval,
    ) -> Result<RawTickerFrame, ProviderError> {
        if !interval.is_intraday() {
            return Err(ProviderError::UnsupportedInterval {
                interval,
                provider: self.name().to_string(),
            });
        }
        let bars = WeekdayCalendar
            .trading_days(start, end)
            .into_iter()
            .flat_map(|day| self.session_bars(ticker, day, interval))
            .collect();
        Ok(RawTickerFrame::new(ticker, bars))
    }
}
