//! Data pipeline: providers, fetch fan-out, alignment, gap-fill, combine.

pub mod align;
pub mod cache;
pub mod circuit_breaker;
pub mod combine;
pub mod fetch;
pub mod fill;
pub mod provider;
pub mod synthetic;
pub mod yahoo;

pub use align::{align_ticker, observed_sessions, AlignStats, AlignedTickerFrame, FillError};
pub use cache::{CachingProvider, SessionCache};
pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use combine::{combine, CombineError};
pub use fetch::{fetch_all, TickerFetch};
pub use fill::{fill_gaps, FillCounts};
pub use provider::{BarProvider, ProviderError};
pub use synthetic::SyntheticProvider;
pub use yahoo::YahooProvider;
