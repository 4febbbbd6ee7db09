//! Domain types for the bar store.

pub mod field;
pub mod frame;
pub mod interval;
pub mod raw;

pub use field::{ColumnKey, Field};
pub use frame::{BarFrame, FrameError};
pub use interval::{Interval, IntervalParseError};
pub use raw::{RawBar, RawTickerFrame};
