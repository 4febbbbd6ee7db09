//! The fixed per-ticker field set and the (ticker, field) column key.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the five OHLCV fields stored per ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl Field {
    /// All fields in storage order.
    pub const ALL: [Field; 5] = [
        Field::Open,
        Field::High,
        Field::Low,
        Field::Close,
        Field::Volume,
    ];

    /// Position in [`Field::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Column name used in the Parquet store.
    pub fn name(self) -> &'static str {
        match self {
            Field::Open => "open",
            Field::High => "high",
            Field::Low => "low",
            Field::Close => "close",
            Field::Volume => "volume",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|field| field.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown field '{s}'"))
    }
}

/// Column identity in a combined frame: (ticker, field).
///
/// Ordered by ticker first, then field, so a `BTreeMap<ColumnKey, _>` keeps
/// each ticker's five columns adjacent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnKey {
    pub ticker: String,
    pub field: Field,
}

impl ColumnKey {
    pub fn new(ticker: impl Into<String>, field: Field) -> Self {
        Self {
            ticker: ticker.into(),
            field,
        }
    }

    /// The five column keys for a ticker.
    pub fn for_ticker(ticker: &str) -> impl Iterator<Item = ColumnKey> + '_ {
        Field::ALL.into_iter().map(move |f| ColumnKey::new(ticker, f))
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.ticker, self.field)
    }
}
