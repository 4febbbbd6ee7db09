//! Persistent bar store: a single Parquet file plus a JSON sidecar.
//!
//! The store holds the accumulated history for every ticker ever merged.
//! Merges only append rows for timestamps the store has not seen; rows
//! already on disk are never removed or rewritten with different values.
//!
//! No locking: concurrent writers to the same path are not supported.

pub mod merge;
pub mod parquet;
pub mod schema;

pub use merge::{merge_frames, MergeOutcome};
pub use parquet::{BarStore, MergeReport, StoreMeta, StoredFrame};
pub use schema::BarSchema;

use crate::domain::{FrameError, Interval};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("corrupt store {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("metadata error: {0}")]
    Metadata(String),

    #[error(
        "store has no metadata sidecar at {}; timezone and interval cannot be verified",
        path.display()
    )]
    MissingMetadata { path: PathBuf },

    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// What to do when incoming columns differ from the stored ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaPolicy {
    /// Union the column sets. Stored rows get nulls for new columns; new rows
    /// get nulls for stored columns absent from the incoming frame.
    #[default]
    Widen,
    /// Any difference from an existing column set is a `SchemaMismatch`.
    Strict,
}

impl std::str::FromStr for SchemaPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "widen" => Ok(SchemaPolicy::Widen),
            "strict" => Ok(SchemaPolicy::Strict),
            other => Err(format!("unknown schema policy '{other}' (expected widen or strict)")),
        }
    }
}

/// Exchange timezone and interval the incoming frame was built with.
///
/// A store only ever holds one (timezone, interval) pair; merging a frame
/// built with a different one is a schema mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreContext {
    pub timezone: Tz,
    pub interval: Interval,
}
