//! Update run report and progress callbacks.

use barstore_core::domain::ColumnKey;
use barstore_core::store::MergeReport;
use std::fmt;

/// Pipeline stage at which a ticker was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Fetch,
    Align,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::Fetch => f.write_str("fetch"),
            FailureStage::Align => f.write_str("align"),
        }
    }
}

/// A ticker that made it into the combined frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerSuccess {
    pub ticker: String,
    /// Grid rows with at least one observed field.
    pub observed_rows: usize,
    /// Cells produced by gap-fill, summed over the five fields.
    pub filled_cells: usize,
}

/// A ticker excluded from this run.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerFailure {
    pub ticker: String,
    pub stage: FailureStage,
    pub reason: String,
}

/// Outcome of one `update_store` call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateReport {
    /// Rows in the canonical index after dropping sessions with no data.
    pub index_rows: usize,
    pub sessions: usize,
    pub succeeded: Vec<TickerSuccess>,
    pub failed: Vec<TickerFailure>,
    /// `None` when no ticker produced data and the store was not touched.
    pub merge: Option<MergeReport>,
}

impl UpdateReport {
    pub fn rows_appended(&self) -> usize {
        self.merge.as_ref().map_or(0, |m| m.rows_appended)
    }

    pub fn store_created(&self) -> bool {
        self.merge.as_ref().is_some_and(|m| m.created)
    }

    pub fn columns_added(&self) -> &[ColumnKey] {
        self.merge
            .as_ref()
            .map(|m| m.columns_added.as_slice())
            .unwrap_or_default()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Progress callbacks for an update run.
pub trait UpdateProgress: Send + Sync {
    /// Called once per ticker after it is aligned or dropped.
    fn on_ticker(&self, ticker: &str, result: &Result<TickerSuccess, TickerFailure>);

    /// Called after the store merge.
    fn on_merge(&self, report: &MergeReport);
}

/// Progress reporter that writes through `tracing`.
pub struct LogProgress;

impl UpdateProgress for LogProgress {
    fn on_ticker(&self, ticker: &str, result: &Result<TickerSuccess, TickerFailure>) {
        match result {
            Ok(ok) => tracing::info!(
                ticker,
                observed = ok.observed_rows,
                filled = ok.filled_cells,
                "ticker aligned"
            ),
            Err(fail) => tracing::warn!(
                ticker,
                stage = %fail.stage,
                reason = %fail.reason,
                "ticker excluded"
            ),
        }
    }

    fn on_merge(&self, report: &MergeReport) {
        tracing::info!(
            created = report.created,
            appended = report.rows_appended,
            rows = report.rows_after,
            "store updated"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report_has_no_merge() {
        let report = UpdateReport::default();
        assert_eq!(report.rows_appended(), 0);
        assert!(!report.store_created());
        assert!(report.columns_added().is_empty());
        assert!(!report.has_failures());
    }

    #[test]
    fn merge_counts_pass_through() {
        let report = UpdateReport {
            merge: Some(MergeReport {
                created: true,
                rows_before: 0,
                rows_appended: 78,
                rows_after: 78,
                columns_added: vec![ColumnKey::new("SPY", barstore_core::domain::Field::Close)],
                written: true,
            }),
            failed: vec![TickerFailure {
                ticker: "BAD".into(),
                stage: FailureStage::Fetch,
                reason: "symbol not found".into(),
            }],
            ..Default::default()
        };
        assert_eq!(report.rows_appended(), 78);
        assert!(report.store_created());
        assert_eq!(report.columns_added().len(), 1);
        assert!(report.has_failures());
    }
}
