//! Barstore Runner: configuration and the update pipeline.
//!
//! This crate builds on `barstore-core` to provide:
//! - TOML update configuration (market hours, calendar, store, universe)
//! - `update_store`, the single entry point that fetches, aligns, combines,
//!   and merges into the persistent store
//! - Run reports and progress callbacks

pub mod config;
pub mod report;
pub mod update;

pub use config::UpdateConfig;
pub use report::{
    FailureStage, LogProgress, TickerFailure, TickerSuccess, UpdateProgress, UpdateReport,
};
pub use update::{update_store, UpdateError, UpdateRequest};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<UpdateConfig>();
        assert_sync::<UpdateConfig>();
        assert_send::<UpdateRequest>();
        assert_sync::<UpdateRequest>();
    }

    #[test]
    fn report_is_send_sync() {
        assert_send::<UpdateReport>();
        assert_sync::<UpdateReport>();
    }
}
