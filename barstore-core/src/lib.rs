//! Barstore Core: canonical intraday index, alignment, gap-fill, and the
//! incremental Parquet bar store.
//!
//! This crate contains the merge engine:
//! - Domain types (raw bars, intervals, wide multi-ticker frames)
//! - Trading calendar, market hours, and the canonical index builder
//! - Bar providers (Yahoo Finance, synthetic) behind one trait
//! - Per-ticker alignment and the interpolate/ffill/bfill gap-fill policy
//! - Multi-ticker combiner
//! - Store merge: dedup on timestamp, append, atomic persist

pub mod calendar;
pub mod data;
pub mod domain;
pub mod store;
