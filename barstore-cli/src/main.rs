//! Barstore CLI: incremental intraday bar store maintenance.
//!
//! Commands:
//! - `update`: fetch tickers over a date range and merge them into the store
//! - `status`: report store metadata (rows, tickers, time range)
//! - `init-config`: write a default TOML update config

use anyhow::{bail, Context, Result};
use barstore_core::calendar::MarketHours;
use barstore_core::data::{
    BarProvider, CachingProvider, CircuitBreaker, SessionCache, SyntheticProvider, YahooProvider,
};
use barstore_core::domain::Interval;
use barstore_core::store::{BarStore, MergeReport, SchemaPolicy, StoreMeta};
use barstore_runner::{
    update_store, TickerFailure, TickerSuccess, UpdateConfig, UpdateProgress, UpdateReport,
    UpdateRequest,
};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "barstore",
    about = "Barstore CLI: incremental intraday bar store"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch tickers and merge them into the store.
    Update {
        /// Tickers to fetch (e.g., SPY QQQ). Defaults to the config universe.
        tickers: Vec<String>,

        /// First session date (YYYY-MM-DD). Defaults to 5 days ago.
        #[arg(long)]
        start: Option<String>,

        /// Last session date, exclusive (YYYY-MM-DD). Defaults to tomorrow.
        #[arg(long)]
        end: Option<String>,

        /// Path to a TOML update config.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Store path. Overrides the config.
        #[arg(long)]
        store: Option<PathBuf>,

        /// Bar interval (e.g., 1m, 5m, 1h). Overrides the config.
        #[arg(long)]
        interval: Option<Interval>,

        /// Schema policy for new tickers: widen or strict. Overrides the config.
        #[arg(long)]
        schema_policy: Option<SchemaPolicy>,

        /// Per-session download cache directory. Overrides the config.
        #[arg(long, conflicts_with = "no_cache")]
        cache_dir: Option<PathBuf>,

        /// Always download, ignoring any configured cache.
        #[arg(long, default_value_t = false)]
        no_cache: bool,

        /// Use the offline synthetic provider instead of Yahoo (never cached).
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Fetch tickers one at a time.
        #[arg(long, default_value_t = false)]
        sequential: bool,
    },
    /// Report store rows, tickers, and time range.
    Status {
        /// Store path.
        #[arg(long)]
        store: Option<PathBuf>,

        /// Take the store path from a TOML update config.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Write a default TOML update config.
    InitConfig {
        /// Output path.
        #[arg(default_value = "barstore.toml")]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Update {
            tickers,
            start,
            end,
            config,
            store,
            interval,
            schema_policy,
            cache_dir,
            no_cache,
            synthetic,
            sequential,
        } => {
            let overrides = UpdateOverrides {
                tickers,
                store,
                interval,
                schema_policy,
                cache_dir,
                no_cache,
                parallel: !sequential,
            };
            run_update(config.as_deref(), overrides, start, end, synthetic)
        }
        Commands::Status { store, config } => run_status(store, config.as_deref()),
        Commands::InitConfig { path } => run_init_config(&path),
    }
}

/// Command-line values that take precedence over the config file.
struct UpdateOverrides {
    tickers: Vec<String>,
    store: Option<PathBuf>,
    interval: Option<Interval>,
    schema_policy: Option<SchemaPolicy>,
    cache_dir: Option<PathBuf>,
    no_cache: bool,
    parallel: bool,
}

fn run_update(
    config_path: Option<&Path>,
    overrides: UpdateOverrides,
    start: Option<String>,
    end: Option<String>,
    synthetic: bool,
) -> Result<()> {
    let config = match config_path {
        Some(path) => UpdateConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => UpdateConfig::default_us(),
    };

    let today = chrono::Local::now().date_naive();
    let start_date = parse_date(start.as_deref())?.unwrap_or(today - chrono::Duration::days(5));
    let end_date = parse_date(end.as_deref())?.unwrap_or(today + chrono::Duration::days(1));

    let mut req = UpdateRequest::from_config(&config, start_date, end_date);
    if !overrides.tickers.is_empty() {
        req.tickers = overrides.tickers.into_iter().collect();
    }
    if let Some(store) = overrides.store {
        req.store_path = store;
    }
    if let Some(interval) = overrides.interval {
        req.interval = interval;
    }
    if let Some(policy) = overrides.schema_policy {
        req.schema_policy = policy;
    }
    req.parallel = overrides.parallel;

    if req.tickers.is_empty() {
        bail!("no tickers given and the config universe is empty");
    }

    tracing::debug!(
        tickers = req.tickers.len(),
        store = %req.store_path.display(),
        synthetic,
        "update request"
    );
    let calendar = config.calendar();
    let mut provider = build_provider(req.hours, synthetic)?;
    let cache_dir = if overrides.no_cache || synthetic {
        None
    } else {
        overrides.cache_dir.or_else(|| config.store.cache_dir.clone())
    };
    if let Some(dir) = cache_dir {
        tracing::debug!(cache = %dir.display(), "using session cache");
        provider = Box::new(CachingProvider::new(
            provider,
            SessionCache::new(dir),
            req.hours,
            Arc::new(config.calendar()),
        ));
    }
    let report = update_store(&req, provider.as_ref(), &calendar, &StdoutProgress)?;

    print_report(&report, &req.store_path);

    if report.has_failures() {
        for fail in &report.failed {
            eprintln!("Error for {}: {} ({})", fail.ticker, fail.reason, fail.stage);
        }
        std::process::exit(1);
    }

    Ok(())
}

fn build_provider(hours: MarketHours, synthetic: bool) -> Result<Box<dyn BarProvider>> {
    if synthetic {
        return Ok(Box::new(SyntheticProvider::new(hours)));
    }
    let circuit_breaker = Arc::new(CircuitBreaker::default_provider());
    Ok(Box::new(YahooProvider::new(circuit_breaker, hours.timezone)?))
}

fn parse_date(value: Option<&str>) -> Result<Option<NaiveDate>> {
    value
        .map(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .with_context(|| format!("invalid date '{s}', expected YYYY-MM-DD"))
        })
        .transpose()
}

fn print_report(report: &UpdateReport, store_path: &Path) {
    println!("\n=== Update Summary ===");
    println!("Store:       {}", store_path.display());
    println!("Sessions:    {}", report.sessions);
    println!("Index rows:  {}", report.index_rows);
    println!(
        "Tickers:     {} succeeded, {} failed",
        report.succeeded.len(),
        report.failed.len()
    );
    match &report.merge {
        Some(merge) if merge.created => {
            println!("Created store with {} rows", merge.rows_after);
        }
        Some(merge) if merge.written => {
            println!(
                "Appended {} rows ({} -> {})",
                merge.rows_appended, merge.rows_before, merge.rows_after
            );
        }
        Some(_) => println!("Store already up to date"),
        None => println!("Store not touched"),
    }
    let added = report.columns_added();
    if !added.is_empty() {
        let names: Vec<String> = added.iter().map(|k| k.to_string()).collect();
        println!("New columns: {}", names.join(", "));
    }
}

fn run_status(store: Option<PathBuf>, config_path: Option<&Path>) -> Result<()> {
    let path = match (store, config_path) {
        (Some(path), _) => path,
        (None, Some(config)) => UpdateConfig::from_file(config)?.store.path,
        (None, None) => UpdateConfig::default_us().store.path,
    };
    let store = BarStore::new(&path);

    if !store.exists() {
        println!("Store does not exist: {}", path.display());
        return Ok(());
    }

    let meta = match store.read_meta()? {
        Some(meta) => meta,
        None => {
            // No sidecar: fall back to reading the data itself
            let loaded = store
                .load()?
                .context("store disappeared while reading status")?;
            println!("Store: {} (no metadata sidecar)", path.display());
            println!("Rows:    {}", loaded.frame.height());
            println!("Tickers: {}", loaded.frame.tickers().join(", "));
            print_range(loaded.frame.first_timestamp(), loaded.frame.last_timestamp());
            return Ok(());
        }
    };

    print_meta(&path, &meta);
    Ok(())
}

fn print_meta(path: &Path, meta: &StoreMeta) {
    println!("Store: {}", path.display());
    println!("Timezone: {}", meta.timezone);
    println!("Interval: {}", meta.interval);
    println!("Rows:     {}", meta.row_count);
    println!("Tickers:  {} ({})", meta.tickers.len(), meta.tickers.join(", "));
    print_range(meta.first_timestamp, meta.last_timestamp);
    println!("Updated:  {}", meta.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
}

fn print_range(
    first: Option<chrono::DateTime<chrono::Utc>>,
    last: Option<chrono::DateTime<chrono::Utc>>,
) {
    match (first, last) {
        (Some(first), Some(last)) => println!("Range:    {first} .. {last}"),
        _ => println!("Range:    (empty)"),
    }
}

fn run_init_config(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("{} already exists, refusing to overwrite", path.display());
    }
    let toml = UpdateConfig::default_us().to_toml()?;
    std::fs::write(path, toml).with_context(|| format!("writing {}", path.display()))?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

/// Progress reporter that prints one line per ticker.
struct StdoutProgress;

impl UpdateProgress for StdoutProgress {
    fn on_ticker(&self, ticker: &str, result: &Result<TickerSuccess, TickerFailure>) {
        match result {
            Ok(ok) => println!(
                "  OK: {ticker} ({} bars observed, {} cells filled)",
                ok.observed_rows, ok.filled_cells
            ),
            Err(fail) => println!("  FAIL: {ticker}: {} ({})", fail.reason, fail.stage),
        }
    }

    fn on_merge(&self, report: &MergeReport) {
        if report.written {
            println!("Merged: +{} rows", report.rows_appended);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn update_flags_parse() {
        let cli = Cli::try_parse_from([
            "barstore",
            "update",
            "SPY",
            "QQQ",
            "--interval",
            "15m",
            "--schema-policy",
            "strict",
            "--synthetic",
        ])
        .unwrap();
        match cli.command {
            Commands::Update {
                tickers,
                interval,
                schema_policy,
                synthetic,
                sequential,
                ..
            } => {
                assert_eq!(tickers, vec!["SPY", "QQQ"]);
                assert_eq!(interval, Some(Interval::minutes(15)));
                assert_eq!(schema_policy, Some(SchemaPolicy::Strict));
                assert!(synthetic);
                assert!(!sequential);
            }
            _ => panic!("expected update"),
        }
    }

    #[test]
    fn cache_flags_are_exclusive() {
        let cli =
            Cli::try_parse_from(["barstore", "update", "SPY", "--cache-dir", "cache"]).unwrap();
        match cli.command {
            Commands::Update {
                cache_dir,
                no_cache,
                ..
            } => {
                assert_eq!(cache_dir, Some(PathBuf::from("cache")));
                assert!(!no_cache);
            }
            _ => panic!("expected update"),
        }
        assert!(Cli::try_parse_from([
            "barstore",
            "update",
            "--cache-dir",
            "cache",
            "--no-cache"
        ])
        .is_err());
    }

    #[test]
    fn bad_interval_is_rejected() {
        assert!(Cli::try_parse_from(["barstore", "update", "--interval", "5s"]).is_err());
    }

    #[test]
    fn parse_date_accepts_iso_only() {
        assert_eq!(
            parse_date(Some("2024-01-02")).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2)
        );
        assert!(parse_date(Some("01/02/2024")).is_err());
        assert_eq!(parse_date(None).unwrap(), None);
    }

    #[test]
    fn init_config_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("barstore.toml");
        run_init_config(&path).unwrap();
        let parsed = UpdateConfig::from_file(&path).unwrap();
        assert_eq!(parsed, UpdateConfig::default_us());
        assert!(run_init_config(&path).is_err());
    }
}
