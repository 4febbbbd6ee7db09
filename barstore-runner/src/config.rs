//! TOML configuration for store updates.
//!
//! ```toml
//! [market]
//! timezone = "America/New_York"
//! open = "09:30"
//! close = "16:00"
//! interval = "5m"
//!
//! [calendar]
//! weekends_closed = true
//! holidays = ["2024-07-04", "2024-12-25"]
//!
//! [store]
//! path = "data/bars.parquet"
//! schema_policy = "widen"
//! cache_dir = "data/cache"
//!
//! [universe]
//! tickers = ["SPY", "QQQ"]
//! ```
//!
//! Holidays are quoted date strings, not TOML date literals.

use barstore_core::calendar::{ConfigError, HolidayCalendar, MarketHours};
use barstore_core::domain::Interval;
use barstore_core::store::SchemaPolicy;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateConfig {
    pub market: MarketConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub universe: UniverseConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConfig {
    #[serde(flatten)]
    pub hours: MarketHours,
    pub interval: Interval,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarConfig {
    #[serde(default = "default_true")]
    pub weekends_closed: bool,
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            weekends_closed: true,
            holidays: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub schema_policy: SchemaPolicy,
    /// Per-session download cache; no caching when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UniverseConfig {
    #[serde(default)]
    pub tickers: Vec<String>,
}

impl UpdateConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Invalid(format!("read config {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::Invalid(format!("parse config TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(format!("serialize config: {e}")))
    }

    /// US equities, 5-minute bars, a handful of index ETFs.
    pub fn default_us() -> Self {
        Self {
            market: MarketConfig {
                hours: MarketHours::us_equity(),
                interval: Interval::minutes(5),
            },
            calendar: CalendarConfig::default(),
            store: StoreConfig {
                path: PathBuf::from("data/bars.parquet"),
                schema_policy: SchemaPolicy::Widen,
                cache_dir: Some(PathBuf::from("data/cache")),
            },
            universe: UniverseConfig {
                tickers: ["SPY", "QQQ", "IWM", "DIA"].map(String::from).to_vec(),
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.market.interval.as_secs() <= 0 {
            return Err(ConfigError::NonPositiveInterval {
                secs: self.market.interval.as_secs(),
            });
        }
        if !self.market.interval.is_intraday() {
            return Err(ConfigError::IntervalTooLong {
                secs: self.market.interval.as_secs(),
            });
        }
        self.market.hours.validate()?;
        if self.store.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("store path is empty".into()));
        }
        if self
            .store
            .cache_dir
            .as_ref()
            .is_some_and(|dir| dir.as_os_str().is_empty())
        {
            return Err(ConfigError::Invalid("cache_dir is empty".into()));
        }
        if let Some(bad) = self.universe.tickers.iter().find(|t| t.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("blank ticker in universe: {bad:?}")));
        }
        Ok(())
    }

    pub fn calendar(&self) -> HolidayCalendar {
        let calendar = HolidayCalendar::new(self.calendar.holidays.iter().copied());
        if self.calendar.weekends_closed {
            calendar
        } else {
            calendar.with_weekends_open()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use barstore_core::calendar::TradingCalendar;
    use chrono::NaiveTime;

    const SAMPLE: &str = r#"
[market]
timezone = "Europe/London"
open = "08:00"
close = "16:30"
interval = "15m"

[calendar]
holidays = ["2024-12-25", "2024-12-26"]

[store]
path = "lse.parquet"
schema_policy = "strict"

[universe]
tickers = ["VOD.L", "BP.L"]
"#;

    #[test]
    fn parses_full_file() {
        let config = UpdateConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.market.hours.timezone, chrono_tz::Europe::London);
        assert_eq!(config.market.hours.close, NaiveTime::from_hms_opt(16, 30, 0).unwrap());
        assert_eq!(config.market.interval, Interval::minutes(15));
        assert_eq!(config.store.schema_policy, SchemaPolicy::Strict);
        assert_eq!(config.universe.tickers, vec!["VOD.L", "BP.L"]);
        assert!(config.calendar.weekends_closed);

        let christmas = NaiveDate::from_ymd_opt(2024, 12, 25).unwrap();
        assert!(!config.calendar().is_trading_day(christmas));
    }

    #[test]
    fn optional_sections_default() {
        let config = UpdateConfig::from_toml(
            r#"
[market]
timezone = "America/New_York"
open = "09:30"
close = "16:00"
interval = "1h"

[store]
path = "bars.parquet"
"#,
        )
        .unwrap();
        assert_eq!(config.store.schema_policy, SchemaPolicy::Widen);
        assert_eq!(config.store.cache_dir, None);
        assert!(config.universe.tickers.is_empty());
        assert!(config.calendar.holidays.is_empty());
    }

    #[test]
    fn default_roundtrips_through_toml() {
        let config = UpdateConfig::default_us();
        let text = config.to_toml().unwrap();
        assert_eq!(UpdateConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn rejects_inverted_hours() {
        let text = SAMPLE.replace(r#"open = "08:00""#, r#"open = "17:00""#);
        assert!(matches!(
            UpdateConfig::from_toml(&text),
            Err(ConfigError::InvalidHours { .. })
        ));
    }

    #[test]
    fn rejects_zero_interval_and_bad_timezone() {
        let zero = SAMPLE.replace(r#"interval = "15m""#, r#"interval = "0m""#);
        assert_eq!(
            UpdateConfig::from_toml(&zero),
            Err(ConfigError::NonPositiveInterval { secs: 0 })
        );

        let tz = SAMPLE.replace("Europe/London", "Mars/Olympus_Mons");
        assert!(matches!(
            UpdateConfig::from_toml(&tz),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_huge_and_overflowing_intervals() {
        let long = SAMPLE.replace(r#"interval = "15m""#, r#"interval = "1000000000000m""#);
        assert!(matches!(
            UpdateConfig::from_toml(&long),
            Err(ConfigError::IntervalTooLong { .. })
        ));

        let overflow = SAMPLE.replace(r#"interval = "15m""#, r#"interval = "200000000000000000m""#);
        assert!(matches!(
            UpdateConfig::from_toml(&overflow),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn cache_dir_is_optional_but_not_blank() {
        let with_cache = SAMPLE.replace(
            r#"schema_policy = "strict""#,
            "schema_policy = \"strict\"\ncache_dir = \"cache/lse\"",
        );
        let config = UpdateConfig::from_toml(&with_cache).unwrap();
        assert_eq!(config.store.cache_dir, Some(PathBuf::from("cache/lse")));

        let blank = SAMPLE.replace(
            r#"schema_policy = "strict""#,
            "schema_policy = \"strict\"\ncache_dir = \"\"",
        );
        assert!(matches!(
            UpdateConfig::from_toml(&blank),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn from_file_reports_missing_file() {
        let err = UpdateConfig::from_file(Path::new("/nonexistent/barstore.toml")).unwrap_err();
        assert!(err.to_string().contains("read config"));
    }
}
