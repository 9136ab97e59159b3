//! Configuration types for the trading bot
//!
//! All settings are loaded from YAML into `BotConfig` and validated up
//! front: a bad configuration is fatal at startup, never discovered
//! mid-tick.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::executor::RetryConfig;
use crate::strategy::mean_reversion::MeanReversionConfig;
use crate::strategy::sma_cross::SmaCrossConfig;
use crate::strategy::{MeanReversion, RiskLimits, SmaCross, Strategy};

// ============================================================================
// Instruments
// ============================================================================

/// Instrument class, used to pick the cache TTL
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentClass {
    #[default]
    Intraday,
    Daily,
}

/// One tradable instrument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub symbol: String,
    #[serde(default)]
    pub class: InstrumentClass,
}

// ============================================================================
// Cache TTLs
// ============================================================================

/// Per-class cache TTLs in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlConfig {
    pub intraday_secs: u64,
    pub daily_secs: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            intraday_secs: 120,
            daily_secs: 3600,
        }
    }
}

// ============================================================================
// Data paths
// ============================================================================

/// Filesystem locations for durable artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub cache_dir: PathBuf,
    pub historical_dir: PathBuf,
    pub ledger_path: PathBuf,
    pub heartbeat_path: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("data/cache"),
            historical_dir: PathBuf::from("data/historical"),
            ledger_path: PathBuf::from("logs/trades.jsonl"),
            heartbeat_path: PathBuf::from("logs/heartbeat.json"),
        }
    }
}

// ============================================================================
// Market hours
// ============================================================================

fn default_true() -> bool {
    true
}

/// Raw market-hours settings as they appear in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketHoursConfig {
    /// Local open time, "HH:MM"
    pub open: String,
    /// Local close time, "HH:MM"
    pub close: String,
    /// Fixed offset from UTC, e.g. "-05:00"
    pub utc_offset: String,
    #[serde(default = "default_true")]
    pub weekdays_only: bool,
}

impl MarketHoursConfig {
    pub fn resolve(&self) -> Result<MarketHours, AppError> {
        let open = NaiveTime::parse_from_str(&self.open, "%H:%M")
            .map_err(|e| AppError::Config(format!("market_hours.open '{}': {e}", self.open)))?;
        let close = NaiveTime::parse_from_str(&self.close, "%H:%M")
            .map_err(|e| AppError::Config(format!("market_hours.close '{}': {e}", self.close)))?;
        if open >= close {
            return Err(AppError::Config(format!(
                "market_hours: open ({}) must be before close ({})",
                self.open, self.close
            )));
        }
        let offset: FixedOffset = self.utc_offset.parse().map_err(|e| {
            AppError::Config(format!(
                "market_hours.utc_offset '{}': {e}",
                self.utc_offset
            ))
        })?;
        Ok(MarketHours {
            open,
            close,
            offset,
            weekdays_only: self.weekdays_only,
        })
    }
}

/// Resolved trading window
#[derive(Debug, Clone, Copy)]
pub struct MarketHours {
    open: NaiveTime,
    close: NaiveTime,
    offset: FixedOffset,
    weekdays_only: bool,
}

impl MarketHours {
    /// Whether the market is open at `now`
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.offset);
        if self.weekdays_only
            && matches!(local.weekday(), Weekday::Sat | Weekday::Sun)
        {
            return false;
        }
        let t = local.time();
        t >= self.open && t < self.close
    }
}

// ============================================================================
// Strategy selection
// ============================================================================

/// Which strategy to run, chosen at configuration time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    SmaCross {
        fast_period: usize,
        slow_period: usize,
        order_quantity: f64,
    },
    MeanReversion {
        lookback_bars: usize,
        drop_threshold: f64,
        gain_threshold: f64,
        order_quantity: f64,
        #[serde(default)]
        max_additions: u32,
        #[serde(default)]
        max_holding_days: Option<u32>,
    },
}

impl StrategyConfig {
    fn to_sma(&self) -> Option<SmaCrossConfig> {
        match self {
            StrategyConfig::SmaCross {
                fast_period,
                slow_period,
                order_quantity,
            } => Some(SmaCrossConfig {
                fast_period: *fast_period,
                slow_period: *slow_period,
                order_quantity: *order_quantity,
            }),
            _ => None,
        }
    }

    fn to_mean_reversion(&self) -> Option<MeanReversionConfig> {
        match self {
            StrategyConfig::MeanReversion {
                lookback_bars,
                drop_threshold,
                gain_threshold,
                order_quantity,
                max_additions,
                max_holding_days,
            } => Some(MeanReversionConfig {
                lookback_bars: *lookback_bars,
                drop_threshold: *drop_threshold,
                gain_threshold: *gain_threshold,
                order_quantity: *order_quantity,
                max_additions: *max_additions,
                max_holding: max_holding_days.map(|d| Duration::days(i64::from(d))),
            }),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(cfg) = self.to_sma() {
            return cfg.validate();
        }
        if let Some(cfg) = self.to_mean_reversion() {
            return cfg.validate();
        }
        unreachable!("strategy variant not covered")
    }

    /// Instantiate the configured strategy
    pub fn build(&self) -> Box<dyn Strategy> {
        if let Some(cfg) = self.to_sma() {
            return Box::new(SmaCross::new(cfg));
        }
        if let Some(cfg) = self.to_mean_reversion() {
            return Box::new(MeanReversion::new(cfg));
        }
        unreachable!("strategy variant not covered")
    }
}

// ============================================================================
// Root configuration
// ============================================================================

fn default_bucket_secs() -> i64 {
    60
}

fn default_cache_retention_bars() -> usize {
    500
}

fn default_refresh_concurrency() -> usize {
    4
}

/// Root application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub instruments: Vec<InstrumentConfig>,
    /// Seconds between scheduler ticks
    pub tick_interval_secs: u64,
    /// Width of one price bucket in seconds
    #[serde(default = "default_bucket_secs")]
    pub bucket_secs: i64,
    #[serde(default)]
    pub ttl: TtlConfig,
    /// Buckets kept per instrument before the sweep evicts
    #[serde(default = "default_cache_retention_bars")]
    pub cache_retention_bars: usize,
    /// Concurrent instrument refreshes per tick
    #[serde(default = "default_refresh_concurrency")]
    pub refresh_concurrency: usize,
    pub risk: RiskLimits,
    #[serde(default)]
    pub retry: RetryConfig,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub market_hours: Option<MarketHoursConfig>,
}

impl BotConfig {
    /// Validate all configuration rules. Any violation is fatal at startup.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.instruments.is_empty() {
            return Err(AppError::Config(
                "Configuration must contain at least one instrument".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for instrument in &self.instruments {
            if instrument.symbol.trim().is_empty() {
                return Err(AppError::Config(
                    "Instrument symbol cannot be empty".to_string(),
                ));
            }
            if !seen.insert(&instrument.symbol) {
                return Err(AppError::Config(format!(
                    "Duplicate instrument symbol: '{}'",
                    instrument.symbol
                )));
            }
        }
        if self.tick_interval_secs == 0 {
            return Err(AppError::Config(
                "tick_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.bucket_secs <= 0 {
            return Err(AppError::Config(format!(
                "bucket_secs must be positive (got {})",
                self.bucket_secs
            )));
        }
        if self.refresh_concurrency == 0 {
            return Err(AppError::Config(
                "refresh_concurrency must be greater than zero".to_string(),
            ));
        }
        self.risk.validate()?;
        self.retry.validate()?;
        self.strategy.validate()?;
        if let Some(hours) = &self.market_hours {
            hours.resolve()?;
        }
        Ok(())
    }

    pub fn instrument_symbols(&self) -> Vec<String> {
        self.instruments.iter().map(|i| i.symbol.clone()).collect()
    }

    /// Per-instrument cache TTL resolved from the instrument class
    pub fn ttl_map(&self) -> HashMap<String, Duration> {
        self.instruments
            .iter()
            .map(|i| {
                let secs = match i.class {
                    InstrumentClass::Intraday => self.ttl.intraday_secs,
                    InstrumentClass::Daily => self.ttl.daily_secs,
                };
                (i.symbol.clone(), Duration::seconds(secs as i64))
            })
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn valid_yaml() -> &'static str {
        r#"
instruments:
  - symbol: AAPL
  - symbol: SPY
    class: daily
tick_interval_secs: 60
risk:
  max_position: 20.0
  max_order_size: 10.0
strategy:
  kind: sma_cross
  fast_period: 5
  slow_period: 20
  order_quantity: 10.0
"#
    }

    #[test]
    fn test_valid_config_deserializes_and_validates() {
        let config: BotConfig = serde_yaml::from_str(valid_yaml()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.instruments.len(), 2);
        assert_eq!(config.bucket_secs, 60);
        assert_eq!(config.cache_retention_bars, 500);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_instrument_class_defaults_to_intraday() {
        let config: BotConfig = serde_yaml::from_str(valid_yaml()).unwrap();
        assert_eq!(config.instruments[0].class, InstrumentClass::Intraday);
        assert_eq!(config.instruments[1].class, InstrumentClass::Daily);
    }

    #[test]
    fn test_ttl_map_uses_instrument_class() {
        let config: BotConfig = serde_yaml::from_str(valid_yaml()).unwrap();
        let ttls = config.ttl_map();
        assert_eq!(ttls["AAPL"], Duration::seconds(120));
        assert_eq!(ttls["SPY"], Duration::seconds(3600));
    }

    #[test]
    fn test_empty_instruments_fails() {
        let mut config: BotConfig = serde_yaml::from_str(valid_yaml()).unwrap();
        config.instruments.clear();
        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("at least one instrument"));
    }

    #[test]
    fn test_duplicate_symbol_fails() {
        let mut config: BotConfig = serde_yaml::from_str(valid_yaml()).unwrap();
        config.instruments.push(InstrumentConfig {
            symbol: "AAPL".to_string(),
            class: InstrumentClass::Intraday,
        });
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Duplicate"));
    }

    #[test]
    fn test_zero_tick_interval_fails() {
        let mut config: BotConfig = serde_yaml::from_str(valid_yaml()).unwrap();
        config.tick_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_strategy_parameters_fail() {
        let mut config: BotConfig = serde_yaml::from_str(valid_yaml()).unwrap();
        config.strategy = StrategyConfig::SmaCross {
            fast_period: 20,
            slow_period: 5,
            order_quantity: 10.0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mean_reversion_strategy_deserializes() {
        let yaml = r#"
instruments:
  - symbol: AAPL
tick_interval_secs: 60
risk:
  max_position: 40.0
  max_order_size: 10.0
strategy:
  kind: mean_reversion
  lookback_bars: 7
  drop_threshold: 0.10
  gain_threshold: 0.10
  order_quantity: 10.0
  max_additions: 3
  max_holding_days: 90
"#;
        let config: BotConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        let strategy = config.strategy.build();
        assert_eq!(strategy.name(), "mean-reversion");
    }

    #[test]
    fn test_strategy_build_produces_configured_kind() {
        let config: BotConfig = serde_yaml::from_str(valid_yaml()).unwrap();
        let strategy = config.strategy.build();
        assert_eq!(strategy.name(), "sma-cross");
        assert_eq!(strategy.lookback(), 21);
    }

    #[test]
    fn test_market_hours_resolve_and_is_open() {
        let hours = MarketHoursConfig {
            open: "09:30".to_string(),
            close: "16:00".to_string(),
            utc_offset: "-05:00".to_string(),
            weekdays_only: true,
        }
        .resolve()
        .unwrap();

        // Friday 2024-03-01 14:30 UTC == 09:30 local (-05:00): open
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();
        assert!(hours.is_open(t));
        // 21:00 UTC == 16:00 local: closed (close is exclusive)
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 21, 0, 0).unwrap();
        assert!(!hours.is_open(t));
        // Saturday: closed
        let t = Utc.with_ymd_and_hms(2024, 3, 2, 15, 0, 0).unwrap();
        assert!(!hours.is_open(t));
    }

    #[test]
    fn test_market_hours_inverted_window_fails() {
        let result = MarketHoursConfig {
            open: "16:00".to_string(),
            close: "09:30".to_string(),
            utc_offset: "-05:00".to_string(),
            weekdays_only: true,
        }
        .resolve();
        assert!(result.is_err());
    }

    #[test]
    fn test_bad_utc_offset_fails() {
        let result = MarketHoursConfig {
            open: "09:30".to_string(),
            close: "16:00".to_string(),
            utc_offset: "eastern".to_string(),
            weekdays_only: true,
        }
        .resolve();
        assert!(result.is_err());
    }
}
