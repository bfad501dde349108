//! Configuration Loader
//!
//! Loads and validates configuration from TOML files.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::application::BuilderConfig;
use crate::domain::{roots_newest_first, ContractCode, DiffSpec, PriceTrack};
use crate::strategy::params::{BacktestConfig, Capabilities, RollingWindow};

/// Environment variable overriding `[data] dir`
pub const DATA_DIR_ENV: &str = "SPREAD_DATA_DIR";

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub backtest: BacktestSection,
    pub diff: DiffSection,
    pub data: DataSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Band strategy section
#[derive(Debug, Clone, Deserialize)]
pub struct BacktestSection {
    /// Rolling window unit, e.g. "3m"
    pub rolling_window: String,
    /// Band half-width in standard deviations
    pub sd_multiplier: u32,
    /// Carry open trades across one contract roll
    #[serde(default = "default_true")]
    pub roll_aware: bool,
    /// Gate entry direction on trailing skew
    #[serde(default)]
    pub skew_gated: bool,
    #[serde(default)]
    pub price_track: PriceTrack,
    /// Trailing months covered by the headline ledger
    #[serde(default = "default_ledger_lookback")]
    pub ledger_lookback_months: u32,
}

/// Differential definition section
#[derive(Debug, Clone, Deserialize)]
pub struct DiffSection {
    pub name: String,
    /// First spread expression, e.g. "Gas-Brt"
    pub first: String,
    /// Second spread expression
    pub second: String,
    /// M-offsets (1..=4) of the first and second expressions
    pub months: [u8; 2],
    /// Front-month roots, e.g. ["Mar", "Jun", "Sep", "Dec"]
    pub front_months: Vec<String>,
    /// Two-digit contract years
    pub years: Vec<u32>,
    /// History before each root's month
    #[serde(default = "default_lookback_months")]
    pub lookback_months: u32,
}

/// Data source section
#[derive(Debug, Clone, Deserialize)]
pub struct DataSection {
    /// Directory of outright sheets; `~` is expanded
    pub dir: String,
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
}

/// Logging section
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ledger_lookback() -> u32 {
    12
}

fn default_lookback_months() -> u32 {
    3
}

fn default_max_concurrent_fetches() -> usize {
    4
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Backtest section
        self.rolling_window()?;

        if self.backtest.sd_multiplier == 0 {
            return Err(ConfigError::ValidationError(
                "sd_multiplier must be >= 1".to_string(),
            ));
        }

        if self.backtest.ledger_lookback_months == 0 {
            return Err(ConfigError::ValidationError(
                "ledger_lookback_months must be >= 1".to_string(),
            ));
        }

        // Diff section
        self.diff_spec()?;

        if self.diff.front_months.is_empty() {
            return Err(ConfigError::ValidationError(
                "front_months cannot be empty".to_string(),
            ));
        }

        if self.diff.years.is_empty() {
            return Err(ConfigError::ValidationError(
                "years cannot be empty".to_string(),
            ));
        }

        if let Some(year) = self.diff.years.iter().find(|y| **y > 99) {
            return Err(ConfigError::ValidationError(format!(
                "years must be two-digit, got {}",
                year
            )));
        }

        self.roots()?;

        // Data section
        if self.data.dir.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "data dir cannot be empty".to_string(),
            ));
        }

        if self.data.max_concurrent_fetches == 0 {
            return Err(ConfigError::ValidationError(
                "max_concurrent_fetches must be >= 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn rolling_window(&self) -> Result<RollingWindow, ConfigError> {
        self.backtest
            .rolling_window
            .parse()
            .map_err(|e| ConfigError::ValidationError(format!("rolling_window: {}", e)))
    }

    pub fn diff_spec(&self) -> Result<DiffSpec, ConfigError> {
        let [first_month, second_month] = self.diff.months;
        DiffSpec::new(
            self.diff.name.clone(),
            &self.diff.first,
            &self.diff.second,
            (first_month, second_month),
        )
        .map_err(|e| ConfigError::ValidationError(format!("diff: {}", e)))
    }

    /// Front-month roots, newest first
    pub fn roots(&self) -> Result<Vec<ContractCode>, ConfigError> {
        roots_newest_first(&self.diff.front_months, &self.diff.years)
            .map_err(|e| ConfigError::ValidationError(format!("front_months: {}", e)))
    }

    pub fn builder_config(&self) -> Result<BuilderConfig, ConfigError> {
        Ok(BuilderConfig::new(self.roots()?)
            .with_lookback_months(self.diff.lookback_months)
            .with_max_concurrent_fetches(self.data.max_concurrent_fetches))
    }
}

impl DataSection {
    /// Data directory with environment override and `~` expansion.
    /// Checks SPREAD_DATA_DIR before the configured value.
    pub fn resolved_dir(&self) -> PathBuf {
        let raw = std::env::var(DATA_DIR_ENV)
            .ok()
            .filter(|dir| !dir.trim().is_empty())
            .unwrap_or_else(|| self.dir.clone());
        PathBuf::from(shellexpand::tilde(&raw).to_string())
    }
}

// Conversion from Config to BacktestConfig
impl TryFrom<&Config> for BacktestConfig {
    type Error = ConfigError;

    fn try_from(config: &Config) -> Result<Self, Self::Error> {
        let backtest = BacktestConfig {
            window: config.rolling_window()?,
            sd_multiplier: f64::from(config.backtest.sd_multiplier),
            price_track: config.backtest.price_track,
            capabilities: Capabilities {
                roll_aware: config.backtest.roll_aware,
                skew_gated: config.backtest.skew_gated,
            },
        };
        backtest
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        Ok(backtest)
    }
}
