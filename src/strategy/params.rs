//! Strategy Parameters
//!
//! Configuration structs for the band backtest.
//! Rolling windows are expressed in months and mapped to trading days.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::PriceTrack;

/// Months -> approximate trading days
pub const TRADING_DAYS_BY_MONTHS: [(u32, usize); 16] = [
    (1, 22),
    (2, 44),
    (3, 65),
    (4, 87),
    (5, 108),
    (6, 130),
    (9, 195),
    (12, 260),
    (15, 325),
    (18, 390),
    (21, 455),
    (24, 520),
    (27, 585),
    (30, 650),
    (33, 715),
    (36, 780),
];

/// Trailing window length for rolling statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RollingWindow {
    label: String,
    length: usize,
}

impl RollingWindow {
    /// Window for a whole number of months from the lookup table
    pub fn months(months: u32) -> Result<Self, ConfigError> {
        TRADING_DAYS_BY_MONTHS
            .iter()
            .find(|(m, _)| *m == months)
            .map(|&(m, length)| Self {
                label: format!("{m}m"),
                length,
            })
            .ok_or_else(|| ConfigError::InvalidRollingWindow(format!("{months}m")))
    }

    /// Window of an explicit number of observations, bypassing the month table
    pub fn trading_days(length: usize) -> Result<Self, ConfigError> {
        if length == 0 {
            return Err(ConfigError::InvalidWindowLength(length));
        }
        Ok(Self {
            label: format!("{length}d"),
            length,
        })
    }

    /// Number of observations in the window
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl FromStr for RollingWindow {
    type Err = ConfigError;

    fn from_str(unit: &str) -> Result<Self, Self::Err> {
        let unit = unit.trim();
        let invalid = || ConfigError::InvalidRollingWindow(unit.to_string());

        if let Some(months) = unit.strip_suffix('m') {
            let months: u32 = months.parse().map_err(|_| invalid())?;
            return Self::months(months);
        }
        if let Some(days) = unit.strip_suffix('d') {
            let days: usize = days.parse().map_err(|_| invalid())?;
            return Self::trading_days(days);
        }
        Err(invalid())
    }
}

impl TryFrom<String> for RollingWindow {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RollingWindow> for String {
    fn from(window: RollingWindow) -> Self {
        window.label
    }
}

impl fmt::Display for RollingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

/// Optional transition guards of the signal engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Carry an open position across one contract roll
    pub roll_aware: bool,
    /// Restrict entry direction by trailing skew
    pub skew_gated: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            roll_aware: true,
            skew_gated: false,
        }
    }
}

impl Capabilities {
    /// Contract rolls a single trade may carry before it is force-closed
    pub fn max_rolls(&self) -> usize {
        if self.roll_aware {
            1
        } else {
            0
        }
    }
}

/// Main backtest configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Trailing window for median/std
    pub window: RollingWindow,
    /// Band half-width in standard deviations
    pub sd_multiplier: f64,
    /// Price columns used for signals and P&L
    pub price_track: PriceTrack,
    pub capabilities: Capabilities,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            window: RollingWindow {
                label: "3m".to_string(),
                length: 65,
            },
            sd_multiplier: 1.0,
            price_track: PriceTrack::default(),
            capabilities: Capabilities::default(),
        }
    }
}

impl BacktestConfig {
    pub fn with_window(mut self, window: RollingWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_sd_multiplier(mut self, k: f64) -> Self {
        self.sd_multiplier = k;
        self
    }

    pub fn with_price_track(mut self, track: PriceTrack) -> Self {
        self.price_track = track;
        self
    }

    pub fn with_roll_aware(mut self, enabled: bool) -> Self {
        self.capabilities.roll_aware = enabled;
        self
    }

    pub fn with_skew_gate(mut self, enabled: bool) -> Self {
        self.capabilities.skew_gated = enabled;
        self
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.length == 0 {
            return Err(ConfigError::InvalidWindowLength(self.window.length));
        }
        if !self.sd_multiplier.is_finite() || self.sd_multiplier <= 0.0 {
            return Err(ConfigError::InvalidSdMultiplier(self.sd_multiplier));
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Unrecognized rolling window: '{0}' (expected e.g. 1m, 3m, 12m, 36m)")]
    InvalidRollingWindow(String),
    #[error("Invalid window length: {0} (must be at least 1)")]
    InvalidWindowLength(usize),
    #[error("Invalid sd multiplier: {0} (must be > 0)")]
    InvalidSdMultiplier(f64),
}
