//! Configuration Module
//!
//! Loads and validates configuration from TOML files.

pub mod loader;

pub use loader::{
    load_config, BacktestSection, Config, ConfigError, DataSection, DiffSection, LoggingSection,
    DATA_DIR_ENV,
};
