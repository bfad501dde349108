//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - File source: outright sheets and trading calendar as JSON on disk
//! - CLI: Command-line interface handlers

pub mod cli;
pub mod file_source;

pub use cli::CliApp;
pub use file_source::JsonFileSource;
