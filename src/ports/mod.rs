//! Ports Layer - Trait definitions for external dependencies
//!
//! The backtest core never performs I/O; historical outright settlements and
//! the exchange trading calendar arrive through [`PriceSource`]. Adapters
//! implement it over files on disk, and [`InMemorySource`] over preloaded
//! fixtures.

pub mod memory;
pub mod price_source;

pub use memory::InMemorySource;
pub use price_source::{OutrightQuote, PriceSource, SourceError};

#[cfg(test)]
pub use price_source::MockPriceSource;
