//! spread-reversion - Rolling band research for commodity futures differentials
//!
//! Builds roll-stitched differential series from outright settlements,
//! computes rolling median/std bands, backtests a band-entry / median-exit
//! rule with contract-roll carry, and aggregates the trade ledger.
//!
//! # Modules
//!
//! - `domain`: Core types (PriceSeries, Position, Trade, ContractCode, DiffSpec)
//! - `ports`: Trait abstractions (PriceSource)
//! - `strategy`: Bands, the signal engine and performance aggregation
//! - `adapters`: External implementations (JSON files, CLI)
//! - `config`: Configuration loading and validation
//! - `application`: Series builder and differential runner

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod strategy;
