//! Application Layer - Use cases wiring ports to the strategy
//!
//! - `series_builder`: concurrent leg fetch, per-root assembly and stitching
//! - `runner`: one differential through bands, engine and aggregation

pub mod runner;
pub mod series_builder;

pub use runner::{analyze, run_diff, DiffReport};
pub use series_builder::{contract_window, BuildError, BuilderConfig, LegCache, SeriesBuilder};
