//! Strategy Layer - Rolling band mean reversion
//!
//! - `params`: rolling window units, band width and engine capabilities
//! - `rolling_stats`: trailing median/std/skew and band construction
//! - `engine`: the entry/exit/roll state machine and backtest runner
//! - `performance`: ledger aggregation, headline and yearly metrics
//! - `snapshot`: latest band reading and cross-differential ranking

pub mod engine;
pub mod params;
pub mod performance;
pub mod rolling_stats;
pub mod snapshot;

pub use engine::{BacktestEngine, BacktestRun, Bar, BarSignal, SignalMachine};
pub use params::{BacktestConfig, Capabilities, ConfigError, RollingWindow, TRADING_DAYS_BY_MONTHS};
pub use performance::{
    ledger_most_recent_first, ledger_rows, summarize, summarize_by_year, trailing_window,
    LedgerRow, PerformanceSummary, YearlyPerformance,
};
pub use rolling_stats::{compute_bands, rolling_bands, Band, BandedPoint, RollingBands, SkewBias};
pub use snapshot::{latest_reading, rank_by_deviation, LatestReading};
