//! Differential Runner
//!
//! Wires one configured differential through the whole pipeline:
//! series builder, rolling bands, signal engine and aggregation.

use chrono::NaiveDate;
use serde::Serialize;

use crate::application::series_builder::{BuildError, SeriesBuilder};
use crate::domain::{DiffSpec, PriceSeries, Trade};
use crate::ports::PriceSource;
use crate::strategy::{
    ledger_most_recent_first, ledger_rows, snapshot, summarize, summarize_by_year,
    trailing_window, BacktestConfig, BacktestEngine, BacktestRun, LatestReading, LedgerRow,
    PerformanceSummary, YearlyPerformance,
};

/// Everything the presentation layer renders for one differential
#[derive(Debug, Clone, Serialize)]
pub struct DiffReport {
    pub name: String,
    pub config: BacktestConfig,
    pub latest_date: Option<NaiveDate>,
    pub ledger_lookback_months: u32,
    /// Metrics over `recent_trades`
    pub headline: PerformanceSummary,
    /// Trades entered in the trailing window, most recent first
    pub recent_trades: Vec<Trade>,
    /// Full-history breakdown, most recent year first
    pub yearly: Vec<YearlyPerformance>,
    #[serde(skip)]
    pub run: BacktestRun,
}

impl DiffReport {
    pub fn is_empty(&self) -> bool {
        self.run.is_empty()
    }

    /// Presentation rows of the trailing-window ledger
    pub fn ledger_rows(&self) -> Vec<LedgerRow> {
        ledger_rows(
            &self.recent_trades,
            self.config.window.label(),
            self.config.sd_multiplier,
            &self.name,
        )
    }

    /// Full ledger, most recent first
    pub fn all_trades(&self) -> Vec<Trade> {
        ledger_most_recent_first(&self.run.trades)
    }

    pub fn latest_reading(&self) -> Option<LatestReading> {
        snapshot::latest_reading(&self.name, &self.run.bands)
    }
}

/// Backtest an already-built series
pub fn analyze(
    name: &str,
    series: &PriceSeries,
    config: &BacktestConfig,
    ledger_lookback_months: u32,
) -> DiffReport {
    let engine = BacktestEngine::new(config.clone());
    let run = engine.run(series);

    let latest_date = series.latest_date();
    let recent = match latest_date {
        Some(latest) => trailing_window(&run.trades, latest, ledger_lookback_months),
        None => Vec::new(),
    };
    let recent_trades = ledger_most_recent_first(&recent);

    DiffReport {
        name: name.to_string(),
        config: engine.config().clone(),
        latest_date,
        ledger_lookback_months,
        headline: summarize(&recent_trades),
        yearly: summarize_by_year(&run.trades),
        recent_trades,
        run,
    }
}

/// Build the series for `spec` and backtest it
pub async fn run_diff<S>(
    builder: &SeriesBuilder<S>,
    spec: &DiffSpec,
    config: &BacktestConfig,
    ledger_lookback_months: u32,
) -> Result<DiffReport, BuildError>
where
    S: PriceSource + ?Sized + 'static,
{
    let series = builder.build(spec).await?;
    if series.is_empty() {
        tracing::warn!("No data for {}", spec.name);
    }
    Ok(analyze(&spec.name, &series, config, ledger_lookback_months))
}
