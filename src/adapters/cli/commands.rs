//! CLI Command Handlers
//!
//! Implementation of all CLI commands for spread-reversion.

use anyhow::{ensure, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::adapters::file_source::JsonFileSource;
use crate::application::{run_diff, DiffReport, LegCache, SeriesBuilder};
use crate::config::{load_config, Config};
use crate::strategy::{
    rank_by_deviation, BacktestConfig, BandedPoint, LatestReading, LedgerRow, PerformanceSummary,
    RollingWindow, YearlyPerformance,
};

/// spread-reversion - Rolling band research on commodity futures differentials
#[derive(Parser, Debug)]
#[command(
    name = "spread-reversion",
    version = env!("CARGO_PKG_VERSION"),
    about = "Rolling band mean reversion research for futures differentials",
    long_about = "Builds roll-stitched differential series from outright settlements, \
                  computes rolling median/std bands and backtests entry at the band \
                  with exit at the median."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Backtest the configured differential
    Backtest(BacktestCmd),

    /// Print the band-augmented series tail
    Bands(BandsCmd),

    /// Rank several differentials by distance from their median
    Scan(ScanCmd),
}

impl Command {
    /// Config files named by the command, in order
    pub fn config_paths(&self) -> Vec<&Path> {
        match self {
            Command::Backtest(cmd) => vec![cmd.config.as_path()],
            Command::Bands(cmd) => vec![cmd.config.as_path()],
            Command::Scan(cmd) => cmd.configs.iter().map(PathBuf::as_path).collect(),
        }
    }
}

/// Run a backtest
#[derive(Parser, Debug)]
pub struct BacktestCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/spread.toml")]
    pub config: PathBuf,

    /// Override the rolling window (e.g. 6m)
    #[arg(long, value_name = "UNIT")]
    pub window: Option<String>,

    /// Override the band width in standard deviations
    #[arg(long, value_name = "K")]
    pub sd: Option<u32>,

    /// Export results to JSON
    #[arg(long, value_name = "FILE")]
    pub export_json: Option<PathBuf>,
}

/// Print bands
#[derive(Parser, Debug)]
pub struct BandsCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/spread.toml")]
    pub config: PathBuf,

    /// Number of most recent rows to print
    #[arg(long, value_name = "ROWS", default_value = "20")]
    pub tail: usize,
}

/// Scan differentials
#[derive(Parser, Debug)]
pub struct ScanCmd {
    /// Configuration files, one per differential
    #[arg(short, long = "config", value_name = "FILE", num_args = 1.., required = true)]
    pub configs: Vec<PathBuf>,
}

/// Execute the CLI command
pub async fn execute(app: CliApp) -> Result<()> {
    let configured_level = app
        .command
        .config_paths()
        .first()
        .and_then(|path| load_config(path).ok())
        .map(|config| config.logging.level);
    init_logging(app.verbose, app.debug, configured_level.as_deref())?;

    match app.command {
        Command::Backtest(cmd) => backtest_command(cmd).await,
        Command::Bands(cmd) => bands_command(cmd).await,
        Command::Scan(cmd) => scan_command(cmd).await,
    }
}

/// Initialize logging system
fn init_logging(verbose: bool, debug: bool, configured: Option<&str>) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        configured.unwrap_or("warn")
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {}", e))?;

    Ok(())
}

fn load(path: &Path) -> Result<Config> {
    load_config(path).with_context(|| format!("loading config {}", path.display()))
}

async fn build_report(
    config: &Config,
    backtest: &BacktestConfig,
    cache: &LegCache,
) -> Result<DiffReport> {
    let dir = config.data.resolved_dir();
    tracing::info!("Data directory: {}", dir.display());

    let source = Arc::new(JsonFileSource::new(dir));
    let builder =
        SeriesBuilder::new(source, config.builder_config()?).with_cache(cache.clone());
    let spec = config.diff_spec()?;
    let report = run_diff(&builder, &spec, backtest, config.backtest.ledger_lookback_months).await?;
    Ok(report)
}

/// Handle backtest command
async fn backtest_command(cmd: BacktestCmd) -> Result<()> {
    let config = load(&cmd.config)?;
    let mut backtest = BacktestConfig::try_from(&config)?;

    if let Some(ref unit) = cmd.window {
        let window: RollingWindow = unit.parse()?;
        backtest = backtest.with_window(window);
    }
    if let Some(sd) = cmd.sd {
        ensure!(sd >= 1, "--sd must be at least 1");
        backtest = backtest.with_sd_multiplier(f64::from(sd));
    }

    tracing::info!(
        "Backtesting {} with {} window, {}sd",
        config.diff.name,
        backtest.window,
        backtest.sd_multiplier
    );
    let report = build_report(&config, &backtest, &LegCache::new()).await?;

    if report.is_empty() {
        println!("No data for {}", report.name);
        return Ok(());
    }

    println!(
        "{}",
        format_summary(&report.name, report.ledger_lookback_months, &report.headline)
    );
    println!("{}", format_ledger(&report.ledger_rows()));
    println!(
        "{}",
        format_yearly(
            &report.yearly,
            report.config.window.label(),
            report.config.sd_multiplier,
            &report.name
        )
    );

    if let Some(ref path) = cmd.export_json {
        export_json(&report, path)?;
        println!("Exported results to {}", path.display());
    }

    Ok(())
}

/// Handle bands command
async fn bands_command(cmd: BandsCmd) -> Result<()> {
    let config = load(&cmd.config)?;
    let backtest = BacktestConfig::try_from(&config)?;
    let report = build_report(&config, &backtest, &LegCache::new()).await?;

    if report.is_empty() {
        println!("No data for {}", report.name);
        return Ok(());
    }

    println!("{}", format_bands(&report.run.bands, cmd.tail));
    Ok(())
}

/// Handle scan command
async fn scan_command(cmd: ScanCmd) -> Result<()> {
    let readings = scan_readings(&cmd.configs, &LegCache::new()).await?;

    if readings.is_empty() {
        println!("No data");
        return Ok(());
    }
    println!("{}", format_scan(&rank_by_deviation(readings)));
    Ok(())
}

/// Latest reading per config; sheets already in `cache` are not fetched again
async fn scan_readings(paths: &[PathBuf], cache: &LegCache) -> Result<Vec<LatestReading>> {
    let mut readings = Vec::with_capacity(paths.len());

    for path in paths {
        let config = load(path)?;
        let backtest = BacktestConfig::try_from(&config)?;
        let report = build_report(&config, &backtest, cache).await?;
        match report.latest_reading() {
            Some(reading) => readings.push(reading),
            None => tracing::warn!("No band reading for {}", report.name),
        }
    }

    tracing::info!("Scanned {} configs, {} sheets cached", paths.len(), cache.len().await);
    Ok(readings)
}

/// JSON export layout
#[derive(Debug, Serialize)]
struct ExportedReport<'a> {
    name: &'a str,
    latest_date: Option<NaiveDate>,
    ledger_lookback_months: u32,
    headline: &'a PerformanceSummary,
    ledger: Vec<LedgerRow>,
    yearly: &'a [YearlyPerformance],
}

fn export_json(report: &DiffReport, path: &Path) -> Result<()> {
    let exported = ExportedReport {
        name: &report.name,
        latest_date: report.latest_date,
        ledger_lookback_months: report.ledger_lookback_months,
        headline: &report.headline,
        ledger: report.ledger_rows(),
        yearly: &report.yearly,
    };
    let json = serde_json::to_string_pretty(&exported)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn format_summary(name: &str, lookback_months: u32, summary: &PerformanceSummary) -> String {
    let mut out = String::new();
    out.push_str("┌─────────────────────────────────────────────┐\n");
    out.push_str(&format!("│  {:<43}│\n", format!("{} - last {} months", name, lookback_months)));
    out.push_str("├─────────────────────────────────────────────┤\n");
    out.push_str(&format!("│  Returns:     {:>29.2} │\n", round2(summary.cumulative_return)));
    out.push_str(&format!("│  Ratio:       {:>29.2} │\n", round2(summary.ratio)));
    out.push_str(&format!("│  No. Trades:  {:>29} │\n", summary.num_trades));
    out.push_str(&format!("│  Win Rate:    {:>28.1}% │\n", summary.win_rate));
    out.push_str("└─────────────────────────────────────────────┘");
    out
}

fn format_ledger(rows: &[LedgerRow]) -> String {
    if rows.is_empty() {
        return "No trades in window".to_string();
    }

    let mut out = format!(
        "{:>3}  {:<10}  {:<10}  {:>4}  {:<5}  {:>9}  {:>9}  {}\n",
        "#", "Entry", "Exit", "Days", "Side", "Return", "Max Loss", "Contracts"
    );
    for (i, row) in rows.iter().enumerate() {
        out.push_str(&format!(
            "{:>3}  {:<10}  {:<10}  {:>4}  {:<5}  {:>9.2}  {:>9.2}  {}\n",
            i + 1,
            row.entry_date,
            row.exit_date,
            row.holding_period,
            row.direction,
            round2(row.total_return),
            round2(row.max_loss),
            row.contracts.join(", ")
        ));
    }
    out.trim_end().to_string()
}

fn format_yearly(yearly: &[YearlyPerformance], window: &str, sd: f64, name: &str) -> String {
    if yearly.is_empty() {
        return "No yearly performance".to_string();
    }

    let mut out = format!("Yearly Performance ({}, {} {}sd)\n", name, window, sd);
    out.push_str(&format!(
        "{:>4}  {:>9}  {:>7}  {:>9}  {:>6}  {:>8}\n",
        "Year", "Returns", "Ratio", "Max Loss", "Trades", "Avg Hold"
    ));
    for row in yearly {
        out.push_str(&format!(
            "{:>4}  {:>9.2}  {:>7.2}  {:>9.2}  {:>6}  {:>8}\n",
            row.year,
            round2(row.cumulative_return),
            round2(row.ratio),
            round2(row.cumulative_max_loss),
            row.num_trades,
            row.avg_holding_period
        ));
    }
    out.trim_end().to_string()
}

fn format_bands(bands: &[BandedPoint], tail: usize) -> String {
    let mut out = format!(
        "{:<10}  {:<15}  {:>9}  {:>9}  {:>9}  {:>9}  {:>9}\n",
        "Date", "Contract", "Price", "Median", "Std", "Lower", "Upper"
    );
    let start = bands.len().saturating_sub(tail);
    for row in &bands[start..] {
        match row.band {
            Some(band) => out.push_str(&format!(
                "{:<10}  {:<15}  {:>9.2}  {:>9.2}  {:>9.2}  {:>9.2}  {:>9.2}\n",
                row.point.date,
                row.point.exit_contract,
                row.price,
                band.rolling_median,
                band.rolling_std,
                band.lower_bound,
                band.upper_bound
            )),
            None => out.push_str(&format!(
                "{:<10}  {:<15}  {:>9.2}  {:>9}  {:>9}  {:>9}  {:>9}\n",
                row.point.date, row.point.exit_contract, row.price, "-", "-", "-", "-"
            )),
        }
    }
    out.trim_end().to_string()
}

fn format_scan(readings: &[LatestReading]) -> String {
    let mut out = format!(
        "{:<24}  {:<10}  {:<15}  {:>9}  {:>9}  {:>9}  {:>7}\n",
        "Differential", "Date", "Contract", "Price", "Median", "Std", "No. SD"
    );
    for r in readings {
        out.push_str(&format!(
            "{:<24}  {:<10}  {:<15}  {:>9.2}  {:>9.2}  {:>9.2}  {:>7.2}\n",
            r.name, r.date, r.contract, r.price, r.median, r.std_dev, r.num_sd
        ));
    }
    out.trim_end().to_string()
}
