//! Series Builder Integration Tests
//!
//! Builds differentials from an in-memory source and checks:
//! 1. Contract windows and stitching of overlapping roots
//! 2. Normalization continuity across roots
//! 3. Skipped roots on missing or failing sheets
//! 4. Sheet caching across builds
//! 5. Bounded, completion-order independent fetching
//! 6. The full pipeline from source to report

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use approx::assert_relative_eq;
use chrono::{Datelike, NaiveDate};

use spread_reversion::application::{run_diff, BuilderConfig, LegCache, SeriesBuilder};
use spread_reversion::domain::{ContractCode, DiffSpec, PriceSeries, PriceTrack};
use spread_reversion::ports::{InMemorySource, OutrightQuote, PriceSource, SourceError};
use spread_reversion::strategy::{BacktestConfig, RollingWindow};

// ============================================================================
// Test Fixtures
// ============================================================================

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Weekdays from 2024-08-01 through 2025-04-30
fn calendar() -> Vec<NaiveDate> {
    date(2024, 8, 1)
        .iter_days()
        .take_while(|d| *d <= date(2025, 4, 30))
        .filter(|d| d.weekday().number_from_monday() <= 5)
        .collect()
}

/// A flat sheet: every calendar date quoted at `price`
fn flat_sheet(contract: &str, price: f64) -> Vec<OutrightQuote> {
    calendar()
        .into_iter()
        .map(|d| OutrightQuote::new(d, contract, price))
        .collect()
}

/// Brent outrights for the Mar25 root (80 - 79 = 1) and the Jun25 root
/// (75 - 73 = 2)
fn brent_source() -> InMemorySource {
    InMemorySource::new()
        .with_calendar(calendar())
        .with_quotes("Brt", "Mar", flat_sheet("Mar25", 80.0))
        .with_quotes("Brt", "Apr", flat_sheet("Apr25", 79.0))
        .with_quotes("Brt", "Jun", flat_sheet("Jun25", 75.0))
        .with_quotes("Brt", "Jul", flat_sheet("Jul25", 73.0))
}

fn brent_spec() -> DiffSpec {
    DiffSpec::new("Brt M1/M2", "Brt", "Brt", (1, 2)).unwrap()
}

fn roots(codes: &[&str]) -> Vec<ContractCode> {
    codes.iter().map(|c| c.parse().unwrap()).collect()
}

/// Six months of history per root so Mar25 and Jun25 overlap
fn builder(source: InMemorySource, codes: &[&str]) -> SeriesBuilder<InMemorySource> {
    let config = BuilderConfig::new(roots(codes))
        .with_lookback_months(6)
        .with_max_concurrent_fetches(2);
    SeriesBuilder::new(Arc::new(source), config)
}

fn point_on(series: &PriceSeries, day: NaiveDate) -> &spread_reversion::domain::PricePoint {
    series
        .points()
        .iter()
        .find(|p| p.date == day)
        .unwrap()
}

// ============================================================================
// Stitching and Normalization
// ============================================================================

#[tokio::test]
async fn test_windows_span_both_roots() {
    let series = builder(brent_source(), &["Mar25", "Jun25"])
        .build(&brent_spec())
        .await
        .unwrap();

    // Mar25: Sep 2 2024 stepped back two days; Jun25: Mar 31 2025 stepped back one
    assert_eq!(series.points()[0].date, date(2024, 8, 29));
    assert_eq!(series.latest_date(), Some(date(2025, 3, 28)));
}

#[tokio::test]
async fn test_overlap_splits_entry_and_exit_sides() {
    let series = builder(brent_source(), &["Mar25", "Jun25"])
        .build(&brent_spec())
        .await
        .unwrap();

    // before the overlap only Mar25 trades
    let early = point_on(&series, date(2024, 10, 1));
    assert_relative_eq!(early.entry_price, 1.0);
    assert_relative_eq!(early.exit_price, 1.0);
    assert_eq!(early.entry_contract, "Mar25-Apr25");
    assert_eq!(early.exit_contract_month, "Mar-Apr");

    // overlap: the newer root enters, the older root exits
    let overlap = point_on(&series, date(2024, 12, 2));
    assert_relative_eq!(overlap.entry_price, 2.0);
    assert_relative_eq!(overlap.exit_price, 1.0);
    assert_eq!(overlap.entry_contract, "Jun25-Jul25");
    assert_eq!(overlap.exit_contract, "Mar25-Apr25");
    assert_eq!(overlap.entry_contract_month, "Jun-Jul");
    assert_eq!(overlap.exit_contract_month, "Mar-Apr");

    // after Mar25's window closes only Jun25 remains
    let late = point_on(&series, date(2025, 1, 6));
    assert_relative_eq!(late.entry_price, 2.0);
    assert_relative_eq!(late.exit_price, 2.0);
    assert_eq!(late.exit_contract, "Jun25-Jul25");

    let boundary = series
        .points()
        .iter()
        .position(|p| p.date == date(2024, 12, 30))
        .unwrap();
    assert!(series.is_last_bar_of_contract(boundary));
    assert!(!series.is_last_bar_of_contract(boundary - 1));
}

#[tokio::test]
async fn test_normalized_track_is_continuous() {
    let series = builder(brent_source(), &["Mar25", "Jun25"])
        .build(&brent_spec())
        .await
        .unwrap();

    // the newest root is the anchor; Mar25 is shifted up by 1 to meet it
    for point in series.points() {
        assert_relative_eq!(point.entry_norm_price, 2.0);
        assert_relative_eq!(point.exit_norm_price, 2.0);
    }
    let raw = series.exit_values(PriceTrack::Raw);
    assert!(raw.contains(&1.0) && raw.contains(&2.0));
}

#[tokio::test]
async fn test_multi_leg_expressions_combine() {
    let source = brent_source()
        .with_quotes("Gas", "Mar", flat_sheet("Mar25", 700.0))
        .with_quotes("Gas", "Apr", flat_sheet("Apr25", 690.0));
    let spec = DiffSpec::new("Gas-Brt M1/M2", "Gas-Brt", "Gas-Brt", (1, 2)).unwrap();

    let series = builder(source, &["Mar25"]).build(&spec).await.unwrap();

    // (700 - 80) - (690 - 79)
    let first = &series.points()[0];
    assert_relative_eq!(first.exit_price, 9.0);
    assert_eq!(first.exit_contract, "Mar25-Apr25");
}

// ============================================================================
// Missing Data
// ============================================================================

#[tokio::test]
async fn test_root_without_sheets_is_skipped() {
    let with_missing = builder(brent_source(), &["Mar25", "Jun25", "Sep25"])
        .build(&brent_spec())
        .await
        .unwrap();
    let without = builder(brent_source(), &["Mar25", "Jun25"])
        .build(&brent_spec())
        .await
        .unwrap();

    assert_eq!(with_missing, without);
}

#[tokio::test]
async fn test_failing_sheet_drops_its_root() {
    let source = brent_source().with_failure("Brt", "Jun");
    let series = builder(source, &["Mar25", "Jun25"])
        .build(&brent_spec())
        .await
        .unwrap();

    assert_eq!(series.latest_date(), Some(date(2024, 12, 30)));
    for point in series.points() {
        assert_eq!(point.exit_contract, "Mar25-Apr25");
        assert_relative_eq!(point.entry_price, point.exit_price);
        // sole remaining root anchors the normalization
        assert_relative_eq!(point.exit_norm_price, 1.0);
    }
}

#[tokio::test]
async fn test_empty_calendar_yields_empty_series() {
    let source = InMemorySource::new().with_quotes("Brt", "Mar", flat_sheet("Mar25", 80.0));
    let series = builder(source, &["Mar25"])
        .build(&brent_spec())
        .await
        .unwrap();
    assert!(series.is_empty());
}

// ============================================================================
// Caching
// ============================================================================

#[tokio::test]
async fn test_each_sheet_fetched_once() {
    let source = Arc::new(brent_source());
    let config = BuilderConfig::new(roots(&["Mar25", "Jun25"])).with_lookback_months(6);
    let cache = LegCache::new();

    let first = SeriesBuilder::new(Arc::clone(&source), config.clone()).with_cache(cache.clone());
    first.build(&brent_spec()).await.unwrap();
    assert_eq!(source.calls().len(), 4);
    assert_eq!(cache.len().await, 4);

    // a second builder sharing the cache fetches nothing new
    let second = SeriesBuilder::new(Arc::clone(&source), config).with_cache(cache);
    second.build(&brent_spec()).await.unwrap();
    assert_eq!(source.calls().len(), 4);
}

// ============================================================================
// Concurrency
// ============================================================================

/// Wraps a source with per-sheet latency and tracks fetches in flight
struct SlowSource {
    inner: InMemorySource,
    delays: HashMap<String, Duration>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl SlowSource {
    fn new(inner: InMemorySource, delays: &[(&str, u64)]) -> Self {
        Self {
            inner,
            delays: delays
                .iter()
                .map(|(month, ms)| (month.to_string(), Duration::from_millis(*ms)))
                .collect(),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for SlowSource {
    async fn outright_quotes(
        &self,
        symbol: &str,
        month: &str,
    ) -> Result<Vec<OutrightQuote>, SourceError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(month) {
            tokio::time::sleep(*delay).await;
        }
        let result = self.inner.outright_quotes(symbol, month).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn trading_calendar(&self) -> Result<Vec<NaiveDate>, SourceError> {
        self.inner.trading_calendar().await
    }
}

fn slow_builder(source: Arc<SlowSource>, max_concurrent: usize) -> SeriesBuilder<SlowSource> {
    let config = BuilderConfig::new(roots(&["Mar25", "Jun25"]))
        .with_lookback_months(6)
        .with_max_concurrent_fetches(max_concurrent);
    SeriesBuilder::new(source, config)
}

#[tokio::test]
async fn test_result_independent_of_completion_order() {
    let expected = builder(brent_source(), &["Mar25", "Jun25"])
        .build(&brent_spec())
        .await
        .unwrap();

    // older root last, then newer root last
    for delays in [[("Mar", 60), ("Apr", 40)], [("Jun", 60), ("Jul", 40)]] {
        let source = Arc::new(SlowSource::new(brent_source(), &delays));
        let series = slow_builder(Arc::clone(&source), 4)
            .build(&brent_spec())
            .await
            .unwrap();

        assert!(source.peak() <= 4);
        assert_eq!(series, expected);
        for (slow, fast) in series.points().iter().zip(expected.points()) {
            assert_eq!(slow.exit_norm_price.to_bits(), fast.exit_norm_price.to_bits());
            assert_eq!(slow.entry_norm_price.to_bits(), fast.entry_norm_price.to_bits());
        }
    }
}

#[tokio::test]
async fn test_fetches_bounded_by_pool_size() {
    let delays = [("Mar", 20), ("Apr", 20), ("Jun", 20), ("Jul", 20)];

    let source = Arc::new(SlowSource::new(brent_source(), &delays));
    slow_builder(Arc::clone(&source), 2)
        .build(&brent_spec())
        .await
        .unwrap();
    assert_eq!(source.peak(), 2);
    assert_eq!(source.inner.calls().len(), 4);

    let source = Arc::new(SlowSource::new(brent_source(), &delays));
    slow_builder(Arc::clone(&source), 1)
        .build(&brent_spec())
        .await
        .unwrap();
    assert_eq!(source.peak(), 1);
}

// ============================================================================
// Full Pipeline
// ============================================================================

#[tokio::test]
async fn test_run_diff_produces_report() {
    // a slow oscillation on the front contract so bands are non-degenerate
    let source = InMemorySource::new()
        .with_calendar(calendar())
        .with_quotes("Brt", "Mar", wavy_sheet())
        .with_quotes("Brt", "Apr", flat_sheet("Apr25", 79.0));

    let builder = builder(source, &["Mar25"]);
    let config = BacktestConfig::default()
        .with_window(RollingWindow::trading_days(10).unwrap())
        .with_price_track(PriceTrack::Raw);

    let report = run_diff(&builder, &brent_spec(), &config, 12).await.unwrap();

    assert!(!report.is_empty());
    assert_eq!(report.latest_date, Some(date(2024, 12, 30)));
    assert!(!report.run.trades.is_empty());
    assert_eq!(report.headline.num_trades, report.recent_trades.len());
    for trade in &report.run.trades {
        assert!(trade.exit_date > trade.entry_date);
        assert_eq!(trade.contracts_traversed(), vec!["Mar25-Apr25"]);
    }
    assert!(report.latest_reading().is_some());
}

fn wavy_sheet() -> Vec<OutrightQuote> {
    calendar()
        .into_iter()
        .enumerate()
        .map(|(i, d)| OutrightQuote::new(d, "Mar25", 80.0 + ((i as f64) / 5.0).sin() * 3.0))
        .collect()
}
