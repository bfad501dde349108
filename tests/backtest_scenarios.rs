//! Backtest Engine Integration Tests
//!
//! End-to-end runs of the band engine over hand-built series:
//! 1. Boundary scenarios (flat series, one-way drift, single roll, double roll)
//! 2. Single-contract capabilities (no carry, final-month entry block)
//! 3. Ledger invariants over seeded random walks
//!
//! All tests are deterministic.

use approx::assert_relative_eq;
use chrono::{Datelike, Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use spread_reversion::domain::{ExitReason, PricePoint, PriceSeries, PriceTrack, Side};
use spread_reversion::strategy::{
    compute_bands, summarize, BacktestConfig, BacktestEngine, RollingWindow,
};

// ============================================================================
// Test Fixtures
// ============================================================================

/// Mondays two weeks apart, so consecutive bars can fall in different months
fn fortnight(i: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(14 * i as i64)
}

/// Consecutive weekdays from 2020-01-06
fn weekdays(n: usize) -> Vec<NaiveDate> {
    NaiveDate::from_ymd_opt(2020, 1, 6)
        .unwrap()
        .iter_days()
        .filter(|d| d.weekday().number_from_monday() <= 5)
        .take(n)
        .collect()
}

fn point(date: NaiveDate, entry: f64, exit: f64, month: &str) -> PricePoint {
    let contract = format!("{}24", month);
    PricePoint {
        date,
        entry_price: entry,
        exit_price: exit,
        entry_norm_price: entry,
        exit_norm_price: exit,
        entry_contract: contract.clone(),
        exit_contract: contract,
        entry_contract_month: month.to_string(),
        exit_contract_month: month.to_string(),
    }
}

/// One bar per entry of `bars`: (entry price, exit price, contract month)
fn series(bars: &[(f64, f64, &str)]) -> PriceSeries {
    let points = bars
        .iter()
        .enumerate()
        .map(|(i, (entry, exit, month))| point(fortnight(i), *entry, *exit, month))
        .collect();
    PriceSeries::new(points).unwrap()
}

fn engine(window: usize, k: f64) -> BacktestEngine {
    BacktestEngine::new(
        BacktestConfig::default()
            .with_window(RollingWindow::trading_days(window).unwrap())
            .with_sd_multiplier(k)
            .with_price_track(PriceTrack::Raw),
    )
}

/// Falls through a band, rolls Mar -> Apr, rolls again Apr -> May, then
/// trades once more in May
fn double_roll_bars() -> Vec<(f64, f64, &'static str)> {
    vec![
        (12.0, 12.0, "Mar"),
        (11.0, 11.0, "Mar"),
        (10.0, 10.0, "Mar"),
        (9.0, 9.0, "Mar"),
        (8.0, 8.0, "Mar"),
        (7.0, 7.0, "Apr"),
        (6.0, 6.0, "Apr"),
        (5.0, 5.0, "May"),
        (6.0, 6.0, "May"),
        (6.0, 6.0, "May"),
    ]
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_constant_series_alternates_entry_and_exit() {
    let bars: Vec<_> = (0..10).map(|_| (5.0, 5.0, "Mar")).collect();
    let run = engine(3, 1.0).run(&series(&bars));

    // std is 0, so both bounds sit on the median and every flat bar enters
    let entries: Vec<usize> = run
        .signals
        .iter()
        .enumerate()
        .filter_map(|(i, s)| s.entry.map(|_| i))
        .collect();
    let exits: Vec<usize> = run
        .signals
        .iter()
        .enumerate()
        .filter_map(|(i, s)| s.exit.map(|_| i))
        .collect();

    assert_eq!(entries, vec![2, 4, 6, 8]);
    assert_eq!(exits, vec![3, 5, 7, 9]);
    assert_eq!(run.trades.len(), 4);
    for trade in &run.trades {
        assert_eq!(trade.side, Side::Long);
        assert_eq!(trade.total_return, 0.0);
        assert_eq!(trade.max_loss, 0.0);
        assert_eq!(trade.exit_reason, ExitReason::MedianReversion);
    }
}

#[test]
fn test_one_way_drift_exits_at_end_of_data() {
    let bars: Vec<_> = [12.0, 11.0, 10.0, 9.0, 8.0, 7.0, 6.0]
        .iter()
        .map(|p| (*p, *p, "Mar"))
        .collect();
    let run = engine(3, 1.0).run(&series(&bars));

    assert_eq!(run.trades.len(), 1);
    let trade = &run.trades[0];
    assert_eq!(trade.side, Side::Long);
    // lower band of [12, 11, 10] is exactly 10
    assert_eq!(trade.entry_date, fortnight(2));
    assert_eq!(trade.exit_date, fortnight(6));
    assert_eq!(trade.exit_reason, ExitReason::EndOfData);
    assert_relative_eq!(trade.total_return, 6.0 - 10.0);
    assert_relative_eq!(trade.max_loss, 6.0 - 10.0);
}

#[test]
fn test_single_roll_splices_into_one_trade() {
    let bars = vec![
        (12.0, 12.0, "Mar"),
        (11.0, 11.0, "Mar"),
        (10.0, 10.0, "Mar"),
        (9.0, 9.0, "Mar"),
        // last Mar bar: exit side still Mar, entry side already Apr
        (7.5, 8.0, "Mar"),
        (7.0, 7.0, "Apr"),
        (6.5, 6.5, "Apr"),
        (8.0, 8.0, "Apr"),
        (8.0, 8.0, "Apr"),
    ];
    let run = engine(3, 1.0).run(&series(&bars));

    assert!(run.signals[4].rolled);
    assert_eq!(run.trades.len(), 1);
    let trade = &run.trades[0];
    assert_eq!(trade.exit_reason, ExitReason::MedianReversion);
    assert_eq!(trade.exit_date, fortnight(7));
    assert_eq!(trade.contracts_traversed(), vec!["Mar24", "Apr24"]);
    assert_eq!(trade.entry_exit_price_pairs(), vec![(10.0, 8.0), (7.5, 8.0)]);
    // (8 - 10) + (8 - 7.5)
    assert_relative_eq!(trade.total_return, -1.5);
    // (8 - 10) + (6.5 - 7.5)
    assert_relative_eq!(trade.max_loss, -3.0);
}

#[test]
fn test_second_boundary_force_closes() {
    let run = engine(3, 1.0).run(&series(&double_roll_bars()));

    assert_eq!(run.trades.len(), 2);

    let forced = &run.trades[0];
    assert_eq!(forced.exit_reason, ExitReason::RollLimit);
    assert_eq!(forced.exit_date, fortnight(6));
    assert_eq!(forced.contracts_traversed(), vec!["Mar24", "Apr24"]);
    assert_relative_eq!(forced.total_return, -4.0);
    assert_relative_eq!(forced.max_loss, -4.0);

    let next = &run.trades[1];
    assert_eq!(next.entry_date, fortnight(7));
    assert_eq!(next.exit_date, fortnight(8));
    assert_relative_eq!(next.total_return, 1.0);
}

#[test]
fn test_single_contract_variant() {
    let config = BacktestConfig::default()
        .with_window(RollingWindow::trading_days(3).unwrap())
        .with_sd_multiplier(1.0)
        .with_price_track(PriceTrack::Raw)
        .with_roll_aware(false);
    let run = BacktestEngine::new(config).run(&series(&double_roll_bars()));

    assert_eq!(run.trades.len(), 2);

    // closed at the first boundary instead of rolling
    let first = &run.trades[0];
    assert_eq!(first.exit_reason, ExitReason::RollLimit);
    assert_eq!(first.exit_date, fortnight(4));
    assert_eq!(first.contracts_traversed(), vec!["Mar24"]);
    assert_relative_eq!(first.total_return, -2.0);

    // bars 5 and 6 fall in the Apr contract's final month and may not enter
    assert!(run.signals[5].entry.is_none());
    assert!(run.signals[6].entry.is_none());
    assert_eq!(run.trades[1].entry_date, fortnight(7));
}

#[test]
fn test_skew_gated_run_only_takes_permitted_side() {
    // one large up-spike dominates the window, so skew is well above 1
    let mut bars: Vec<(f64, f64, &str)> = vec![(0.0, 0.0, "Mar"); 18];
    bars.push((100.0, 100.0, "Mar"));
    bars.push((-25.0, -25.0, "Mar"));
    bars.push((0.0, 0.0, "Mar"));

    let ungated = engine(20, 1.0).run(&series(&bars));
    let gated = BacktestEngine::new(
        BacktestConfig::default()
            .with_window(RollingWindow::trading_days(20).unwrap())
            .with_price_track(PriceTrack::Raw)
            .with_skew_gate(true),
    )
    .run(&series(&bars));

    let band = gated.bands[19].band.unwrap();
    assert!(band.rolling_skew.unwrap() > 1.0);
    assert!(-25.0 <= band.lower_bound);

    // the first full window breaches the lower band; only shorts are permitted
    assert_eq!(ungated.signals[19].entry, Some(Side::Long));
    assert_eq!(gated.signals[19].entry, None);
    assert!(gated.trades.is_empty());
}

// ============================================================================
// Invariants
// ============================================================================

#[test]
fn test_series_shorter_than_window_has_no_trades() {
    let bars: Vec<_> = [3.0, 1.0, 4.0, 1.0, 5.0].iter().map(|p| (*p, *p, "Mar")).collect();
    let run = engine(10, 1.0).run(&series(&bars));

    assert!(run.bands.iter().all(|b| b.band.is_none()));
    assert!(run.trades.is_empty());
    assert_eq!(summarize(&run.trades).num_trades, 0);
}

/// Random walk with a contract roll every 20 bars; roll bars carry a
/// different entry-side price
fn random_walk(seed: u64, n: usize) -> PriceSeries {
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    let mut rng = StdRng::seed_from_u64(seed);
    let mut price = 0.0;

    let points = weekdays(n)
        .into_iter()
        .enumerate()
        .map(|(i, date)| {
            price += rng.gen_range(-1.0..1.0);
            let month = MONTHS[(i / 20) % 12];
            let entry = if i % 20 == 19 {
                price + rng.gen_range(-2.0..2.0)
            } else {
                price
            };
            point(date, entry, price, month)
        })
        .collect();
    PriceSeries::new(points).unwrap()
}

#[test]
fn test_trade_invariants_on_random_walks() {
    for seed in 0..20 {
        let series = random_walk(seed, 400);
        for roll_aware in [true, false] {
            let config = BacktestConfig::default()
                .with_window(RollingWindow::trading_days(15).unwrap())
                .with_sd_multiplier(1.0)
                .with_price_track(PriceTrack::Raw)
                .with_roll_aware(roll_aware);
            let run = BacktestEngine::new(config).run(&series);

            assert_eq!(run.signals.len(), series.len());
            let exits = run.signals.iter().filter(|s| s.exit.is_some()).count();
            assert_eq!(exits, run.trades.len());

            let max_legs = if roll_aware { 2 } else { 1 };
            for trade in &run.trades {
                assert!(trade.exit_date > trade.entry_date);
                assert!(trade.holding_period >= 0);
                assert!(trade.legs.len() <= max_legs);
                assert!(trade.max_loss <= 0.0);
                assert!(trade.total_return >= trade.max_loss - 1e-9);

                let leg_return: f64 = trade.legs.iter().map(|l| l.pnl(trade.side)).sum();
                let leg_loss: f64 = trade.legs.iter().map(|l| l.max_loss(trade.side)).sum();
                assert_relative_eq!(leg_return, trade.total_return, epsilon = 1e-9);
                assert_relative_eq!(leg_loss, trade.max_loss, epsilon = 1e-9);
            }

            // trades never overlap
            for pair in run.trades.windows(2) {
                assert!(pair[1].entry_date > pair[0].exit_date);
            }
        }
    }
}

#[test]
fn test_runs_are_repeatable() {
    let series = random_walk(42, 300);
    let bands_a = compute_bands(&series, PriceTrack::Raw, 22, 2.0);
    let bands_b = compute_bands(&series, PriceTrack::Raw, 22, 2.0);
    assert_eq!(bands_a, bands_b);

    let engine = engine(22, 2.0);
    let first = engine.run(&series);
    let second = engine.run(&series);
    assert_eq!(first, second);
    assert_eq!(summarize(&first.trades), summarize(&second.trades));
}
