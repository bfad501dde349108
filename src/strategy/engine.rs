//! Band Backtest Engine
//!
//! One forward pass over a band-augmented series holding at most one open
//! position. The machine has two states, flat and in-trade:
//!
//! - Flat: enter long when the entry-side price is at or below the lower
//!   band, else short when at or above the upper band. Nothing else is
//!   evaluated on the entry bar.
//! - In trade: mark the adverse extreme with the exit-side price, then close
//!   on reversion to the median or on the final bar. A position still open
//!   on the last bar of its contract is rolled onto the next contract while
//!   it has roll capacity left, otherwise it is force-closed.
//!
//! Roll capacity and skew gating come from [`Capabilities`].

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::domain::{ExitReason, Position, PricePoint, PriceSeries, Side, Trade};
use crate::strategy::params::{BacktestConfig, Capabilities};
use crate::strategy::rolling_stats::{compute_bands, Band, BandedPoint, SkewBias};

/// Everything the state machine sees for one bar
#[derive(Debug, Clone, Copy)]
pub struct Bar<'a> {
    pub date: NaiveDate,
    pub entry_price: f64,
    pub exit_price: f64,
    pub band: Option<Band>,
    pub exit_contract: &'a str,
    /// Next bar trades a different contract month, or this is the final bar
    pub is_last_of_contract: bool,
    pub is_last_of_data: bool,
    /// False inside the blocked final month of a contract
    pub entry_allowed: bool,
}

/// Transitions taken on one bar
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BarSignal {
    pub entry: Option<Side>,
    pub exit: Option<Side>,
    pub rolled: bool,
}

/// Sequential entry/exit state machine
#[derive(Debug, Clone)]
pub struct SignalMachine {
    capabilities: Capabilities,
    position: Option<Position>,
    trades: Vec<Trade>,
}

impl SignalMachine {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            position: None,
            trades: Vec::new(),
        }
    }

    /// Currently open position, if any
    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    /// Trades closed so far
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Advance the machine by one bar
    pub fn step(&mut self, bar: &Bar<'_>) -> BarSignal {
        match self.position.take() {
            None => BarSignal {
                entry: self.try_enter(bar),
                ..BarSignal::default()
            },
            Some(position) => self.advance(position, bar),
        }
    }

    /// Consume the machine and return the closed trades.
    ///
    /// A position can only still be open here if it was entered on the final
    /// bar; it has no exit and is discarded.
    pub fn finish(self) -> Vec<Trade> {
        if let Some(position) = &self.position {
            tracing::debug!(
                "Discarding {} position opened on the final bar ({})",
                position.side(),
                position.entry_date()
            );
        }
        self.trades
    }

    fn try_enter(&mut self, bar: &Bar<'_>) -> Option<Side> {
        if !bar.entry_allowed {
            return None;
        }
        let band = bar.band?;
        let bias = if self.capabilities.skew_gated {
            SkewBias::classify(band.rolling_skew)
        } else {
            SkewBias::Either
        };

        let side = if bar.entry_price <= band.lower_bound && bias.permits(Side::Long) {
            Side::Long
        } else if bar.entry_price >= band.upper_bound && bias.permits(Side::Short) {
            Side::Short
        } else {
            return None;
        };

        self.position = Some(Position::open(side, bar.date, bar.entry_price));
        Some(side)
    }

    fn advance(&mut self, mut position: Position, bar: &Bar<'_>) -> BarSignal {
        let side = position.side();
        position.mark(bar.exit_price);

        let reverted = bar
            .band
            .is_some_and(|band| side.has_reverted(bar.exit_price, band.rolling_median));

        if reverted || bar.is_last_of_data {
            let reason = if reverted {
                ExitReason::MedianReversion
            } else {
                ExitReason::EndOfData
            };
            self.close(position, bar, reason);
            return BarSignal {
                exit: Some(side),
                ..BarSignal::default()
            };
        }

        if bar.is_last_of_contract {
            if position.rolls() >= self.capabilities.max_rolls() {
                self.close(position, bar, ExitReason::RollLimit);
                return BarSignal {
                    exit: Some(side),
                    ..BarSignal::default()
                };
            }
            position.roll(bar.exit_contract, bar.exit_price, bar.entry_price);
            tracing::debug!(
                "{} position from {} rolled out of {} at {:.4}, continuing from {:.4}",
                side,
                position.entry_date(),
                bar.exit_contract,
                bar.exit_price,
                bar.entry_price
            );
            self.position = Some(position);
            return BarSignal {
                rolled: true,
                ..BarSignal::default()
            };
        }

        self.position = Some(position);
        BarSignal::default()
    }

    fn close(&mut self, position: Position, bar: &Bar<'_>, reason: ExitReason) {
        let trade = position.close(bar.date, bar.exit_contract, bar.exit_price, reason);
        tracing::debug!("Closed {}", trade);
        self.trades.push(trade);
    }
}

/// Output of one backtest run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BacktestRun {
    /// Band-augmented series, one row per input point
    pub bands: Vec<BandedPoint>,
    /// Transitions per row, parallel to `bands`
    pub signals: Vec<BarSignal>,
    /// Closed trades in exit order
    pub trades: Vec<Trade>,
}

impl BacktestRun {
    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }
}

/// Runs the band strategy over a price series
#[derive(Debug, Clone)]
pub struct BacktestEngine {
    config: BacktestConfig,
}

impl BacktestEngine {
    pub fn new(config: BacktestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Compute bands and walk the series once
    pub fn run(&self, series: &PriceSeries) -> BacktestRun {
        if series.is_empty() {
            tracing::info!("No data: empty series, no trades");
            return BacktestRun::default();
        }

        let track = self.config.price_track;
        let capabilities = self.config.capabilities;
        let bands = compute_bands(
            series,
            track,
            self.config.window.length(),
            self.config.sd_multiplier,
        );
        let points = series.points();
        let entry_allowed = if capabilities.roll_aware {
            vec![true; points.len()]
        } else {
            final_month_mask(points)
        };

        let mut machine = SignalMachine::new(capabilities);
        let signals = bands
            .iter()
            .enumerate()
            .map(|(i, banded)| {
                let bar = Bar {
                    date: banded.point.date,
                    entry_price: track.entry(&banded.point),
                    exit_price: track.exit(&banded.point),
                    band: banded.band,
                    exit_contract: &banded.point.exit_contract,
                    is_last_of_contract: series.is_last_bar_of_contract(i),
                    is_last_of_data: i + 1 == points.len(),
                    entry_allowed: entry_allowed[i],
                };
                machine.step(&bar)
            })
            .collect();
        let trades = machine.finish();

        tracing::info!(
            "Backtest {} / {}sd over {} bars: {} trades",
            self.config.window,
            self.config.sd_multiplier,
            points.len(),
            trades.len()
        );

        BacktestRun {
            bands,
            signals,
            trades,
        }
    }
}

/// Entry permission per bar for single-contract runs.
///
/// Each contiguous run of one exit contract month ends at that contract's
/// last bar; bars in the same calendar month as that last bar may not open
/// a position.
pub fn final_month_mask(points: &[PricePoint]) -> Vec<bool> {
    let mut allowed = vec![true; points.len()];
    let mut start = 0;

    while start < points.len() {
        let month = &points[start].exit_contract_month;
        let end = points[start..]
            .iter()
            .position(|p| &p.exit_contract_month != month)
            .map_or(points.len(), |offset| start + offset);
        let last = points[end - 1].date;

        for (flag, point) in allowed[start..end].iter_mut().zip(&points[start..end]) {
            if point.date.year() == last.year() && point.date.month() == last.month() {
                *flag = false;
            }
        }
        start = end;
    }

    allowed
}
