//! Performance Aggregation
//!
//! Rolls a trade ledger up into headline and per-year metrics. All figures
//! keep full precision; rounding belongs to rendering.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::calendar::months_before;
use crate::domain::{Side, Trade};

/// Aggregate metrics over a set of trades
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub num_trades: usize,
    pub cumulative_return: f64,
    pub cumulative_max_loss: f64,
    /// cumulative_return / -cumulative_max_loss; 0 with no trades, unbounded at zero loss
    pub ratio: f64,
    /// Percentage of trades with a positive return
    pub win_rate: f64,
}

/// Metrics for trades entered in one calendar year
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct YearlyPerformance {
    pub year: i32,
    pub num_trades: usize,
    pub cumulative_return: f64,
    pub cumulative_max_loss: f64,
    pub ratio: f64,
    pub win_rate: f64,
    /// Mean business-day holding period, truncated
    pub avg_holding_period: i64,
}

pub fn summarize(trades: &[Trade]) -> PerformanceSummary {
    if trades.is_empty() {
        return PerformanceSummary::default();
    }
    let trades: Vec<&Trade> = trades.iter().collect();
    aggregate(&trades)
}

/// One row per entry year, most recent year first
pub fn summarize_by_year(trades: &[Trade]) -> Vec<YearlyPerformance> {
    let mut by_year: BTreeMap<i32, Vec<&Trade>> = BTreeMap::new();
    for trade in trades {
        by_year.entry(trade.year()).or_default().push(trade);
    }

    by_year
        .into_iter()
        .rev()
        .map(|(year, group)| {
            let summary = aggregate(&group);
            let total_holding: i64 = group.iter().map(|t| t.holding_period).sum();
            YearlyPerformance {
                year,
                num_trades: summary.num_trades,
                cumulative_return: summary.cumulative_return,
                cumulative_max_loss: summary.cumulative_max_loss,
                ratio: summary.ratio,
                win_rate: summary.win_rate,
                avg_holding_period: (total_holding as f64 / group.len() as f64) as i64,
            }
        })
        .collect()
}

fn aggregate(trades: &[&Trade]) -> PerformanceSummary {
    let num_trades = trades.len();
    let cumulative_return: f64 = trades.iter().map(|t| t.total_return).sum();
    let cumulative_max_loss: f64 = trades.iter().map(|t| t.max_loss).sum();
    let wins = trades.iter().filter(|t| t.is_win()).count();

    PerformanceSummary {
        num_trades,
        cumulative_return,
        cumulative_max_loss,
        ratio: cumulative_return / -cumulative_max_loss,
        win_rate: wins as f64 / num_trades as f64 * 100.0,
    }
}

/// Trades ordered by entry date, most recent first; ties keep ledger order
pub fn ledger_most_recent_first(trades: &[Trade]) -> Vec<Trade> {
    let mut ordered = trades.to_vec();
    ordered.sort_by(|a, b| b.entry_date.cmp(&a.entry_date));
    ordered
}

/// Trades entered on or after `months` calendar months before `latest`
pub fn trailing_window(trades: &[Trade], latest: NaiveDate, months: u32) -> Vec<Trade> {
    let Some(cutoff) = months_before(latest, months) else {
        return trades.to_vec();
    };
    trades
        .iter()
        .filter(|t| t.entry_date >= cutoff)
        .cloned()
        .collect()
}

/// Presentation row of the trade ledger
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerRow {
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub holding_period: i64,
    pub direction: Side,
    #[serde(rename = "return")]
    pub total_return: f64,
    pub max_loss: f64,
    pub contracts: Vec<String>,
    pub year: i32,
    pub rolling_window: String,
    pub sd_multiplier: f64,
    pub differential_name: String,
}

impl LedgerRow {
    pub fn from_trade(trade: &Trade, rolling_window: &str, sd_multiplier: f64, name: &str) -> Self {
        Self {
            entry_date: trade.entry_date,
            exit_date: trade.exit_date,
            holding_period: trade.holding_period,
            direction: trade.side,
            total_return: trade.total_return,
            max_loss: trade.max_loss,
            contracts: trade.legs.iter().map(|leg| leg.contract.clone()).collect(),
            year: trade.year(),
            rolling_window: rolling_window.to_string(),
            sd_multiplier,
            differential_name: name.to_string(),
        }
    }
}

/// Ledger rows, most recent entry first
pub fn ledger_rows(
    trades: &[Trade],
    rolling_window: &str,
    sd_multiplier: f64,
    name: &str,
) -> Vec<LedgerRow> {
    ledger_most_recent_first(trades)
        .iter()
        .map(|trade| LedgerRow::from_trade(trade, rolling_window, sd_multiplier, name))
        .collect()
}
