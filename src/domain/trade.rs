use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::position::Side;

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Exit-side price came back to the rolling median
    MedianReversion,
    /// Final bar of the series
    EndOfData,
    /// Contract boundary reached with no further roll permitted
    RollLimit,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::MedianReversion => write!(f, "median"),
            ExitReason::EndOfData => write!(f, "end of data"),
            ExitReason::RollLimit => write!(f, "roll limit"),
        }
    }
}

/// One contract leg of a trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegFill {
    pub contract: String,
    pub entry_price: f64,
    pub exit_price: f64,
    /// Running low (long) or high (short) reached on this leg
    pub extreme_price: f64,
}

impl LegFill {
    pub fn pnl(&self, side: Side) -> f64 {
        side.pnl(self.entry_price, self.exit_price)
    }

    pub fn max_loss(&self, side: Side) -> f64 {
        side.adverse(self.entry_price, self.extreme_price)
    }
}

/// Closed trade; immutable once produced by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub side: Side,
    pub total_return: f64,
    pub max_loss: f64,
    /// Business days from entry to exit
    pub holding_period: i64,
    pub legs: Vec<LegFill>,
    pub exit_reason: ExitReason,
}

impl Trade {
    pub fn contracts_traversed(&self) -> Vec<&str> {
        self.legs.iter().map(|leg| leg.contract.as_str()).collect()
    }

    /// (entry, exit) price of every leg in order
    pub fn entry_exit_price_pairs(&self) -> Vec<(f64, f64)> {
        self.legs.iter().map(|leg| (leg.entry_price, leg.exit_price)).collect()
    }

    pub fn year(&self) -> i32 {
        self.entry_date.year()
    }

    pub fn is_win(&self) -> bool {
        self.total_return > 0.0
    }
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} return {:.2} max loss {:.2} [{}] ({})",
            self.side,
            self.entry_date,
            self.exit_date,
            self.total_return,
            self.max_loss,
            self.contracts_traversed().join(", "),
            self.exit_reason
        )
    }
}
