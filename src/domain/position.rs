use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::calendar::business_days_between;
use crate::domain::trade::{ExitReason, LegFill, Trade};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Signed price move in this side's favour
    pub fn pnl(&self, entry_price: f64, exit_price: f64) -> f64 {
        match self {
            Side::Long => exit_price - entry_price,
            Side::Short => entry_price - exit_price,
        }
    }

    /// Worst excursion against this side given the running extreme
    pub fn adverse(&self, entry_price: f64, extreme: f64) -> f64 {
        match self {
            Side::Long => extreme - entry_price,
            Side::Short => entry_price - extreme,
        }
    }

    /// Whether `price` has come back to `median` from this side
    pub fn has_reverted(&self, price: f64, median: f64) -> bool {
        match self {
            Side::Long => price >= median,
            Side::Short => price <= median,
        }
    }

    fn tighten(&self, extreme: f64, price: f64) -> f64 {
        match self {
            Side::Long => extreme.min(price),
            Side::Short => extreme.max(price),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "Long"),
            Side::Short => write!(f, "Short"),
        }
    }
}

/// An open position, alive for one trade lifecycle.
///
/// `entry_price` and `extreme` always refer to the current contract leg;
/// legs already rolled out of sit in `legs` with their P&L folded into the
/// accumulators.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    side: Side,
    entry_date: NaiveDate,
    entry_price: f64,
    extreme: f64,
    accumulated_return: f64,
    accumulated_max_loss: f64,
    legs: Vec<LegFill>,
}

impl Position {
    pub fn open(side: Side, entry_date: NaiveDate, entry_price: f64) -> Self {
        Self {
            side,
            entry_date,
            entry_price,
            extreme: entry_price,
            accumulated_return: 0.0,
            accumulated_max_loss: 0.0,
            legs: Vec::new(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn entry_date(&self) -> NaiveDate {
        self.entry_date
    }

    /// Entry price of the current leg
    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    /// Running low (long) or high (short) of the current leg
    pub fn extreme(&self) -> f64 {
        self.extreme
    }

    /// Number of contract rolls spliced into this position
    pub fn rolls(&self) -> usize {
        self.legs.len()
    }

    /// Track the adverse extreme with a new exit-side observation
    pub fn mark(&mut self, exit_price: f64) {
        self.extreme = self.side.tighten(self.extreme, exit_price);
    }

    /// Close the current leg at `exit_price` on `contract` and continue on the
    /// next contract from `next_entry_price`.
    pub fn roll(&mut self, contract: &str, exit_price: f64, next_entry_price: f64) {
        let leg = self.close_leg(contract, exit_price);
        self.accumulated_return += leg.pnl(self.side);
        self.accumulated_max_loss += leg.max_loss(self.side);
        self.legs.push(leg);

        self.entry_price = next_entry_price;
        self.extreme = next_entry_price;
    }

    /// Finalize into an immutable trade record
    pub fn close(
        mut self,
        exit_date: NaiveDate,
        contract: &str,
        exit_price: f64,
        reason: ExitReason,
    ) -> Trade {
        let leg = self.close_leg(contract, exit_price);
        let total_return = self.accumulated_return + leg.pnl(self.side);
        let max_loss = self.accumulated_max_loss + leg.max_loss(self.side);
        self.legs.push(leg);

        Trade {
            entry_date: self.entry_date,
            exit_date,
            side: self.side,
            total_return,
            max_loss,
            holding_period: business_days_between(self.entry_date, exit_date),
            legs: self.legs,
            exit_reason: reason,
        }
    }

    fn close_leg(&self, contract: &str, exit_price: f64) -> LegFill {
        LegFill {
            contract: contract.to_string(),
            entry_price: self.entry_price,
            exit_price,
            extreme_price: self.extreme,
        }
    }
}
