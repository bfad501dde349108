//! Futures Contract Codes
//!
//! A contract is identified by a three-letter month and a two-digit year,
//! e.g. `Mar25`. Deferred contracts M2..M4 are the following calendar months.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Month labels in calendar order
pub const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Number of deferred contracts resolvable from a front month (M1..M4)
pub const MAX_MONTH_OFFSET: u8 = 4;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContractError {
    #[error("Unknown month label: {0}")]
    UnknownMonth(String),
    #[error("Invalid contract code: {0} (expected e.g. Mar25)")]
    InvalidCode(String),
    #[error("Invalid month offset: M{0} (must be M1..M{max})", max = MAX_MONTH_OFFSET)]
    InvalidOffset(u8),
}

/// Parse a three-letter month label into its 1-based month number
pub fn month_number(label: &str) -> Result<u32, ContractError> {
    MONTH_LABELS
        .iter()
        .position(|m| *m == label)
        .map(|idx| idx as u32 + 1)
        .ok_or_else(|| ContractError::UnknownMonth(label.to_string()))
}

/// A single futures contract month
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContractCode {
    /// Calendar year, e.g. 2025
    year: i32,
    /// Month number 1..=12
    month: u32,
}

impl ContractCode {
    pub fn new(month: u32, year: i32) -> Result<Self, ContractError> {
        if !(1..=12).contains(&month) {
            return Err(ContractError::UnknownMonth(month.to_string()));
        }
        Ok(Self { year, month })
    }

    /// Build from a month label and a two-digit year, e.g. ("Mar", 25)
    pub fn from_label(label: &str, short_year: u32) -> Result<Self, ContractError> {
        Self::new(month_number(label)?, 2000 + short_year as i32)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Three-letter month label
    pub fn month_label(&self) -> &'static str {
        MONTH_LABELS[(self.month - 1) as usize]
    }

    /// Contract `months` calendar months after this one
    pub fn plus_months(&self, months: u32) -> Self {
        let zero_based = self.month - 1 + months;
        Self {
            year: self.year + (zero_based / 12) as i32,
            month: zero_based % 12 + 1,
        }
    }

    /// Resolve an M-offset (1 = this contract, 2 = next month, ...)
    pub fn deferred(&self, offset: u8) -> Result<Self, ContractError> {
        if offset == 0 || offset > MAX_MONTH_OFFSET {
            return Err(ContractError::InvalidOffset(offset));
        }
        Ok(self.plus_months(u32::from(offset) - 1))
    }

    /// First calendar day of the contract month
    pub fn first_day(&self) -> NaiveDate {
        // month is always 1..=12, day 1 always exists
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }
}

impl fmt::Display for ContractCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:02}", self.month_label(), self.year.rem_euclid(100))
    }
}

impl FromStr for ContractCode {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 5 || !s.is_ascii() {
            return Err(ContractError::InvalidCode(s.to_string()));
        }
        let (label, year) = s.split_at(3);
        let short_year: u32 = year
            .parse()
            .map_err(|_| ContractError::InvalidCode(s.to_string()))?;
        Self::from_label(label, short_year)
    }
}

impl TryFrom<String> for ContractCode {
    type Error = ContractError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContractCode> for String {
    fn from(code: ContractCode) -> Self {
        code.to_string()
    }
}

/// Front-month roots for the given month labels and two-digit years,
/// newest first.
pub fn roots_newest_first(
    front_months: &[String],
    years: &[u32],
) -> Result<Vec<ContractCode>, ContractError> {
    let mut roots = Vec::with_capacity(front_months.len() * years.len());
    for &year in years {
        for label in front_months {
            roots.push(ContractCode::from_label(label, year)?);
        }
    }
    roots.sort_unstable_by(|a, b| b.cmp(a));
    roots.dedup();
    Ok(roots)
}
