//! Spread Expressions
//!
//! A differential is written as an arithmetic combination of outright symbols,
//! e.g. `Brt-Dub` or `Gas+Gas-Brt`. A [`DiffSpec`] pairs two such expressions,
//! each resolved at its own deferred month, and prices the difference.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::contract::{ContractCode, ContractError, MAX_MONTH_OFFSET};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpreadError {
    #[error("Empty spread expression")]
    Empty,
    #[error("Missing symbol at position {position} in '{expr}'")]
    MissingSymbol { expr: String, position: usize },
    #[error("Invalid symbol '{0}'")]
    InvalidSymbol(String),
    #[error("Invalid month offset M{0} (must be M1..M{max})", max = MAX_MONTH_OFFSET)]
    InvalidOffset(u8),
    #[error("Differential name cannot be empty")]
    EmptyName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sign {
    Plus,
    Minus,
}

impl Sign {
    fn apply(self, value: f64) -> f64 {
        match self {
            Sign::Plus => value,
            Sign::Minus => -value,
        }
    }
}

/// One outright leg of a spread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub sign: Sign,
    pub symbol: String,
}

/// Parsed spread expression; the first leg is always positive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadExpr {
    legs: Vec<Leg>,
}

impl SpreadExpr {
    pub fn legs(&self) -> &[Leg] {
        &self.legs
    }

    /// Combine leg prices in leg order. `prices` must match `legs()` in length.
    pub fn combine(&self, prices: &[f64]) -> f64 {
        debug_assert_eq!(prices.len(), self.legs.len());
        self.legs
            .iter()
            .zip(prices)
            .map(|(leg, &price)| leg.sign.apply(price))
            .sum()
    }
}

impl FromStr for SpreadExpr {
    type Err = SpreadError;

    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        if expr.trim().is_empty() {
            return Err(SpreadError::Empty);
        }

        let mut legs = Vec::new();
        let mut sign = Sign::Plus;
        let mut current = String::new();

        let mut push_leg = |sign: Sign, raw: &str, position: usize| -> Result<(), SpreadError> {
            let symbol = raw.trim();
            if symbol.is_empty() {
                return Err(SpreadError::MissingSymbol {
                    expr: expr.to_string(),
                    position,
                });
            }
            if symbol.chars().any(char::is_whitespace) {
                return Err(SpreadError::InvalidSymbol(symbol.to_string()));
            }
            legs.push(Leg {
                sign,
                symbol: symbol.to_string(),
            });
            Ok(())
        };

        for (position, ch) in expr.char_indices() {
            match ch {
                '+' | '-' => {
                    push_leg(sign, &current, position)?;
                    current.clear();
                    sign = if ch == '+' { Sign::Plus } else { Sign::Minus };
                }
                _ => current.push(ch),
            }
        }
        push_leg(sign, &current, expr.len())?;

        Ok(Self { legs })
    }
}

impl fmt::Display for SpreadExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, leg) in self.legs.iter().enumerate() {
            match (i, leg.sign) {
                (0, _) => {}
                (_, Sign::Plus) => write!(f, "+")?,
                (_, Sign::Minus) => write!(f, "-")?,
            }
            write!(f, "{}", leg.symbol)?;
        }
        Ok(())
    }
}

/// A named differential: `first` at M-offset `months.0` minus `second` at `months.1`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffSpec {
    pub name: String,
    pub first: SpreadExpr,
    pub second: SpreadExpr,
    pub months: (u8, u8),
}

impl DiffSpec {
    pub fn new(
        name: impl Into<String>,
        first: &str,
        second: &str,
        months: (u8, u8),
    ) -> Result<Self, SpreadError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SpreadError::EmptyName);
        }
        for offset in [months.0, months.1] {
            if offset == 0 || offset > MAX_MONTH_OFFSET {
                return Err(SpreadError::InvalidOffset(offset));
            }
        }
        Ok(Self {
            name,
            first: first.parse()?,
            second: second.parse()?,
            months,
        })
    }

    /// The two contracts priced for a given front-month root
    pub fn contracts_for(&self, root: &ContractCode) -> Result<(ContractCode, ContractCode), ContractError> {
        Ok((root.deferred(self.months.0)?, root.deferred(self.months.1)?))
    }
}
