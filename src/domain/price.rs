//! Differential Price Series
//!
//! Typed input for the backtest. Every row carries two observations:
//! the entry side (used to open positions and re-base after a roll) and the
//! exit side (used for band evaluation, exits and contract boundaries).
//! Validation happens once, at construction, so the engine never meets
//! unsorted or partial rows mid-loop.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("Dates not strictly increasing at row {index}: {previous} then {current}")]
    UnorderedDates {
        index: usize,
        previous: NaiveDate,
        current: NaiveDate,
    },
    #[error("Duplicate date {0}")]
    DuplicateDate(NaiveDate),
    #[error("Non-finite {field} on {date}")]
    NonFinitePrice { date: NaiveDate, field: &'static str },
    #[error("Empty contract month label on {0}")]
    MissingContractMonth(NaiveDate),
}

/// Which price columns drive signals and P&L
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceTrack {
    /// Roll-continuity adjusted prices
    #[default]
    Normalized,
    /// Prices as quoted
    Raw,
}

impl PriceTrack {
    pub fn entry(&self, point: &PricePoint) -> f64 {
        match self {
            PriceTrack::Normalized => point.entry_norm_price,
            PriceTrack::Raw => point.entry_price,
        }
    }

    pub fn exit(&self, point: &PricePoint) -> f64 {
        match self {
            PriceTrack::Normalized => point.exit_norm_price,
            PriceTrack::Raw => point.exit_price,
        }
    }
}

/// One dated row of a differential series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_norm_price: f64,
    pub exit_norm_price: f64,
    pub entry_contract: String,
    pub exit_contract: String,
    pub entry_contract_month: String,
    pub exit_contract_month: String,
}

impl PricePoint {
    /// A row where entry and exit sides are the same single-contract observation
    pub fn single(date: NaiveDate, price: f64, contract: &str, contract_month: &str) -> Self {
        Self {
            date,
            entry_price: price,
            exit_price: price,
            entry_norm_price: price,
            exit_norm_price: price,
            entry_contract: contract.to_string(),
            exit_contract: contract.to_string(),
            entry_contract_month: contract_month.to_string(),
            exit_contract_month: contract_month.to_string(),
        }
    }

    fn validate(&self) -> Result<(), SeriesError> {
        let fields = [
            ("entry_price", self.entry_price),
            ("exit_price", self.exit_price),
            ("entry_norm_price", self.entry_norm_price),
            ("exit_norm_price", self.exit_norm_price),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(SeriesError::NonFinitePrice {
                    date: self.date,
                    field,
                });
            }
        }
        if self.entry_contract_month.is_empty() || self.exit_contract_month.is_empty() {
            return Err(SeriesError::MissingContractMonth(self.date));
        }
        Ok(())
    }
}

/// Date-sorted, validated differential series
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Build from rows already in ascending date order
    pub fn new(points: Vec<PricePoint>) -> Result<Self, SeriesError> {
        for point in &points {
            point.validate()?;
        }
        for (index, pair) in points.windows(2).enumerate() {
            let (previous, current) = (pair[0].date, pair[1].date);
            if current == previous {
                return Err(SeriesError::DuplicateDate(current));
            }
            if current < previous {
                return Err(SeriesError::UnorderedDates {
                    index: index + 1,
                    previous,
                    current,
                });
            }
        }
        Ok(Self { points })
    }

    /// Sort by date first; duplicate dates are still rejected
    pub fn from_unsorted(mut points: Vec<PricePoint>) -> Result<Self, SeriesError> {
        points.sort_by_key(|p| p.date);
        Self::new(points)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    /// Values of one track's exit side, in date order
    pub fn exit_values(&self, track: PriceTrack) -> Vec<f64> {
        self.points.iter().map(|p| track.exit(p)).collect()
    }

    /// True when the next row's exit contract month differs, or this is the final row
    pub fn is_last_bar_of_contract(&self, index: usize) -> bool {
        match (self.points.get(index), self.points.get(index + 1)) {
            (Some(current), Some(next)) => next.exit_contract_month != current.exit_contract_month,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

impl<'de> Deserialize<'de> for PriceSeries {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let points = Vec::<PricePoint>::deserialize(deserializer)?;
        PriceSeries::from_unsorted(points).map_err(serde::de::Error::custom)
    }
}
