//! Latest band reading per differential, for scanning many at once.

use chrono::NaiveDate;
use serde::Serialize;

use crate::strategy::rolling_stats::BandedPoint;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestReading {
    pub name: String,
    pub date: NaiveDate,
    /// Exit-side contract of the final row, e.g. "Mar25-Apr25"
    pub contract: String,
    pub price: f64,
    pub median: f64,
    pub std_dev: f64,
    pub upper_bound: f64,
    pub lower_bound: f64,
    /// Signed distance from the median in standard deviations
    pub num_sd: f64,
}

impl LatestReading {
    pub fn is_outside_band(&self) -> bool {
        self.price <= self.lower_bound || self.price >= self.upper_bound
    }
}

/// Reading for the final row, or None when that row has no band yet
pub fn latest_reading(name: &str, bands: &[BandedPoint]) -> Option<LatestReading> {
    let last = bands.last()?;
    let band = last.band?;
    Some(LatestReading {
        name: name.to_string(),
        date: last.point.date,
        contract: last.point.exit_contract.clone(),
        price: last.price,
        median: band.rolling_median,
        std_dev: band.rolling_std,
        upper_bound: band.upper_bound,
        lower_bound: band.lower_bound,
        num_sd: band.num_sd(last.price),
    })
}

/// Largest absolute deviation first; ties keep input order
pub fn rank_by_deviation(mut readings: Vec<LatestReading>) -> Vec<LatestReading> {
    readings.sort_by(|a, b| b.num_sd.abs().total_cmp(&a.num_sd.abs()));
    readings
}
