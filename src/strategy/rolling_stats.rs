//! Rolling Band Statistics
//!
//! Trailing median, mean, standard deviation and skew over a fixed number of
//! observations, with bands at `median ± k·std`.
//!
//! The window is strict: the first `window_length - 1` rows have no band.
//! A missing band means "no signal this bar", never an error.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::VecDeque;

use crate::domain::{PricePoint, PriceSeries, PriceTrack, Side};

/// Skew beyond which entries are restricted to one direction
pub const SKEW_THRESHOLD: f64 = 1.0;

/// Population variance at or below which a window counts as flat and has no skew
pub const ZERO_VARIANCE_TOLERANCE: f64 = 1e-14;

/// Rolling statistics for one bar once the window has filled
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub rolling_median: f64,
    pub rolling_mean: f64,
    /// Sample standard deviation (n - 1)
    pub rolling_std: f64,
    /// Bias-adjusted sample skewness; None below 3 observations or at zero variance
    pub rolling_skew: Option<f64>,
    pub upper_bound: f64,
    pub lower_bound: f64,
}

impl Band {
    /// Distance of `price` from the median in standard deviations (0 at zero std)
    pub fn num_sd(&self, price: f64) -> f64 {
        if self.rolling_std == 0.0 {
            0.0
        } else {
            (price - self.rolling_median) / self.rolling_std
        }
    }
}

/// A series row with the band computed for it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandedPoint {
    pub point: PricePoint,
    /// Exit-side value of the evaluated track
    pub price: f64,
    pub band: Option<Band>,
}

/// Entry direction permitted by trailing skew
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkewBias {
    /// Skew < -1: only long entries
    FavorLong,
    /// Skew > 1: only short entries
    FavorShort,
    Either,
}

impl SkewBias {
    pub fn classify(skew: Option<f64>) -> Self {
        match skew {
            Some(s) if s < -SKEW_THRESHOLD => SkewBias::FavorLong,
            Some(s) if s > SKEW_THRESHOLD => SkewBias::FavorShort,
            _ => SkewBias::Either,
        }
    }

    pub fn permits(&self, side: Side) -> bool {
        matches!(
            (self, side),
            (SkewBias::Either, _) | (SkewBias::FavorLong, Side::Long) | (SkewBias::FavorShort, Side::Short)
        )
    }
}

/// Streaming band calculator over a fixed trailing window
#[derive(Debug, Clone)]
pub struct RollingBands {
    window_length: usize,
    sd_multiplier: f64,
    buffer: VecDeque<f64>,
}

impl RollingBands {
    pub fn new(window_length: usize, sd_multiplier: f64) -> Self {
        Self {
            window_length,
            sd_multiplier,
            buffer: VecDeque::with_capacity(window_length + 1),
        }
    }

    /// Push the next observation and return the band if the window is full
    pub fn update(&mut self, value: f64) -> Option<Band> {
        self.buffer.push_back(value);
        if self.buffer.len() > self.window_length {
            self.buffer.pop_front();
        }
        self.calculate()
    }

    /// Band over the current buffer
    pub fn calculate(&self) -> Option<Band> {
        if self.window_length == 0 || self.buffer.len() < self.window_length {
            return None;
        }

        let rolling_std = self.buffer.iter().std_dev();
        if !rolling_std.is_finite() {
            return None;
        }
        let rolling_mean = self.buffer.iter().mean();
        let rolling_median = self.median();
        let width = self.sd_multiplier * rolling_std;

        Some(Band {
            rolling_median,
            rolling_mean,
            rolling_std,
            rolling_skew: self.skew(rolling_mean),
            upper_bound: rolling_median + width,
            lower_bound: rolling_median - width,
        })
    }

    fn median(&self) -> f64 {
        let mut sorted: Vec<f64> = self.buffer.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        }
    }

    fn skew(&self, mean: f64) -> Option<f64> {
        let n = self.buffer.len();
        if n < 3 {
            return None;
        }
        let nf = n as f64;
        let (m2, m3) = self.buffer.iter().fold((0.0, 0.0), |(m2, m3), &x| {
            let dev = x - mean;
            (m2 + dev * dev, m3 + dev * dev * dev)
        });
        let (m2, m3) = (m2 / nf, m3 / nf);
        if m2 <= ZERO_VARIANCE_TOLERANCE {
            return None;
        }
        let g1 = m3 / m2.powf(1.5);
        Some(g1 * (nf * (nf - 1.0)).sqrt() / (nf - 2.0))
    }
}

/// Band for every value in order; `None` during warm-up
pub fn rolling_bands(values: &[f64], window_length: usize, sd_multiplier: f64) -> Vec<Option<Band>> {
    let mut bands = RollingBands::new(window_length, sd_multiplier);
    values.iter().map(|&value| bands.update(value)).collect()
}

/// Attach bands to every row of the series, computed on `track`'s exit side
pub fn compute_bands(
    series: &PriceSeries,
    track: PriceTrack,
    window_length: usize,
    sd_multiplier: f64,
) -> Vec<BandedPoint> {
    let values = series.exit_values(track);
    let bands = rolling_bands(&values, window_length, sd_multiplier);

    series
        .points()
        .iter()
        .zip(values)
        .zip(bands)
        .map(|((point, price), band)| BandedPoint {
            point: point.clone(),
            price,
            band,
        })
        .collect()
}
