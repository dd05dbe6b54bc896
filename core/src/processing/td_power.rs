//! Block-wise time-domain power statistics with optional outlier rejection.

use ndarray::{Array1, Array2, ArrayViewMut1, Axis};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::math::matrix::MatrixHelper;
use crate::math::stats::StatsHelper;
use crate::math::units::{sample_power_watts, watts_to_dbm, RF_BASEBAND_DB};
use crate::prelude::{ProcessingError, ProcessingResult};
use crate::processing::detector::PowerDetector;

/// Inclusive quantile band kept within each block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantileFilter {
    pub lower: f64,
    pub upper: f64,
}

impl QuantileFilter {
    pub fn new(lower: f64, upper: f64) -> ProcessingResult<Self> {
        if !(0.0..=1.0).contains(&lower) || !(0.0..=1.0).contains(&upper) || lower > upper {
            return Err(ProcessingError::InvalidParameter(format!(
                "quantile bounds must satisfy 0 <= qlo <= qhi <= 1, got [{}, {}]",
                lower, upper
            )));
        }
        Ok(Self { lower, upper })
    }

    /// Masks entries outside `[q(lower), q(upper)]` of the lane to `NaN`,
    /// returning how many were masked.
    fn mask(&self, mut lane: ArrayViewMut1<f64>) -> usize {
        let mut sorted: Vec<f64> = lane.iter().copied().filter(|v| !v.is_nan()).collect();
        if sorted.is_empty() {
            return 0;
        }
        sorted.sort_by(f64::total_cmp);
        let low = StatsHelper::quantile_sorted(&sorted, self.lower);
        let high = StatsHelper::quantile_sorted(&sorted, self.upper);

        let mut masked = 0;
        for value in lane.iter_mut() {
            if *value < low || *value > high {
                *value = f64::NAN;
                masked += 1;
            }
        }
        masked
    }
}

/// Per-block mean and max power in dBm, plus the share of samples the
/// quantile filter discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeDomainPower {
    pub mean_dbm: Array1<f64>,
    pub max_dbm: Array1<f64>,
    pub rejected_fraction: f64,
}

pub struct TimeDomainPowerEngine {
    quantile_filter: Option<QuantileFilter>,
    detector: PowerDetector,
}

impl TimeDomainPowerEngine {
    pub fn new(quantile_filter: Option<QuantileFilter>) -> Self {
        Self {
            quantile_filter,
            detector: PowerDetector::mean_max("td"),
        }
    }

    pub fn quantile_filter(&self) -> Option<QuantileFilter> {
        self.quantile_filter
    }

    /// Number of samples in one block of `block_ms`.
    pub fn block_size(block_ms: f64, sample_rate_hz: f64) -> usize {
        let size = (block_ms * sample_rate_hz / 1000.0).floor();
        if size.is_finite() && size > 0.0 {
            size as usize
        } else {
            0
        }
    }

    pub fn compute(
        &self,
        samples: &[Complex64],
        block_ms: f64,
        sample_rate_hz: f64,
    ) -> ProcessingResult<TimeDomainPower> {
        let block_size = Self::block_size(block_ms, sample_rate_hz);
        if block_size == 0 {
            return Err(ProcessingError::InsufficientSamples(format!(
                "{} ms at {} Hz is shorter than one sample",
                block_ms, sample_rate_hz
            )));
        }
        let num_blocks = samples.len() / block_size;
        if num_blocks == 0 {
            return Err(ProcessingError::InsufficientSamples(format!(
                "{} samples do not fill one {}-sample block",
                samples.len(),
                block_size
            )));
        }

        let blocks = MatrixHelper::frames(samples, num_blocks, block_size)?;
        let mut power: Array2<f64> = blocks.mapv(sample_power_watts);

        let rejected = match &self.quantile_filter {
            Some(filter) => power
                .axis_iter_mut(Axis(0))
                .map(|block| filter.mask(block))
                .sum::<usize>(),
            None => 0,
        };

        let mut detected = self
            .detector
            .apply(power.view(), Axis(1), true)
            .into_iter()
            .map(|watts| watts.mapv(|w| watts_to_dbm(w) - RF_BASEBAND_DB));
        let (mean_dbm, max_dbm) = match (detected.next(), detected.next()) {
            (Some(mean), Some(max)) => (mean, max),
            _ => {
                return Err(ProcessingError::InvalidParameter(
                    "time-domain detector must produce mean and max".into(),
                ))
            }
        };

        Ok(TimeDomainPower {
            mean_dbm,
            max_dbm,
            rejected_fraction: rejected as f64 / power.len() as f64,
        })
    }
}
