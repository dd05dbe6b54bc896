//! Amplitude probability distribution: the complementary CDF of sample
//! amplitude.

use ndarray::Array1;
use num_complex::Complex64;

use crate::math::units::{linear_to_db, IMPEDANCE_OHMS};
use crate::prelude::{ProcessingError, ProcessingResult};
use crate::telemetry::log::LogManager;

/// dBW to dBm (+30) less the RF/baseband conversion (3 dB).
const DBW_TO_DBM_OFFSET_DB: f64 = 27.0;

/// Upper bound on thresholds from a positive bin size.
pub const MAX_APD_THRESHOLDS: usize = 1 << 20;

/// Exceedance probabilities and their thresholds, one entry per threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct AmplitudeDistribution {
    /// `P(amplitude > threshold)`, non-increasing.
    pub probabilities: Array1<f64>,
    /// Threshold amplitudes in dBm, ascending.
    pub amplitudes_dbm: Array1<f64>,
}

impl AmplitudeDistribution {
    pub fn len(&self) -> usize {
        self.probabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probabilities.is_empty()
    }
}

pub struct ApdEstimator {
    bin_size_db: f64,
    logger: LogManager,
}

impl ApdEstimator {
    /// `bin_size_db == 0` yields one threshold per distinct amplitude.
    pub fn new(bin_size_db: f64) -> ProcessingResult<Self> {
        if !bin_size_db.is_finite() || bin_size_db < 0.0 {
            return Err(ProcessingError::InvalidParameter(format!(
                "apd_bin_size_dB must be finite and non-negative, got {}",
                bin_size_db
            )));
        }
        Ok(Self {
            bin_size_db,
            logger: LogManager::new("apd"),
        })
    }

    pub fn bin_size_db(&self) -> f64 {
        self.bin_size_db
    }

    pub fn estimate(&self, samples: &[Complex64]) -> ProcessingResult<AmplitudeDistribution> {
        if samples.is_empty() {
            return Err(ProcessingError::InsufficientSamples(
                "APD needs at least one sample".into(),
            ));
        }

        // Amplitudes are binned as 10*log10|x|. Zero amplitudes never exceed a
        // finite threshold but still count toward the total.
        let mut amplitudes_db: Vec<f64> = samples
            .iter()
            .map(|sample| sample.norm())
            .filter(|amplitude| *amplitude > 0.0)
            .map(linear_to_db)
            .collect();
        if amplitudes_db.is_empty() {
            self.logger
                .warn("capture contains only zero-amplitude samples; APD is empty");
            return Ok(AmplitudeDistribution {
                probabilities: Array1::zeros(0),
                amplitudes_dbm: Array1::zeros(0),
            });
        }
        amplitudes_db.sort_by(f64::total_cmp);

        let thresholds = self.thresholds(&amplitudes_db)?;
        let total = samples.len() as f64;
        let probabilities = thresholds
            .iter()
            .map(|threshold| {
                let at_or_below = amplitudes_db.partition_point(|value| value <= threshold);
                (amplitudes_db.len() - at_or_below) as f64 / total
            })
            .collect();
        let amplitudes_dbm = thresholds
            .iter()
            .map(|threshold| to_dbm(*threshold))
            .collect();

        Ok(AmplitudeDistribution {
            probabilities,
            amplitudes_dbm,
        })
    }

    /// Thresholds over the observed range of ascending `sorted_db`.
    fn thresholds(&self, sorted_db: &[f64]) -> ProcessingResult<Vec<f64>> {
        if self.bin_size_db == 0.0 {
            let mut distinct = sorted_db.to_vec();
            distinct.dedup();
            return Ok(distinct);
        }
        let (first, last) = match (sorted_db.first(), sorted_db.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Ok(Vec::new()),
        };
        let low = (first / self.bin_size_db).floor();
        let high = (last / self.bin_size_db).ceil();
        let span = (high - low).max(0.0);
        if span >= MAX_APD_THRESHOLDS as f64 {
            return Err(ProcessingError::InvalidParameter(format!(
                "apd_bin_size_dB {} over a {:.1} dB range exceeds {} thresholds",
                self.bin_size_db,
                last - first,
                MAX_APD_THRESHOLDS
            )));
        }
        Ok((0..=span as usize)
            .map(|step| (low + step as f64) * self.bin_size_db)
            .collect())
    }
}

/// `10*log10|x|` threshold to dBm: doubled to dB(V^2), then across the
/// system impedance.
fn to_dbm(amplitude_db: f64) -> f64 {
    2.0 * amplitude_db - linear_to_db(IMPEDANCE_OHMS) + DBW_TO_DBM_OFFSET_DB
}
