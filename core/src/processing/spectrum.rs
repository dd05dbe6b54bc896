//! Windowed, averaged FFT power spectra.

use ndarray::{Array1, Array2, Axis};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::math::fft::{fft_shift, FftHelper};
use crate::math::matrix::MatrixHelper;
use crate::math::units::{linear_to_db, watts_to_dbm, IMPEDANCE_OHMS, RF_BASEBAND_DB};
use crate::math::window::{energy_correction, WindowType};
use crate::prelude::{ProcessingError, ProcessingResult};
use crate::processing::detector::PowerDetector;

/// How detected bin powers are referenced once in dBm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpectrumScaling {
    /// dBm/Hz: bin power is divided by the sample rate.
    Density,
    /// dBm per bin.
    BinPower,
}

/// Mean and max spectra, in dBm/Hz, ordered from the most negative frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerSpectrum {
    pub mean_dbm: Array1<f64>,
    pub max_dbm: Array1<f64>,
}

/// Reusable estimator holding the FFT plan and the window for one frame size.
pub struct SpectralEstimator {
    window_type: WindowType,
    window: Vec<f64>,
    energy_correction: f64,
    fft: FftHelper,
    detector: PowerDetector,
    scaling: SpectrumScaling,
}

impl SpectralEstimator {
    /// Mean/max estimator in dBm/Hz.
    pub fn new(fft_size: usize, window_type: WindowType) -> ProcessingResult<Self> {
        Self::with_detector(
            fft_size,
            window_type,
            PowerDetector::mean_max("fft"),
            SpectrumScaling::Density,
        )
    }

    pub fn with_detector(
        fft_size: usize,
        window_type: WindowType,
        detector: PowerDetector,
        scaling: SpectrumScaling,
    ) -> ProcessingResult<Self> {
        if fft_size == 0 {
            return Err(ProcessingError::InvalidParameter(
                "fft_size must be at least 1".into(),
            ));
        }
        if detector.statistics().is_empty() {
            return Err(ProcessingError::InvalidParameter(format!(
                "detector '{}' has no statistics",
                detector.name()
            )));
        }
        let window = window_type.generate(fft_size);
        let energy_correction = energy_correction(&window);
        Ok(Self {
            window_type,
            window,
            energy_correction,
            fft: FftHelper::new(fft_size),
            detector,
            scaling,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft.size()
    }

    pub fn window_type(&self) -> WindowType {
        self.window_type
    }

    pub fn energy_correction(&self) -> f64 {
        self.energy_correction
    }

    pub fn detector(&self) -> &PowerDetector {
        &self.detector
    }

    /// One spectrum per detector statistic, in the detector's order.
    pub fn estimate_all(
        &mut self,
        samples: &[Complex64],
        num_ffts: usize,
        sample_rate_hz: f64,
    ) -> ProcessingResult<Vec<Array1<f64>>> {
        if num_ffts == 0 {
            return Err(ProcessingError::InvalidParameter(
                "nffts must be at least 1".into(),
            ));
        }
        if !(sample_rate_hz.is_finite() && sample_rate_hz > 0.0) {
            return Err(ProcessingError::InvalidParameter(format!(
                "sample rate must be positive, got {}",
                sample_rate_hz
            )));
        }
        let fft_size = self.fft.size();
        let frames = MatrixHelper::frames(samples, num_ffts, fft_size)?;

        let mut power = Array2::<f64>::zeros((num_ffts, fft_size));
        let mut frame = vec![Complex64::new(0.0, 0.0); fft_size];
        for (source, mut target) in frames.outer_iter().zip(power.outer_iter_mut()) {
            for ((slot, sample), weight) in frame.iter_mut().zip(source.iter()).zip(&self.window) {
                *slot = *sample * *weight;
            }
            self.fft.forward_normalized(&mut frame);
            for (value, bin) in target.iter_mut().zip(&frame) {
                *value = bin.norm_sqr();
            }
        }

        let mut offset_db = -RF_BASEBAND_DB + 20.0 * self.energy_correction.log10();
        if self.scaling == SpectrumScaling::Density {
            offset_db -= linear_to_db(sample_rate_hz);
        }

        Ok(self
            .detector
            .apply(power.view(), Axis(0), false)
            .into_iter()
            .map(|detected| {
                let watts: Vec<f64> = detected.iter().map(|p| p / IMPEDANCE_OHMS).collect();
                fft_shift(&watts)
                    .into_iter()
                    .map(|w| watts_to_dbm(w) + offset_db)
                    .collect()
            })
            .collect())
    }

    /// Mean and max spectra. The estimator must carry the default mean/max
    /// detector.
    pub fn estimate(
        &mut self,
        samples: &[Complex64],
        num_ffts: usize,
        sample_rate_hz: f64,
    ) -> ProcessingResult<PowerSpectrum> {
        let mut spectra = self.estimate_all(samples, num_ffts, sample_rate_hz)?.into_iter();
        match (spectra.next(), spectra.next()) {
            (Some(mean_dbm), Some(max_dbm)) => Ok(PowerSpectrum { mean_dbm, max_dbm }),
            _ => Err(ProcessingError::InvalidParameter(format!(
                "detector '{}' does not produce mean and max",
                self.detector.name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::units::db_to_linear;
    use crate::processing::detector::Statistic;
    use std::f64::consts::PI;

    fn tone(bin: usize, fft_size: usize, len: usize, amplitude: f64) -> Vec<Complex64> {
        (0..len)
            .map(|n| {
                let phase = 2.0 * PI * bin as f64 * n as f64 / fft_size as f64;
                Complex64::from_polar(amplitude, phase)
            })
            .collect()
    }

    #[test]
    fn rectangular_tone_stays_in_its_bin() {
        let fft_size = 256;
        let samples = tone(40, fft_size, fft_size * 4, 1.0);
        let mut estimator = SpectralEstimator::new(fft_size, WindowType::Rectangular).unwrap();
        let spectrum = estimator.estimate(&samples, 4, 1e6).unwrap();

        let linear: Vec<f64> = spectrum.mean_dbm.iter().map(|&db| db_to_linear(db)).collect();
        let total: f64 = linear.iter().sum();
        let peak = fft_size / 2 + 40;
        assert!(linear[peak] / total >= 0.99);
        // 1 V into 50 ohm, less 3 dB and 60 dB/Hz at 1 MHz
        assert!((spectrum.mean_dbm[peak] - -49.9897).abs() < 1e-3);
    }

    #[test]
    fn hann_tone_peaks_at_shifted_index() {
        let samples = tone(100, 1024, 1024 * 10, 0.5);
        let mut estimator = SpectralEstimator::new(1024, WindowType::Hann).unwrap();
        let spectrum = estimator.estimate(&samples, 10, 1e6).unwrap();

        let argmax = |values: &Array1<f64>| {
            values
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(index, _)| index)
                .unwrap()
        };
        assert_eq!(argmax(&spectrum.mean_dbm), 612);
        assert_eq!(argmax(&spectrum.max_dbm), 612);
        assert!((spectrum.mean_dbm[612] - spectrum.max_dbm[612]).abs() < 0.1);
    }

    #[test]
    fn rejects_short_capture() {
        let samples = vec![Complex64::new(1.0, 0.0); 1000];
        let mut estimator = SpectralEstimator::new(256, WindowType::Hann).unwrap();
        assert!(matches!(
            estimator.estimate(&samples, 4, 1e6),
            Err(ProcessingError::InsufficientSamples(_))
        ));
        assert!(matches!(
            estimator.estimate(&samples, 0, 1e6),
            Err(ProcessingError::InvalidParameter(_))
        ));
    }

    #[test]
    fn bin_power_scaling_omits_bandwidth_term() {
        let samples = tone(3, 64, 64 * 2, 1.0);
        let detector = PowerDetector::new("m4s", &[Statistic::Min, Statistic::Max]);
        let mut estimator = SpectralEstimator::with_detector(
            64,
            WindowType::Rectangular,
            detector,
            SpectrumScaling::BinPower,
        )
        .unwrap();
        let spectra = estimator.estimate_all(&samples, 2, 1e6).unwrap();
        assert_eq!(spectra.len(), 2);
        assert!((spectra[1][32 + 3] - 10.0103).abs() < 1e-3);
        assert!(spectra[0][32 + 3] <= spectra[1][32 + 3] + 1e-9);
    }
}
