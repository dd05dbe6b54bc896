//! Y-factor arithmetic: noise-diode on/off powers to noise figure and gain.

use num_complex::Complex64;

use crate::math::units::{linear_to_db, sample_power_watts, watts_to_dbm};
use crate::prelude::{ProcessingError, ProcessingResult};

/// Boltzmann constant, J/K.
pub const BOLTZMANN: f64 = 1.380649e-23;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YFactorResult {
    pub y_factor: f64,
    pub noise_figure_db: f64,
    pub gain_db: f64,
    pub noise_floor_dbm: f64,
}

/// Mean power in watts of a capture, after halving the sample amplitude to
/// go from complex baseband to RF.
pub fn mean_power_watts(samples: &[Complex64]) -> ProcessingResult<f64> {
    if samples.is_empty() {
        return Err(ProcessingError::InsufficientSamples(
            "power of an empty capture".into(),
        ));
    }
    let total: f64 = samples
        .iter()
        .map(|sample| sample_power_watts(*sample * 0.5))
        .sum();
    Ok(total / samples.len() as f64)
}

/// Noise figure and gain from noise-diode on/off powers (W), the linear ENR,
/// equivalent noise bandwidth (Hz) and physical temperature (K).
pub fn y_factor(
    power_on_w: f64,
    power_off_w: f64,
    enr_linear: f64,
    enbw_hz: f64,
    temperature_k: f64,
) -> ProcessingResult<YFactorResult> {
    if !(enbw_hz.is_finite() && enbw_hz > 0.0) {
        return Err(ProcessingError::InvalidParameter(format!(
            "equivalent noise bandwidth must be positive, got {} Hz",
            enbw_hz
        )));
    }
    if !(temperature_k.is_finite() && temperature_k > 0.0) {
        return Err(ProcessingError::InvalidParameter(format!(
            "temperature must be positive, got {} K",
            temperature_k
        )));
    }

    if !(enr_linear.is_finite() && enr_linear > 0.0) {
        return Err(ProcessingError::InvalidParameter(format!(
            "noise source ENR must be positive, got {} (linear)",
            enr_linear
        )));
    }

    let y = power_on_w / power_off_w;
    if !y.is_finite() || y <= 1.0 {
        return Err(ProcessingError::DegenerateYFactor(y));
    }

    let noise_factor = enr_linear / (y - 1.0);
    let thermal_w = BOLTZMANN * temperature_k * enbw_hz;
    let gain = power_on_w / (thermal_w * (enr_linear + noise_factor));

    Ok(YFactorResult {
        y_factor: y,
        noise_figure_db: linear_to_db(noise_factor),
        gain_db: linear_to_db(gain),
        noise_floor_dbm: watts_to_dbm(thermal_w),
    })
}
