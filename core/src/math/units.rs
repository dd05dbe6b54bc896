//! Unit conversions shared by every power computation.

use num_complex::Complex64;

/// System impedance assumed for every voltage-to-power conversion.
pub const IMPEDANCE_OHMS: f64 = 50.0;

/// Power difference between RF and complex baseband representations.
pub const RF_BASEBAND_DB: f64 = 3.0;

pub fn linear_to_db(value: f64) -> f64 {
    10.0 * value.log10()
}

pub fn db_to_linear(value_db: f64) -> f64 {
    10f64.powf(value_db / 10.0)
}

pub fn watts_to_dbm(watts: f64) -> f64 {
    linear_to_db(watts) + 30.0
}

pub fn celsius_to_kelvin(celsius: f64) -> f64 {
    celsius + 273.15
}

/// Instantaneous power of one sample across [`IMPEDANCE_OHMS`].
pub fn sample_power_watts(sample: Complex64) -> f64 {
    sample.norm_sqr() / IMPEDANCE_OHMS
}
