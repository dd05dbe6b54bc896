//! Y-factor gain and noise-figure calibration and the persisted table it
//! maintains.

pub mod store;
pub mod yfactor;

use serde::Serialize;

pub use store::{CalibrationKey, CalibrationRecord, CalibrationStore, JsonCalibrationStore};
pub use yfactor::{YFactorResult, BOLTZMANN};

/// Summary of one calibration step handed back to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationReport {
    pub frequency_hz: f64,
    pub y_factor: f64,
    pub noise_figure_db: f64,
    pub gain_db: f64,
    pub enbw_hz: f64,
    pub temperature_c: f64,
    /// `k_B * T * B` referred to the input, in dBm.
    pub noise_floor_dbm: f64,
}

impl CalibrationReport {
    pub fn detail(&self) -> String {
        format!(
            "Noise Figure: {}, Gain: {}",
            self.noise_figure_db, self.gain_db
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_names_noise_figure_then_gain() {
        let report = CalibrationReport {
            frequency_hz: 3.55e9,
            y_factor: 2.0,
            noise_figure_db: 10.0,
            gain_db: 30.5,
            enbw_hz: 1e6,
            temperature_c: 16.85,
            noise_floor_dbm: -114.0,
        };
        assert_eq!(report.detail(), "Noise Figure: 10, Gain: 30.5");
    }
}
