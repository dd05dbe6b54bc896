use serde::{Deserialize, Serialize};

use crate::prelude::ProcessingResult;
use crate::sensor::capture::Capture;

/// Signal path selected ahead of the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RfPath {
    Antenna,
    NoiseDiodeOn,
    NoiseDiodeOff,
}

/// Analyzer settings for one measurement step. Optional fields are left
/// untouched on hardware that lacks the control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiganSettings {
    pub frequency_hz: f64,
    pub sample_rate_hz: f64,
    #[serde(default)]
    pub gain_db: Option<f64>,
    #[serde(default)]
    pub attenuation_db: Option<f64>,
    #[serde(default)]
    pub reference_level_dbm: Option<f64>,
    #[serde(default)]
    pub preamp_enable: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionRequest {
    pub num_samples: usize,
    pub num_samples_skip: usize,
    pub retries: u32,
    pub cal_adjust: bool,
}

impl AcquisitionRequest {
    pub fn new(num_samples: usize, num_samples_skip: usize, cal_adjust: bool) -> Self {
        Self {
            num_samples,
            num_samples_skip,
            retries: 5,
            cal_adjust,
        }
    }
}

/// Signal analyzer delivering complex baseband captures.
pub trait SignalAnalyzer {
    fn is_available(&self) -> bool;
    fn configure(&mut self, settings: &SiganSettings) -> ProcessingResult<()>;
    /// Settings most recently applied.
    fn settings(&self) -> &SiganSettings;
    fn sample_rate(&self) -> f64 {
        self.settings().sample_rate_hz
    }
    /// Unavailable hardware surfaces as `HardwareUnavailable`.
    fn acquire_time_domain_samples(&mut self, request: &AcquisitionRequest)
        -> ProcessingResult<Capture>;
}

/// RF front end with a switchable calibrated noise source.
pub trait Preselector {
    fn set_rf_path(&mut self, path: RfPath) -> ProcessingResult<()>;
    /// Excess noise ratio of calibration source `cal_source_idx`, in dB.
    fn noise_source_enr_db(&self, cal_source_idx: usize) -> ProcessingResult<f64>;
    /// Reading of temperature sensor `temp_sensor_idx`, in degrees Celsius.
    fn temperature_c(&self, temp_sensor_idx: usize) -> ProcessingResult<f64>;
}
