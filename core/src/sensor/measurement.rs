use chrono::{DateTime, Utc};
use num_complex::Complex64;
use serde::Serialize;

use crate::calibration::store::CalibrationRecord;
use crate::processing::data_product::DataProduct;
use crate::processing::detector::Statistic;
use crate::sensor::hardware::SiganSettings;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MeasurementPayload {
    DataProduct(DataProduct),
    /// One spectrum per detector statistic, in dBm per bin.
    FrequencyDomain {
        statistics: Vec<Statistic>,
        spectra: Vec<Vec<f32>>,
    },
    TimeDomainIq {
        samples: Vec<Complex64>,
    },
}

/// Plain-data hand-off for one completed measurement step.
#[derive(Debug, Clone, Serialize)]
pub struct MeasurementResult {
    pub task_id: u64,
    pub recording_id: usize,
    pub action: String,
    pub settings: SiganSettings,
    pub capture_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub overload: bool,
    pub payload: MeasurementPayload,
    pub sensor_calibration: Option<CalibrationRecord>,
    pub last_calibration_time: Option<DateTime<Utc>>,
}

impl MeasurementResult {
    pub fn frequency_hz(&self) -> f64 {
        self.settings.frequency_hz
    }

    pub fn sample_rate_hz(&self) -> f64 {
        self.settings.sample_rate_hz
    }
}
