//! Schedulable actions: each one drives the sensor through a sequence of
//! configure/acquire steps and reduces the captures it collects.

pub mod calibrate;
pub mod data_product;
pub mod params;
pub mod stepped_fft;
pub mod stepped_iq;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::calibration::store::{CalibrationKey, CalibrationStore};
use crate::prelude::{Action, ProcessingError, ProcessingResult};
use crate::sensor::capture::Capture;
use crate::sensor::hardware::{SiganSettings, SignalAnalyzer};
use crate::sensor::measurement::{MeasurementPayload, MeasurementResult};

pub use calibrate::{YFactorCalibration, YFactorParams};
pub use data_product::{SeaDataProductAction, SeaDataProductParams};
pub use params::OneOrMany;
pub use stepped_fft::{SteppedFftAction, SteppedFftParams};
pub use stepped_iq::{SteppedIqAction, SteppedIqParams};

/// Wait after switching the RF path before acquiring.
pub const DEFAULT_SETTLE_TIME: Duration = Duration::from_secs(1);

/// One entry of a schedule file, tagged by `action`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionConfig {
    SeaDataProduct(SeaDataProductParams),
    SteppedFft(SteppedFftParams),
    SteppedIq(SteppedIqParams),
    YFactorCalibration(YFactorParams),
}

impl ActionConfig {
    pub fn name(&self) -> &str {
        match self {
            ActionConfig::SeaDataProduct(params) => &params.name,
            ActionConfig::SteppedFft(params) => &params.name,
            ActionConfig::SteppedIq(params) => &params.name,
            ActionConfig::YFactorCalibration(params) => &params.name,
        }
    }

    /// Validates the parameters and precomputes filters and windows.
    pub fn build(&self) -> ProcessingResult<Box<dyn Action>> {
        self.build_with_settle_time(DEFAULT_SETTLE_TIME)
    }

    /// As [`ActionConfig::build`], with the RF-path settle time overridden.
    pub fn build_with_settle_time(&self, settle_time: Duration) -> ProcessingResult<Box<dyn Action>> {
        let action: Box<dyn Action> = match self {
            ActionConfig::SeaDataProduct(params) => {
                Box::new(SeaDataProductAction::new(params.clone())?)
            }
            ActionConfig::SteppedFft(params) => Box::new(SteppedFftAction::new(params.clone())?),
            ActionConfig::SteppedIq(params) => Box::new(SteppedIqAction::new(params.clone())?),
            ActionConfig::YFactorCalibration(params) => {
                Box::new(YFactorCalibration::new(params.clone())?.with_settle_time(settle_time))
            }
        };
        Ok(action)
    }
}

/// Fails fast when the analyzer cannot take a capture.
pub fn ensure_available(sigan: &dyn SignalAnalyzer) -> ProcessingResult<()> {
    if sigan.is_available() {
        Ok(())
    } else {
        Err(ProcessingError::HardwareUnavailable(
            "acquisition failed: signal analyzer is not available".into(),
        ))
    }
}

/// Blocks while the RF path settles.
pub fn settle(duration: Duration) {
    if !duration.is_zero() {
        std::thread::sleep(duration);
    }
}

pub(crate) fn measurement_result(
    action: &str,
    task_id: u64,
    recording_id: usize,
    settings: SiganSettings,
    capture: &Capture,
    payload: MeasurementPayload,
    calibration: &dyn CalibrationStore,
) -> MeasurementResult {
    let key = CalibrationKey::from_settings(&settings);
    MeasurementResult {
        task_id,
        recording_id,
        action: action.to_string(),
        settings,
        capture_time: capture.capture_time,
        end_time: Utc::now(),
        overload: capture.overload,
        payload,
        sensor_calibration: calibration.lookup(&key),
        last_calibration_time: calibration.last_calibration_time(),
    }
}

pub(crate) fn describe_frequencies(frequencies: &[f64]) -> String {
    frequencies
        .iter()
        .map(|frequency| format!("{:.2} MHz", frequency / 1e6))
        .collect::<Vec<_>>()
        .join(", ")
}


#[cfg(test)]
mod tests {
    use super::testing::MockSigan;
    use super::*;

    #[test]
    fn schedule_entries_parse_by_tag() {
        let entry = r#"{
            "action": "stepped_iq",
            "name": "iq_sweep",
            "frequency": [710e6, 700e6],
            "sample_rate": 1e6,
            "duration_ms": 1.0
        }"#;
        let config: ActionConfig = serde_json::from_str(entry).unwrap();
        assert_eq!(config.name(), "iq_sweep");
        let action = config.build().unwrap();
        assert_eq!(action.name(), "iq_sweep");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let entry = r#"{
            "action": "stepped_iq",
            "name": "iq_sweep",
            "frequency": 700e6,
            "sample_rate": 1e6,
            "duration_ms": 1.0,
            "bogus": 3
        }"#;
        assert!(serde_json::from_str::<ActionConfig>(entry).is_err());
    }

    #[test]
    fn unavailable_analyzer_fails_fast() {
        let mut sigan = MockSigan::new();
        assert!(ensure_available(&sigan).is_ok());
        sigan.available = false;
        assert!(matches!(
            ensure_available(&sigan),
            Err(ProcessingError::HardwareUnavailable(_))
        ));
    }
}
