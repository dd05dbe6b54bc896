//! Stepped-frequency FFT acquisition reduced with the min/max/mean/median/
//! sample detector.

use serde::{Deserialize, Serialize};

use crate::actions::params::{step_count, value_at, OneOrMany, SiganSweep};
use crate::actions::{describe_frequencies, ensure_available, measurement_result};
use crate::math::window::WindowType;
use crate::prelude::{Action, ActionOutput, ProcessingError, ProcessingResult, SensorContext};
use crate::processing::detector::{PowerDetector, Statistic};
use crate::processing::spectrum::{SpectralEstimator, SpectrumScaling};
use crate::sensor::hardware::{AcquisitionRequest, RfPath};
use crate::sensor::measurement::MeasurementPayload;
use crate::telemetry::log::LogManager;

const M4S_STATISTICS: [Statistic; 5] = [
    Statistic::Min,
    Statistic::Max,
    Statistic::Mean,
    Statistic::Median,
    Statistic::Sample,
];

fn default_nskip() -> OneOrMany<usize> {
    OneOrMany::One(0)
}

fn default_true() -> OneOrMany<bool> {
    OneOrMany::One(true)
}

fn default_window() -> WindowType {
    WindowType::FlatTop
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SteppedFftParams {
    pub name: String,
    pub frequency: OneOrMany<f64>,
    pub sample_rate: f64,
    pub fft_size: usize,
    pub nffts: OneOrMany<usize>,
    #[serde(default = "default_nskip")]
    pub nskip: OneOrMany<usize>,
    #[serde(default = "default_true")]
    pub cal_adjust: OneOrMany<bool>,
    #[serde(default = "default_window")]
    pub fft_window_type: WindowType,
    #[serde(default)]
    pub gain: Option<OneOrMany<f64>>,
    #[serde(default)]
    pub attenuation: Option<OneOrMany<f64>>,
    #[serde(default)]
    pub reference_level: Option<OneOrMany<f64>>,
    #[serde(default)]
    pub preamp_enable: Option<OneOrMany<bool>>,
}

impl SteppedFftParams {
    fn sweep(&self) -> SiganSweep<'_> {
        SiganSweep {
            frequency: &self.frequency,
            sample_rate: self.sample_rate,
            gain: &self.gain,
            attenuation: &self.attenuation,
            reference_level: &self.reference_level,
            preamp_enable: &self.preamp_enable,
        }
    }
}

/// Per-bin M4S spectra (dBm per bin) at each configured frequency.
pub struct SteppedFftAction {
    params: SteppedFftParams,
    steps: usize,
    estimator: SpectralEstimator,
    logger: LogManager,
}

impl SteppedFftAction {
    pub fn new(params: SteppedFftParams) -> ProcessingResult<Self> {
        let mut lengths = params.sweep().lengths();
        lengths.extend([
            ("nffts", params.nffts.list_len()),
            ("nskip", params.nskip.list_len()),
            ("cal_adjust", params.cal_adjust.list_len()),
        ]);
        let steps = step_count(&lengths)?;
        let estimator = SpectralEstimator::with_detector(
            params.fft_size,
            params.fft_window_type,
            PowerDetector::new("m4s", &M4S_STATISTICS),
            SpectrumScaling::BinPower,
        )?;
        let logger = LogManager::new(params.name.clone());
        Ok(Self {
            params,
            steps,
            estimator,
            logger,
        })
    }
}

impl Action for SteppedFftAction {
    fn name(&self) -> &str {
        &self.params.name
    }

    fn summary(&self) -> String {
        let frequencies: Vec<f64> = (0..self.steps)
            .filter_map(|step| self.params.frequency.at(step))
            .collect();
        format!(
            "M4S spectra of {}-point {:?} FFTs at {}",
            self.params.fft_size,
            self.params.fft_window_type,
            describe_frequencies(&frequencies)
        )
    }

    fn execute(
        &mut self,
        sensor: &mut SensorContext<'_>,
        task_id: u64,
    ) -> ProcessingResult<ActionOutput> {
        ensure_available(&*sensor.sigan)?;
        sensor.preselector.set_rf_path(RfPath::Antenna)?;

        let mut results = Vec::with_capacity(self.steps);
        for step in 0..self.steps {
            let settings = self.params.sweep().settings(step)?;
            let nffts = value_at("nffts", &self.params.nffts, step)?;
            let nskip = value_at("nskip", &self.params.nskip, step)?;
            let cal_adjust = value_at("cal_adjust", &self.params.cal_adjust, step)?;

            sensor.sigan.configure(&settings)?;
            let num_samples = nffts.checked_mul(self.params.fft_size).ok_or_else(|| {
                ProcessingError::InvalidParameter(format!(
                    "{} FFTs of {} points overflow the sample count",
                    nffts, self.params.fft_size
                ))
            })?;
            let capture = sensor
                .sigan
                .acquire_time_domain_samples(&AcquisitionRequest::new(num_samples, nskip, cal_adjust))?;
            let spectra = self.logger.timed("m4s", || {
                self.estimator
                    .estimate_all(&capture.data, nffts, capture.sample_rate_hz)
            })?;

            let payload = MeasurementPayload::FrequencyDomain {
                statistics: M4S_STATISTICS.to_vec(),
                spectra: spectra
                    .into_iter()
                    .map(|spectrum| spectrum.iter().map(|&value| value as f32).collect())
                    .collect(),
            };
            results.push(measurement_result(
                &self.params.name,
                task_id,
                step + 1,
                settings,
                &capture,
                payload,
                sensor.calibration,
            ));
        }
        Ok(ActionOutput::Measurements(results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::testing::{MockPreselector, MockSigan};
    use crate::calibration::store::JsonCalibrationStore;

    #[test]
    fn five_spectra_per_frequency() {
        let params: SteppedFftParams = serde_json::from_str(
            r#"{
                "name": "m4s_sweep",
                "frequency": [700e6, 710e6, 720e6],
                "sample_rate": 1e6,
                "fft_size": 64,
                "nffts": 20
            }"#,
        )
        .unwrap();
        let mut action = SteppedFftAction::new(params).unwrap();
        let mut sigan = MockSigan::new();
        let mut preselector = MockPreselector::new();
        let store = JsonCalibrationStore::in_memory();
        let mut sensor = SensorContext {
            sigan: &mut sigan,
            preselector: &mut preselector,
            calibration: &store,
        };

        let ActionOutput::Measurements(results) = action.execute(&mut sensor, 1).unwrap() else {
            panic!("expected measurements");
        };
        assert_eq!(results.len(), 3);
        match &results[2].payload {
            MeasurementPayload::FrequencyDomain { statistics, spectra } => {
                assert_eq!(statistics[0], Statistic::Min);
                assert_eq!(spectra.len(), 5);
                assert!(spectra.iter().all(|spectrum| spectrum.len() == 64));
                for bin in 0..64 {
                    assert!(spectra[0][bin] <= spectra[1][bin]);
                }
            }
            other => panic!("unexpected payload {:?}", other),
        }
        assert_eq!(sigan.requests[0].num_samples, 1280);
    }
}
