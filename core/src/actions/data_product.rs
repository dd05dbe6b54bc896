//! Single- or stepped-frequency data-product acquisition.

use serde::{Deserialize, Serialize};

use crate::actions::params::{
    samples_for_duration, step_count, value_at, OneOrMany, SiganSweep,
};
use crate::actions::{describe_frequencies, ensure_available, measurement_result};
use crate::math::window::WindowType;
use crate::prelude::{Action, ActionOutput, ProcessingResult, SensorContext};
use crate::processing::data_product::{DataProductAssembler, ProductParams};
use crate::processing::filter::FilterSpec;
use crate::processing::td_power::QuantileFilter;
use crate::sensor::hardware::{AcquisitionRequest, RfPath};
use crate::sensor::measurement::MeasurementPayload;
use crate::telemetry::log::LogManager;

fn default_nskip() -> OneOrMany<usize> {
    OneOrMany::One(0)
}

fn default_true() -> OneOrMany<bool> {
    OneOrMany::One(true)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeaDataProductParams {
    pub name: String,
    pub frequency: OneOrMany<f64>,
    pub sample_rate: f64,
    pub duration_ms: OneOrMany<f64>,
    #[serde(default = "default_nskip")]
    pub nskip: OneOrMany<usize>,
    #[serde(default)]
    pub gain: Option<OneOrMany<f64>>,
    #[serde(default)]
    pub attenuation: Option<OneOrMany<f64>>,
    #[serde(default)]
    pub reference_level: Option<OneOrMany<f64>>,
    #[serde(default)]
    pub preamp_enable: Option<OneOrMany<bool>>,
    #[serde(default = "default_true")]
    pub cal_adjust: OneOrMany<bool>,
    pub iir_apply: OneOrMany<bool>,
    #[serde(rename = "iir_rp_dB")]
    pub iir_rp_db: f64,
    #[serde(rename = "iir_rs_dB")]
    pub iir_rs_db: f64,
    #[serde(rename = "iir_cutoff_Hz")]
    pub iir_cutoff_hz: f64,
    #[serde(rename = "iir_width_Hz")]
    pub iir_width_hz: f64,
    pub qfilt_apply: OneOrMany<bool>,
    pub qfilt_qlo: f64,
    pub qfilt_qhi: f64,
    pub fft_size: usize,
    pub nffts: OneOrMany<usize>,
    #[serde(default)]
    pub fft_window_type: WindowType,
    #[serde(rename = "apd_bin_size_dB")]
    pub apd_bin_size_db: OneOrMany<f64>,
    pub td_bin_size_ms: OneOrMany<f64>,
    pub round_to_places: OneOrMany<i32>,
}

impl SeaDataProductParams {
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

    fn filter_spec(&self) -> FilterSpec {
        FilterSpec {
            passband_ripple_db: self.iir_rp_db,
            stopband_attenuation_db: self.iir_rs_db,
            cutoff_hz: self.iir_cutoff_hz,
            transition_width_hz: self.iir_width_hz,
        }
    }

    fn steps(&self) -> ProcessingResult<usize> {
        let mut lengths = self.sweep().lengths();
        lengths.extend([
            ("duration_ms", self.duration_ms.list_len()),
            ("nskip", self.nskip.list_len()),
            ("cal_adjust", self.cal_adjust.list_len()),
            ("iir_apply", self.iir_apply.list_len()),
            ("qfilt_apply", self.qfilt_apply.list_len()),
            ("nffts", self.nffts.list_len()),
            ("apd_bin_size_dB", self.apd_bin_size_db.list_len()),
            ("td_bin_size_ms", self.td_bin_size_ms.list_len()),
            ("round_to_places", self.round_to_places.list_len()),
        ]);
        step_count(&lengths)
    }

    fn product_params(&self, step: usize, quantile_filter: QuantileFilter) -> ProcessingResult<ProductParams> {
        let qfilt_apply = value_at("qfilt_apply", &self.qfilt_apply, step)?;
        Ok(ProductParams {
            iir_apply: value_at("iir_apply", &self.iir_apply, step)?,
            quantile_filter: qfilt_apply.then_some(quantile_filter),
            num_ffts: value_at("nffts", &self.nffts, step)?,
            td_bin_size_ms: value_at("td_bin_size_ms", &self.td_bin_size_ms, step)?,
            apd_bin_size_db: value_at("apd_bin_size_dB", &self.apd_bin_size_db, step)?,
            round_to_places: value_at("round_to_places", &self.round_to_places, step)?,
        })
    }
}

/// Captures IQ at each configured frequency and reduces every capture to a
/// data product before moving on to the next frequency.
pub struct SeaDataProductAction {
    params: SeaDataProductParams,
    steps: usize,
    quantile_filter: QuantileFilter,
    assembler: DataProductAssembler,
    logger: LogManager,
}

impl SeaDataProductAction {
    pub fn new(params: SeaDataProductParams) -> ProcessingResult<Self> {
        let steps = params.steps()?;
        let quantile_filter = QuantileFilter::new(params.qfilt_qlo, params.qfilt_qhi)?;
        let assembler = DataProductAssembler::new(
            params.fft_size,
            params.fft_window_type,
            &params.filter_spec(),
            params.sample_rate,
        )?;
        let logger = LogManager::new(params.name.clone());
        Ok(Self {
            params,
            steps,
            quantile_filter,
            assembler,
            logger,
        })
    }

    pub fn steps(&self) -> usize {
        self.steps
    }
}

impl Action for SeaDataProductAction {
    fn name(&self) -> &str {
        &self.params.name
    }

    fn summary(&self) -> String {
        let frequencies: Vec<f64> = (0..self.steps)
            .filter_map(|step| self.params.frequency.at(step))
            .collect();
        format!(
            "Data products at {} frequencies: {}; {}-point {:?} FFT, IIR low-pass {} Hz / {} Hz",
            self.steps,
            describe_frequencies(&frequencies),
            self.params.fft_size,
            self.params.fft_window_type,
            self.params.iir_cutoff_hz,
            self.params.iir_cutoff_hz + self.params.iir_width_hz
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
            let product_params = self.params.product_params(step, self.quantile_filter)?;
            let duration_ms = value_at("duration_ms", &self.params.duration_ms, step)?;
            let nskip = value_at("nskip", &self.params.nskip, step)?;
            let cal_adjust = value_at("cal_adjust", &self.params.cal_adjust, step)?;

            sensor.sigan.configure(&settings)?;
            let num_samples = samples_for_duration(duration_ms, sensor.sigan.sample_rate())?;
            let capture = self.logger.timed("capture", || {
                sensor
                    .sigan
                    .acquire_time_domain_samples(&AcquisitionRequest::new(num_samples, nskip, cal_adjust))
            })?;
            self.logger.debug(&format!(
                "captured {} samples ({:.2} ms) at {:.2} MHz",
                capture.len(),
                capture.duration_ms(),
                settings.frequency_hz / 1e6
            ));

            let product =
                self.assembler
                    .assemble(&capture.data, capture.sample_rate_hz, &product_params)?;
            results.push(measurement_result(
                &self.params.name,
                task_id,
                step + 1,
                settings,
                &capture,
                MeasurementPayload::DataProduct(product),
                sensor.calibration,
            ));
        }
        self.logger
            .record(&format!("generated {} data product(s)", results.len()));
        Ok(ActionOutput::Measurements(results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::testing::{MockPreselector, MockSigan};
    use crate::calibration::store::{
        CalibrationKey, CalibrationRecord, CalibrationStore, JsonCalibrationStore,
    };
    use crate::processing::data_product::ProductComponent;
    use chrono::Utc;

    fn params() -> SeaDataProductParams {
        SeaDataProductParams {
            name: "sea_test".into(),
            frequency: OneOrMany::Many(vec![3.55e9, 3.56e9]),
            sample_rate: 1e6,
            duration_ms: OneOrMany::One(10.0),
            nskip: OneOrMany::One(0),
            gain: None,
            attenuation: Some(OneOrMany::One(0.0)),
            reference_level: Some(OneOrMany::One(-25.0)),
            preamp_enable: Some(OneOrMany::One(true)),
            cal_adjust: OneOrMany::One(true),
            iir_apply: OneOrMany::Many(vec![true, false]),
            iir_rp_db: 0.1,
            iir_rs_db: 40.0,
            iir_cutoff_hz: 200e3,
            iir_width_hz: 50e3,
            qfilt_apply: OneOrMany::One(true),
            qfilt_qlo: 0.0,
            qfilt_qhi: 1.0,
            fft_size: 128,
            nffts: OneOrMany::One(10),
            fft_window_type: WindowType::FlatTop,
            apd_bin_size_db: OneOrMany::One(0.5),
            td_bin_size_ms: OneOrMany::One(1.0),
            round_to_places: OneOrMany::One(2),
        }
    }

    #[test]
    fn produces_one_product_per_frequency() {
        let mut action = SeaDataProductAction::new(params()).unwrap();
        assert_eq!(action.steps(), 2);
        assert!(action.summary().contains("3550.00 MHz, 3560.00 MHz"));

        let mut sigan = MockSigan::new();
        let mut preselector = MockPreselector::new();
        let store = JsonCalibrationStore::in_memory();
        let calibrated = params().sweep().settings(0).unwrap();
        store
            .persist(
                CalibrationKey::from_settings(&calibrated),
                CalibrationRecord {
                    gain_db: 30.0,
                    noise_figure_db: 5.0,
                    enbw_hz: None,
                    temperature_c: 20.0,
                    datetime: Utc::now(),
                },
            )
            .unwrap();

        let mut sensor = SensorContext {
            sigan: &mut sigan,
            preselector: &mut preselector,
            calibration: &store,
        };
        let output = action.execute(&mut sensor, 7).unwrap();
        let ActionOutput::Measurements(results) = output else {
            panic!("expected measurements");
        };
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].recording_id, 2);
        assert_eq!(results[1].frequency_hz(), 3.56e9);
        assert!(results[0].sensor_calibration.is_some());
        assert!(results[1].sensor_calibration.is_none());
        assert!(results[1].last_calibration_time.is_some());
        match &results[0].payload {
            MeasurementPayload::DataProduct(product) => {
                assert_eq!(product.get(ProductComponent::FftMeanPower).len(), 128);
                assert_eq!(product.get(ProductComponent::TdMaxPower).len(), 10);
            }
            other => panic!("unexpected payload {:?}", other),
        }
        assert_eq!(sigan.requests[0].num_samples, 10_000);
        assert_eq!(preselector.paths, vec![RfPath::Antenna]);
    }

    #[test]
    fn mismatched_list_lengths_are_rejected() {
        let mut bad = params();
        bad.nffts = OneOrMany::Many(vec![10, 10, 10]);
        assert!(SeaDataProductAction::new(bad).is_err());
    }
}
