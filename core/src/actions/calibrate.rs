//! Y-factor calibration against the preselector's noise diode.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::actions::params::{samples_for_duration, step_count, value_at, OneOrMany, SiganSweep};
use crate::actions::{describe_frequencies, ensure_available, settle, DEFAULT_SETTLE_TIME};
use crate::calibration::store::{CalibrationKey, CalibrationRecord, CalibrationStore};
use crate::calibration::yfactor::{mean_power_watts, y_factor};
use crate::calibration::CalibrationReport;
use crate::math::units::{celsius_to_kelvin, db_to_linear};
use crate::prelude::{Action, ActionOutput, ProcessingError, ProcessingResult, SensorContext};
use crate::processing::filter::{FilterSpec, SosFilter};
use crate::sensor::hardware::{AcquisitionRequest, RfPath};
use crate::telemetry::log::LogManager;

fn default_nskip() -> OneOrMany<usize> {
    OneOrMany::One(0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct YFactorParams {
    pub name: String,
    pub frequency: OneOrMany<f64>,
    pub sample_rate: f64,
    pub duration_ms: OneOrMany<f64>,
    #[serde(default = "default_nskip")]
    pub nskip: OneOrMany<usize>,
    pub cal_source_idx: OneOrMany<usize>,
    pub temp_sensor_idx: OneOrMany<usize>,
    /// A single filter design applies to every step.
    #[serde(default)]
    pub iir_apply: bool,
    #[serde(default, rename = "iir_rp_dB")]
    pub iir_rp_db: Option<f64>,
    #[serde(default, rename = "iir_rs_dB")]
    pub iir_rs_db: Option<f64>,
    #[serde(default, rename = "iir_cutoff_Hz")]
    pub iir_cutoff_hz: Option<f64>,
    #[serde(default, rename = "iir_width_Hz")]
    pub iir_width_hz: Option<f64>,
    #[serde(default)]
    pub gain: Option<OneOrMany<f64>>,
    #[serde(default)]
    pub attenuation: Option<OneOrMany<f64>>,
    #[serde(default)]
    pub reference_level: Option<OneOrMany<f64>>,
    #[serde(default)]
    pub preamp_enable: Option<OneOrMany<bool>>,
}

impl YFactorParams {
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

    fn filter_spec(&self) -> ProcessingResult<Option<FilterSpec>> {
        if !self.iir_apply {
            return Ok(None);
        }
        let required = |name: &str, value: Option<f64>| {
            value.ok_or_else(|| {
                ProcessingError::InvalidParameter(format!("iir_apply requires '{}'", name))
            })
        };
        Ok(Some(FilterSpec {
            passband_ripple_db: required("iir_rp_dB", self.iir_rp_db)?,
            stopband_attenuation_db: required("iir_rs_dB", self.iir_rs_db)?,
            cutoff_hz: required("iir_cutoff_Hz", self.iir_cutoff_hz)?,
            transition_width_hz: required("iir_width_Hz", self.iir_width_hz)?,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CalibrationPhase {
    Configure,
    NoiseDiodeOn,
    AcquireOn,
    NoiseDiodeOff,
    AcquireOff,
    Filter,
    Compute,
    Persist,
}

/// Single- or stepped-frequency Y-factor calibration. Each step updates the
/// stored record for its analyzer configuration.
pub struct YFactorCalibration {
    params: YFactorParams,
    steps: usize,
    filter: Option<(FilterSpec, SosFilter)>,
    settle_time: Duration,
    logger: LogManager,
}

impl YFactorCalibration {
    pub fn new(params: YFactorParams) -> ProcessingResult<Self> {
        let mut lengths = params.sweep().lengths();
        lengths.extend([
            ("duration_ms", params.duration_ms.list_len()),
            ("nskip", params.nskip.list_len()),
            ("cal_source_idx", params.cal_source_idx.list_len()),
            ("temp_sensor_idx", params.temp_sensor_idx.list_len()),
        ]);
        let steps = step_count(&lengths)?;
        let logger = LogManager::new(params.name.clone());

        let filter = match params.filter_spec()? {
            Some(spec) => {
                let designed = SosFilter::design_elliptic_lowpass(&spec, params.sample_rate)?;
                Some((spec, designed))
            }
            None => {
                logger.record("iir_apply not set; calibrating without IIR filtering");
                None
            }
        };

        Ok(Self {
            params,
            steps,
            filter,
            settle_time: DEFAULT_SETTLE_TIME,
            logger,
        })
    }

    /// Overrides the wait after each noise-diode switch.
    pub fn with_settle_time(mut self, settle_time: Duration) -> Self {
        self.settle_time = settle_time;
        self
    }

    fn enter(&self, phase: CalibrationPhase, frequency_hz: f64) {
        self.logger
            .debug(&format!("{:?} at {:.2} MHz", phase, frequency_hz / 1e6));
    }

    /// Stored sensor ENBW for `key`. Unfiltered calibration has no other
    /// source for it.
    fn stored_enbw(&self, store: &dyn CalibrationStore, key: &CalibrationKey) -> ProcessingResult<f64> {
        store
            .lookup(key)
            .and_then(|record| record.enbw_hz)
            .filter(|enbw_hz| enbw_hz.is_finite() && *enbw_hz > 0.0)
            .ok_or_else(|| {
                ProcessingError::InvalidParameter(format!(
                    "no stored sensor ENBW for {:.2} MHz; set iir_apply or calibrate the ENBW first",
                    key.frequency_hz / 1e6
                ))
            })
    }

    fn calibrate(&self, sensor: &mut SensorContext<'_>, step: usize) -> ProcessingResult<CalibrationReport> {
        let settings = self.params.sweep().settings(step)?;
        let frequency_hz = settings.frequency_hz;
        let duration_ms = value_at("duration_ms", &self.params.duration_ms, step)?;
        let nskip = value_at("nskip", &self.params.nskip, step)?;
        let cal_source_idx = value_at("cal_source_idx", &self.params.cal_source_idx, step)?;
        let temp_sensor_idx = value_at("temp_sensor_idx", &self.params.temp_sensor_idx, step)?;
        let key = CalibrationKey::from_settings(&settings);

        self.enter(CalibrationPhase::Configure, frequency_hz);
        sensor.sigan.configure(&settings)?;
        let num_samples = samples_for_duration(duration_ms, settings.sample_rate_hz)?;
        let request = AcquisitionRequest::new(num_samples, nskip, false);

        self.enter(CalibrationPhase::NoiseDiodeOn, frequency_hz);
        sensor.preselector.set_rf_path(RfPath::NoiseDiodeOn)?;
        settle(self.settle_time);
        self.enter(CalibrationPhase::AcquireOn, frequency_hz);
        let on = sensor.sigan.acquire_time_domain_samples(&request)?;

        self.enter(CalibrationPhase::NoiseDiodeOff, frequency_hz);
        sensor.preselector.set_rf_path(RfPath::NoiseDiodeOff)?;
        settle(self.settle_time);
        self.enter(CalibrationPhase::AcquireOff, frequency_hz);
        let off = sensor.sigan.acquire_time_domain_samples(&request)?;

        if on.sample_rate_hz != off.sample_rate_hz {
            return Err(ProcessingError::SampleRateMismatch {
                on: on.sample_rate_hz,
                off: off.sample_rate_hz,
            });
        }
        let sample_rate_hz = on.sample_rate_hz;

        let (on_data, off_data, enbw_hz) = match &self.filter {
            Some((spec, filter)) => {
                if filter.sample_rate_hz() != sample_rate_hz {
                    return Err(ProcessingError::InvalidParameter(format!(
                        "filter designed for {} Hz but captures are at {} Hz",
                        filter.sample_rate_hz(),
                        sample_rate_hz
                    )));
                }
                self.enter(CalibrationPhase::Filter, frequency_hz);
                (
                    filter.apply(&on.data),
                    filter.apply(&off.data),
                    spec.approximate_enbw_hz(),
                )
            }
            None => {
                let enbw_hz = self.stored_enbw(sensor.calibration, &key)?;
                (on.data, off.data, enbw_hz)
            }
        };

        self.enter(CalibrationPhase::Compute, frequency_hz);
        let power_on_w = mean_power_watts(&on_data)?;
        let power_off_w = mean_power_watts(&off_data)?;
        let enr_linear = db_to_linear(sensor.preselector.noise_source_enr_db(cal_source_idx)?);
        let temperature_c = sensor.preselector.temperature_c(temp_sensor_idx)?;
        let result = y_factor(
            power_on_w,
            power_off_w,
            enr_linear,
            enbw_hz,
            celsius_to_kelvin(temperature_c),
        )?;
        self.logger.debug(&format!(
            "noise floor {:.2} dBm, noise figure {:.2} dB, gain {:.2} dB",
            result.noise_floor_dbm, result.noise_figure_db, result.gain_db
        ));

        self.enter(CalibrationPhase::Persist, frequency_hz);
        let enbw_record = sensor
            .calibration
            .lookup(&key)
            .and_then(|record| record.enbw_hz);
        sensor.calibration.persist(
            key,
            CalibrationRecord {
                gain_db: result.gain_db,
                noise_figure_db: result.noise_figure_db,
                enbw_hz: enbw_record,
                temperature_c,
                datetime: Utc::now(),
            },
        )?;

        Ok(CalibrationReport {
            frequency_hz,
            y_factor: result.y_factor,
            noise_figure_db: result.noise_figure_db,
            gain_db: result.gain_db,
            enbw_hz,
            temperature_c,
            noise_floor_dbm: result.noise_floor_dbm,
        })
    }
}

impl Action for YFactorCalibration {
    fn name(&self) -> &str {
        &self.params.name
    }

    fn summary(&self) -> String {
        let frequencies: Vec<f64> = (0..self.steps)
            .filter_map(|step| self.params.frequency.at(step))
            .collect();
        let filtering = match &self.filter {
            Some((spec, filter)) => format!(
                "order-{} elliptic low-pass, stopband edge {} Hz",
                filter.order(),
                spec.stopband_edge_hz()
            ),
            None => "no filtering".to_string(),
        };
        format!(
            "Y-factor calibration at {} ({})",
            describe_frequencies(&frequencies),
            filtering
        )
    }

    fn execute(
        &mut self,
        sensor: &mut SensorContext<'_>,
        _task_id: u64,
    ) -> ProcessingResult<ActionOutput> {
        ensure_available(&*sensor.sigan)?;
        let outcome = (0..self.steps)
            .map(|step| self.calibrate(sensor, step))
            .collect::<ProcessingResult<Vec<_>>>();
        let restored = sensor.preselector.set_rf_path(RfPath::Antenna);
        let reports = outcome?;
        restored?;
        Ok(ActionOutput::Calibration(reports))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::testing::{MockPreselector, MockSigan};
    use crate::calibration::store::JsonCalibrationStore;

    fn params() -> YFactorParams {
        YFactorParams {
            name: "y_factor_cal".into(),
            frequency: OneOrMany::Many(vec![3.55e9, 3.6e9]),
            sample_rate: 1e6,
            duration_ms: OneOrMany::One(2.0),
            nskip: OneOrMany::One(0),
            cal_source_idx: OneOrMany::One(0),
            temp_sensor_idx: OneOrMany::One(1),
            iir_apply: false,
            iir_rp_db: None,
            iir_rs_db: None,
            iir_cutoff_hz: None,
            iir_width_hz: None,
            gain: None,
            attenuation: Some(OneOrMany::One(0.0)),
            reference_level: None,
            preamp_enable: Some(OneOrMany::One(true)),
        }
    }

    fn seed_enbw(store: &JsonCalibrationStore, params: &YFactorParams, enbw_hz: f64) {
        for step in 0..2 {
            let settings = params.sweep().settings(step).unwrap();
            store
                .persist(
                    CalibrationKey::from_settings(&settings),
                    CalibrationRecord {
                        gain_db: 0.0,
                        noise_figure_db: 0.0,
                        enbw_hz: Some(enbw_hz),
                        temperature_c: 20.0,
                        datetime: Utc::now(),
                    },
                )
                .unwrap();
        }
    }

    fn run(
        action: &mut YFactorCalibration,
        sigan: &mut MockSigan,
        preselector: &mut MockPreselector,
        store: &JsonCalibrationStore,
    ) -> ProcessingResult<ActionOutput> {
        let mut sensor = SensorContext {
            sigan,
            preselector,
            calibration: store,
        };
        action.execute(&mut sensor, 11)
    }

    #[test]
    fn doubled_power_gives_ten_db_noise_figure() {
        let store = JsonCalibrationStore::in_memory();
        seed_enbw(&store, &params(), 1e6);
        let mut action = YFactorCalibration::new(params())
            .unwrap()
            .with_settle_time(Duration::ZERO);
        let mut sigan = MockSigan::new();
        sigan.amplitudes = vec![0.02 * 2f64.sqrt(), 0.02, 0.02 * 2f64.sqrt(), 0.02];
        let mut preselector = MockPreselector::new();

        let output = run(&mut action, &mut sigan, &mut preselector, &store).unwrap();
        assert!(output.detail().starts_with("Noise Figure: "));
        let ActionOutput::Calibration(reports) = output else {
            panic!("expected calibration reports");
        };
        assert_eq!(reports.len(), 2);
        // (0.02 * sqrt(2) / 2)^2 / 50 ohm
        let expected = y_factor(4e-6, 2e-6, 10.0, 1e6, 290.0).unwrap();
        for report in &reports {
            assert!((report.y_factor - 2.0).abs() < 1e-9);
            assert!((report.noise_figure_db - 10.0).abs() < 1e-6);
            assert!((report.gain_db - expected.gain_db).abs() < 1e-6);
            assert_eq!(report.enbw_hz, 1e6);
        }
        assert_eq!(reports[1].frequency_hz, 3.6e9);
        let first = &reports[0];

        let settings = params().sweep().settings(0).unwrap();
        let stored = store.lookup(&CalibrationKey::from_settings(&settings)).unwrap();
        assert_eq!(stored.gain_db, first.gain_db);
        assert_eq!(stored.enbw_hz, Some(1e6));
        assert_eq!(
            preselector.paths,
            vec![
                RfPath::NoiseDiodeOn,
                RfPath::NoiseDiodeOff,
                RfPath::NoiseDiodeOn,
                RfPath::NoiseDiodeOff,
                RfPath::Antenna
            ]
        );
        assert!(sigan.requests.iter().all(|request| !request.cal_adjust));
    }

    #[test]
    fn filtered_calibration_uses_filter_bandwidth() {
        let mut filtered = params();
        filtered.frequency = OneOrMany::One(3.55e9);
        filtered.iir_apply = true;
        filtered.iir_rp_db = Some(0.1);
        filtered.iir_rs_db = Some(40.0);
        filtered.iir_cutoff_hz = Some(200e3);
        filtered.iir_width_hz = Some(50e3);
        let mut action = YFactorCalibration::new(filtered)
            .unwrap()
            .with_settle_time(Duration::ZERO);
        let store = JsonCalibrationStore::in_memory();
        let mut sigan = MockSigan::new();
        sigan.amplitudes = vec![0.02 * 2f64.sqrt(), 0.02];
        let mut preselector = MockPreselector::new();

        let ActionOutput::Calibration(reports) =
            run(&mut action, &mut sigan, &mut preselector, &store).unwrap()
        else {
            panic!("expected calibration reports");
        };
        assert_eq!(reports[0].enbw_hz, 500e3);
        assert!((reports[0].noise_figure_db - 10.0).abs() < 1e-6);
        assert!(action.summary().contains("elliptic low-pass"));
    }

    #[test]
    fn sample_rate_mismatch_restores_antenna_path() {
        let store = JsonCalibrationStore::in_memory();
        let mut action = YFactorCalibration::new(params())
            .unwrap()
            .with_settle_time(Duration::ZERO);
        let mut sigan = MockSigan::new();
        sigan.reported_rates = vec![1e6, 2e6];
        let mut preselector = MockPreselector::new();

        let outcome = run(&mut action, &mut sigan, &mut preselector, &store);
        assert!(matches!(
            outcome,
            Err(ProcessingError::SampleRateMismatch { on, off }) if on == 1e6 && off == 2e6
        ));
        assert_eq!(preselector.paths.last(), Some(&RfPath::Antenna));
    }

    #[test]
    fn equal_powers_are_degenerate() {
        let store = JsonCalibrationStore::in_memory();
        seed_enbw(&store, &params(), 1e6);
        let mut action = YFactorCalibration::new(params())
            .unwrap()
            .with_settle_time(Duration::ZERO);
        let mut sigan = MockSigan::new();
        sigan.amplitudes = vec![0.02];
        let mut preselector = MockPreselector::new();
        assert!(matches!(
            run(&mut action, &mut sigan, &mut preselector, &store),
            Err(ProcessingError::DegenerateYFactor(_))
        ));
    }

    #[test]
    fn unfiltered_calibration_needs_stored_enbw() {
        let store = JsonCalibrationStore::in_memory();
        let mut action = YFactorCalibration::new(params())
            .unwrap()
            .with_settle_time(Duration::ZERO);
        let mut sigan = MockSigan::new();
        sigan.amplitudes = vec![0.02 * 2f64.sqrt(), 0.02];
        let mut preselector = MockPreselector::new();

        assert!(matches!(
            run(&mut action, &mut sigan, &mut preselector, &store),
            Err(ProcessingError::InvalidParameter(message)) if message.contains("ENBW")
        ));
        assert!(store.snapshot().unwrap().is_empty());
        assert_eq!(preselector.paths.last(), Some(&RfPath::Antenna));
    }

    #[test]
    fn filter_parameters_are_required_when_applied() {
        let mut incomplete = params();
        incomplete.iir_apply = true;
        incomplete.iir_rp_db = Some(0.1);
        assert!(matches!(
            YFactorCalibration::new(incomplete),
            Err(ProcessingError::InvalidParameter(_))
        ));
    }
}
