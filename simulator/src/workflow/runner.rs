use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use seacore::calibration::{CalibrationReport, JsonCalibrationStore};
use seacore::prelude::{ActionOutput, SensorContext};
use seacore::sensor::MeasurementResult;
use seacore::telemetry::{ActionCounts, LogManager, MetricsRecorder};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Scheduler-facing record of one action run.
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub action: String,
    pub task_id: u64,
    pub succeeded: bool,
    pub detail: String,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub outcomes: Vec<TaskOutcome>,
    pub measurements: Vec<MeasurementResult>,
    pub calibrations: Vec<CalibrationReport>,
    pub metrics: BTreeMap<String, ActionCounts>,
}

pub struct Runner {
    config: WorkflowConfig,
    store: JsonCalibrationStore,
    metrics: MetricsRecorder,
    logger: LogManager,
}

impl Runner {
    pub fn new(config: WorkflowConfig, store: JsonCalibrationStore) -> Self {
        Self {
            config,
            store,
            metrics: MetricsRecorder::new(),
            logger: LogManager::new("runner"),
        }
    }

    pub fn store(&self) -> &JsonCalibrationStore {
        &self.store
    }

    /// Runs every configured action in order, numbering tasks from
    /// `first_task_id`. A failing action is recorded and the schedule
    /// continues.
    pub fn execute(&self, first_task_id: u64) -> anyhow::Result<WorkflowResult> {
        let profile = &self.config.simulation;
        let (mut sigan, mut preselector) = profile.build();
        let settle_time = Duration::from_millis(profile.settle_ms);

        let mut outcomes = Vec::with_capacity(self.config.actions.len());
        let mut measurements = Vec::new();
        let mut calibrations = Vec::new();

        for (offset, action_config) in self.config.actions.iter().enumerate() {
            let task_id = first_task_id + offset as u64;
            let mut action = action_config
                .build_with_settle_time(settle_time)
                .with_context(|| format!("building action {}", action_config.name()))?;
            let summary = action.summary();
            self.logger
                .record(&format!("task {} -> {}: {}", task_id, action.name(), summary));

            let mut sensor = SensorContext {
                sigan: &mut sigan,
                preselector: &mut preselector,
                calibration: &self.store,
            };
            let outcome = match action.execute(&mut sensor, task_id) {
                Ok(output) => {
                    self.metrics.record_completed(action.name());
                    let detail = output.detail();
                    match output {
                        ActionOutput::Measurements(results) => measurements.extend(results),
                        ActionOutput::Calibration(reports) => calibrations.extend(reports),
                    }
                    TaskOutcome {
                        action: action.name().to_string(),
                        task_id,
                        succeeded: true,
                        detail,
                        summary,
                    }
                }
                Err(err) => {
                    self.metrics.record_failed(action.name());
                    self.logger
                        .warn(&format!("task {} ({}) failed: {}", task_id, action.name(), err));
                    TaskOutcome {
                        action: action.name().to_string(),
                        task_id,
                        succeeded: false,
                        detail: err.to_string(),
                        summary,
                    }
                }
            };
            outcomes.push(outcome);
        }

        Ok(WorkflowResult {
            outcomes,
            measurements,
            calibrations,
            metrics: self.metrics.snapshot(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::profile::SimulationProfile;
    use seacore::actions::{ActionConfig, OneOrMany, SeaDataProductParams, YFactorParams};
    use chrono::Utc;
    use seacore::calibration::{CalibrationKey, CalibrationRecord, CalibrationStore};
    use seacore::math::WindowType;
    use seacore::sensor::{MeasurementPayload, SiganSettings};

    fn quiet_profile() -> SimulationProfile {
        SimulationProfile {
            tone: None,
            settle_ms: 0,
            seed: 7,
            ..Default::default()
        }
    }

    fn calibration(iir_apply: bool) -> ActionConfig {
        ActionConfig::YFactorCalibration(YFactorParams {
            name: "cal".into(),
            frequency: OneOrMany::One(3.555e9),
            sample_rate: 14e6,
            duration_ms: OneOrMany::One(4.0),
            nskip: OneOrMany::One(0),
            cal_source_idx: OneOrMany::One(0),
            temp_sensor_idx: OneOrMany::One(0),
            iir_apply,
            iir_rp_db: Some(0.1),
            iir_rs_db: Some(40.0),
            iir_cutoff_hz: Some(5e6),
            iir_width_hz: Some(1e6),
            gain: None,
            attenuation: None,
            reference_level: None,
            preamp_enable: None,
        })
    }

    fn data_product() -> ActionConfig {
        ActionConfig::SeaDataProduct(SeaDataProductParams {
            name: "measure".into(),
            frequency: OneOrMany::One(3.555e9),
            sample_rate: 14e6,
            duration_ms: OneOrMany::One(4.0),
            nskip: OneOrMany::One(0),
            gain: None,
            attenuation: None,
            reference_level: None,
            preamp_enable: None,
            cal_adjust: OneOrMany::One(true),
            iir_apply: OneOrMany::One(true),
            iir_rp_db: 0.1,
            iir_rs_db: 40.0,
            iir_cutoff_hz: 5e6,
            iir_width_hz: 1e6,
            qfilt_apply: OneOrMany::One(false),
            qfilt_qlo: 0.0,
            qfilt_qhi: 1.0,
            fft_size: 875,
            nffts: OneOrMany::One(32),
            fft_window_type: WindowType::FlatTop,
            apd_bin_size_db: OneOrMany::One(0.5),
            td_bin_size_ms: OneOrMany::One(1.0),
            round_to_places: OneOrMany::One(2),
        })
    }

    fn runner(actions: Vec<ActionConfig>, simulation: SimulationProfile) -> Runner {
        let config = WorkflowConfig {
            simulation,
            calibration_file: None,
            actions,
        };
        Runner::new(config, JsonCalibrationStore::in_memory())
    }

    fn calibration_key() -> CalibrationKey {
        CalibrationKey::from_settings(&SiganSettings {
            frequency_hz: 3.555e9,
            sample_rate_hz: 14e6,
            gain_db: None,
            attenuation_db: None,
            reference_level_dbm: None,
            preamp_enable: None,
        })
    }

    #[test]
    fn calibration_recovers_simulated_receiver() {
        // Unfiltered white noise spans the full sample rate.
        let store = JsonCalibrationStore::in_memory();
        store
            .persist(
                calibration_key(),
                CalibrationRecord {
                    gain_db: 0.0,
                    noise_figure_db: 0.0,
                    enbw_hz: Some(14e6),
                    temperature_c: 20.0,
                    datetime: Utc::now(),
                },
            )
            .unwrap();
        let config = WorkflowConfig {
            simulation: quiet_profile(),
            calibration_file: None,
            actions: vec![calibration(false)],
        };
        let runner = Runner::new(config, store);
        let result = runner.execute(1).unwrap();
        assert!(result.outcomes[0].succeeded, "{}", result.outcomes[0].detail);
        assert!(result.outcomes[0].detail.starts_with("Noise Figure:"));

        let report = &result.calibrations[0];
        assert!((report.noise_figure_db - 5.0).abs() < 0.5);
        assert!((report.gain_db - 30.0).abs() < 0.5);

        let stored = runner.store().lookup(&calibration_key()).unwrap();
        assert_eq!(stored.enbw_hz, Some(14e6));
        assert!((stored.gain_db - report.gain_db).abs() < 1e-12);
    }

    #[test]
    fn unfiltered_calibration_without_enbw_fails() {
        let runner = runner(vec![calibration(false)], quiet_profile());
        let result = runner.execute(1).unwrap();
        assert!(!result.outcomes[0].succeeded);
        assert!(result.outcomes[0].detail.contains("ENBW"));
        assert!(runner.store().lookup(&calibration_key()).is_none());
    }

    #[test]
    fn measurement_after_calibration_is_annotated() {
        let runner = runner(vec![calibration(true), data_product()], quiet_profile());
        let result = runner.execute(10).unwrap();
        assert_eq!(result.outcomes.len(), 2);
        assert!(result.outcomes.iter().all(|outcome| outcome.succeeded));
        assert_eq!(result.outcomes[1].task_id, 11);

        let measurement = &result.measurements[0];
        assert!(measurement.sensor_calibration.is_some());
        match &measurement.payload {
            MeasurementPayload::DataProduct(product) => {
                assert_eq!(product.iter().count(), 6);
                assert!(product.total_len() > 0);
            }
            other => panic!("unexpected payload {:?}", other),
        }
        assert_eq!(result.metrics["measure"].completed, 1);
    }

    #[test]
    fn unavailable_sensor_is_recorded_as_failure() {
        let profile = SimulationProfile {
            available: false,
            ..quiet_profile()
        };
        let runner = runner(vec![data_product(), calibration(false)], profile);
        let result = runner.execute(1).unwrap();
        assert!(result.outcomes.iter().all(|outcome| !outcome.succeeded));
        assert!(result.outcomes[0].detail.contains("hardware unavailable"));
        assert_eq!(result.metrics["cal"].failed, 1);
        assert!(result.measurements.is_empty());
    }
}
