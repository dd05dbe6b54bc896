//! Stepped-frequency raw IQ acquisition.

use serde::{Deserialize, Serialize};

use crate::actions::params::{samples_for_duration, step_count, value_at, OneOrMany, SiganSweep};
use crate::actions::{describe_frequencies, ensure_available, measurement_result};
use crate::prelude::{Action, ActionOutput, ProcessingResult, SensorContext};
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
pub struct SteppedIqParams {
    pub name: String,
    pub frequency: OneOrMany<f64>,
    pub sample_rate: f64,
    pub duration_ms: OneOrMany<f64>,
    #[serde(default = "default_nskip")]
    pub nskip: OneOrMany<usize>,
    #[serde(default = "default_true")]
    pub cal_adjust: OneOrMany<bool>,
    #[serde(default)]
    pub gain: Option<OneOrMany<f64>>,
    #[serde(default)]
    pub attenuation: Option<OneOrMany<f64>>,
    #[serde(default)]
    pub reference_level: Option<OneOrMany<f64>>,
    #[serde(default)]
    pub preamp_enable: Option<OneOrMany<bool>>,
}

impl SteppedIqParams {
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

/// Time-domain IQ at each frequency, visited in ascending frequency order.
pub struct SteppedIqAction {
    params: SteppedIqParams,
    /// Step indices sorted by frequency.
    order: Vec<usize>,
    logger: LogManager,
}

impl SteppedIqAction {
    pub fn new(params: SteppedIqParams) -> ProcessingResult<Self> {
        let mut lengths = params.sweep().lengths();
        lengths.extend([
            ("duration_ms", params.duration_ms.list_len()),
            ("nskip", params.nskip.list_len()),
            ("cal_adjust", params.cal_adjust.list_len()),
        ]);
        let steps = step_count(&lengths)?;

        let mut keyed = (0..steps)
            .map(|step| Ok((value_at("frequency", &params.frequency, step)?, step)))
            .collect::<ProcessingResult<Vec<(f64, usize)>>>()?;
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
        let order = keyed.into_iter().map(|(_, step)| step).collect();

        let logger = LogManager::new(params.name.clone());
        Ok(Self {
            params,
            order,
            logger,
        })
    }

    fn frequencies(&self) -> Vec<f64> {
        self.order
            .iter()
            .filter_map(|step| self.params.frequency.at(*step))
            .collect()
    }
}

impl Action for SteppedIqAction {
    fn name(&self) -> &str {
        &self.params.name
    }

    fn summary(&self) -> String {
        format!(
            "Time-domain IQ at {} frequencies: {}",
            self.order.len(),
            describe_frequencies(&self.frequencies())
        )
    }

    fn execute(
        &mut self,
        sensor: &mut SensorContext<'_>,
        task_id: u64,
    ) -> ProcessingResult<ActionOutput> {
        ensure_available(&*sensor.sigan)?;
        sensor.preselector.set_rf_path(RfPath::Antenna)?;

        let mut results = Vec::with_capacity(self.order.len());
        for (position, &step) in self.order.iter().enumerate() {
            let settings = self.params.sweep().settings(step)?;
            let duration_ms = value_at("duration_ms", &self.params.duration_ms, step)?;
            let nskip = value_at("nskip", &self.params.nskip, step)?;
            let cal_adjust = value_at("cal_adjust", &self.params.cal_adjust, step)?;

            sensor.sigan.configure(&settings)?;
            let num_samples = samples_for_duration(duration_ms, sensor.sigan.sample_rate())?;
            let capture = sensor
                .sigan
                .acquire_time_domain_samples(&AcquisitionRequest::new(num_samples, nskip, cal_adjust))?;
            self.logger.debug(&format!(
                "captured {} IQ samples at {:.2} MHz",
                capture.len(),
                settings.frequency_hz / 1e6
            ));

            let payload = MeasurementPayload::TimeDomainIq {
                samples: capture.data.clone(),
            };
            results.push(measurement_result(
                &self.params.name,
                task_id,
                position + 1,
                settings,
                &capture,
                payload,
                sensor.calibration,
            ));
        }
        Ok(ActionOutput::Measurements(results))
    }
}
