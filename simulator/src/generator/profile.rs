//! Simulated signal analyzer and preselector with a known gain and noise
//! figure, so calibrations and data products have predictable answers.

use chrono::Utc;
use rand::{rngs::StdRng, SeedableRng};
use seacore::calibration::BOLTZMANN;
use seacore::math::units::{celsius_to_kelvin, db_to_linear, IMPEDANCE_OHMS};
use seacore::prelude::{ProcessingError, ProcessingResult};
use seacore::sensor::{AcquisitionRequest, Capture, Preselector, RfPath, SiganSettings, SignalAnalyzer};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::rc::Rc;

use super::template::{complex_gaussian_noise, complex_tone};

/// Narrowband emitter seen on the antenna path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToneConfig {
    /// Offset from the tuned frequency.
    pub offset_hz: f64,
    /// Power at the sensor input.
    pub power_dbm: f64,
}

/// Receiver characteristics the simulation reproduces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationProfile {
    pub gain_db: f64,
    pub noise_figure_db: f64,
    /// ENR of each calibration source, by index.
    pub enr_db: Vec<f64>,
    /// Reading of each temperature sensor, by index.
    pub temperatures_c: Vec<f64>,
    pub tone: Option<ToneConfig>,
    pub seed: u64,
    pub available: bool,
    /// Wait after each RF path switch.
    pub settle_ms: u64,
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self {
            gain_db: 30.0,
            noise_figure_db: 5.0,
            enr_db: vec![15.0],
            temperatures_c: vec![20.0],
            tone: Some(ToneConfig {
                offset_hz: 1.25e6,
                power_dbm: -60.0,
            }),
            seed: 0,
            available: true,
            settle_ms: 1000,
        }
    }
}

impl SimulationProfile {
    /// Analyzer and preselector sharing one RF path switch.
    pub fn build(&self) -> (SimulatedSigan, SimulatedPreselector) {
        let path = Rc::new(Cell::new(RfPath::Antenna));
        let sigan = SimulatedSigan {
            profile: self.clone(),
            settings: SiganSettings {
                frequency_hz: 0.0,
                sample_rate_hz: 14e6,
                gain_db: None,
                attenuation_db: None,
                reference_level_dbm: None,
                preamp_enable: None,
            },
            rng: StdRng::seed_from_u64(self.seed),
            path: path.clone(),
        };
        let preselector = SimulatedPreselector {
            enr_db: self.enr_db.clone(),
            temperatures_c: self.temperatures_c.clone(),
            path,
        };
        (sigan, preselector)
    }

    fn noise_temperature_k(&self) -> f64 {
        celsius_to_kelvin(self.temperatures_c.first().copied().unwrap_or(20.0))
    }

    /// Mean input-referred noise power density (W/Hz) for `path`, including
    /// the receiver's own noise.
    fn noise_density(&self, path: RfPath) -> f64 {
        let thermal = BOLTZMANN * self.noise_temperature_k();
        let noise_factor = db_to_linear(self.noise_figure_db);
        let enr = match path {
            RfPath::NoiseDiodeOn => db_to_linear(self.enr_db.first().copied().unwrap_or(0.0)),
            RfPath::Antenna | RfPath::NoiseDiodeOff => 0.0,
        };
        thermal * (noise_factor + enr)
    }
}

pub struct SimulatedSigan {
    profile: SimulationProfile,
    settings: SiganSettings,
    rng: StdRng,
    path: Rc<Cell<RfPath>>,
}

impl SignalAnalyzer for SimulatedSigan {
    fn is_available(&self) -> bool {
        self.profile.available
    }

    fn configure(&mut self, settings: &SiganSettings) -> ProcessingResult<()> {
        if !self.profile.available {
            return Err(ProcessingError::HardwareUnavailable(
                "simulated signal analyzer is offline".into(),
            ));
        }
        self.settings = settings.clone();
        Ok(())
    }

    fn settings(&self) -> &SiganSettings {
        &self.settings
    }

    fn acquire_time_domain_samples(
        &mut self,
        request: &AcquisitionRequest,
    ) -> ProcessingResult<Capture> {
        if !self.profile.available {
            return Err(ProcessingError::HardwareUnavailable(
                "simulated signal analyzer is offline".into(),
            ));
        }
        let sample_rate_hz = self.settings.sample_rate_hz;
        let gain = db_to_linear(self.profile.gain_db);
        let path = self.path.get();

        // Samples carry twice the RF voltage; power is |x / 2|^2 / R. A
        // simulated retune has no transient, so skipped samples are not drawn.
        let noise_w = gain * self.profile.noise_density(path) * sample_rate_hz;
        let mut data = complex_gaussian_noise(
            &mut self.rng,
            request.num_samples,
            4.0 * IMPEDANCE_OHMS * noise_w,
        );

        if let (RfPath::Antenna, Some(tone)) = (path, &self.profile.tone) {
            let tone_w = gain * db_to_linear(tone.power_dbm - 30.0);
            let amplitude = 2.0 * (IMPEDANCE_OHMS * tone_w).sqrt();
            let emitter = complex_tone(request.num_samples, tone.offset_hz, sample_rate_hz, amplitude);
            for (sample, add) in data.iter_mut().zip(emitter) {
                *sample += add;
            }
        }

        let overload = data
            .iter()
            .any(|sample| sample.re.abs() > 1.0 || sample.im.abs() > 1.0);
        Ok(Capture {
            data,
            sample_rate_hz,
            frequency_hz: self.settings.frequency_hz,
            capture_time: Utc::now(),
            overload,
        })
    }
}

pub struct SimulatedPreselector {
    enr_db: Vec<f64>,
    temperatures_c: Vec<f64>,
    path: Rc<Cell<RfPath>>,
}

impl Preselector for SimulatedPreselector {
    fn set_rf_path(&mut self, path: RfPath) -> ProcessingResult<()> {
        log::debug!("preselector RF path -> {:?}", path);
        self.path.set(path);
        Ok(())
    }

    fn noise_source_enr_db(&self, cal_source_idx: usize) -> ProcessingResult<f64> {
        self.enr_db.get(cal_source_idx).copied().ok_or_else(|| {
            ProcessingError::InvalidParameter(format!("no calibration source {}", cal_source_idx))
        })
    }

    fn temperature_c(&self, temp_sensor_idx: usize) -> ProcessingResult<f64> {
        self.temperatures_c.get(temp_sensor_idx).copied().ok_or_else(|| {
            ProcessingError::InvalidParameter(format!("no temperature sensor {}", temp_sensor_idx))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seacore::calibration::yfactor::mean_power_watts;

    fn tune(sigan: &mut SimulatedSigan, sample_rate_hz: f64) {
        sigan
            .configure(&SiganSettings {
                frequency_hz: 3.55e9,
                sample_rate_hz,
                gain_db: None,
                attenuation_db: Some(0.0),
                reference_level_dbm: None,
                preamp_enable: Some(true),
            })
            .unwrap();
    }

    #[test]
    fn noise_diode_raises_power_by_expected_ratio() {
        let profile = SimulationProfile {
            tone: None,
            ..Default::default()
        };
        let (mut sigan, mut preselector) = profile.build();
        tune(&mut sigan, 1e6);
        let request = AcquisitionRequest::new(100_000, 0, false);

        preselector.set_rf_path(RfPath::NoiseDiodeOn).unwrap();
        let on = sigan.acquire_time_domain_samples(&request).unwrap();
        preselector.set_rf_path(RfPath::NoiseDiodeOff).unwrap();
        let off = sigan.acquire_time_domain_samples(&request).unwrap();

        let y = mean_power_watts(&on.data).unwrap() / mean_power_watts(&off.data).unwrap();
        let expected = (db_to_linear(15.0) + db_to_linear(5.0)) / db_to_linear(5.0);
        assert!((y / expected - 1.0).abs() < 0.03);
        assert_eq!(on.sample_rate_hz, 1e6);
    }

    #[test]
    fn offline_profile_reports_unavailable() {
        let profile = SimulationProfile {
            available: false,
            ..Default::default()
        };
        let (mut sigan, preselector) = profile.build();
        assert!(!sigan.is_available());
        assert!(matches!(
            sigan.acquire_time_domain_samples(&AcquisitionRequest::new(10, 0, true)),
            Err(ProcessingError::HardwareUnavailable(_))
        ));
        assert!(preselector.noise_source_enr_db(3).is_err());
    }
}
