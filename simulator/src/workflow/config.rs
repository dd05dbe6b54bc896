use anyhow::Context;
use seacore::actions::{
    ActionConfig, OneOrMany, SeaDataProductParams, SteppedFftParams, SteppedIqParams, YFactorParams,
};
use seacore::math::WindowType;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::generator::profile::SimulationProfile;

/// A schedule of actions run in order against one simulated sensor.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub simulation: SimulationProfile,
    #[serde(default)]
    pub calibration_file: Option<PathBuf>,
    pub actions: Vec<ActionConfig>,
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        anyhow::ensure!(
            !config.actions.is_empty(),
            "workflow config {} lists no actions",
            path_ref.display()
        );
        Ok(config)
    }

    /// Built-in schedule: calibrate two frequencies, then measure them.
    pub fn demo() -> Self {
        let frequencies = vec![3.555e9, 3.565e9];
        let sample_rate = 14e6;
        Self {
            simulation: SimulationProfile {
                settle_ms: 0,
                ..Default::default()
            },
            calibration_file: None,
            actions: vec![
                ActionConfig::YFactorCalibration(YFactorParams {
                    name: "SEA_CBRS_Calibrate_Baseline".into(),
                    frequency: OneOrMany::Many(frequencies.clone()),
                    sample_rate,
                    duration_ms: OneOrMany::One(40.0),
                    nskip: OneOrMany::One(0),
                    cal_source_idx: OneOrMany::One(0),
                    temp_sensor_idx: OneOrMany::One(0),
                    iir_apply: true,
                    iir_rp_db: Some(0.1),
                    iir_rs_db: Some(40.0),
                    iir_cutoff_hz: Some(5e6),
                    iir_width_hz: Some(1e6),
                    gain: None,
                    attenuation: Some(OneOrMany::One(0.0)),
                    reference_level: Some(OneOrMany::One(-25.0)),
                    preamp_enable: Some(OneOrMany::One(true)),
                }),
                ActionConfig::SeaDataProduct(SeaDataProductParams {
                    name: "SEA_CBRS_Measure_Baseline".into(),
                    frequency: OneOrMany::Many(frequencies.clone()),
                    sample_rate,
                    duration_ms: OneOrMany::One(40.0),
                    nskip: OneOrMany::One(0),
                    gain: None,
                    attenuation: Some(OneOrMany::One(0.0)),
                    reference_level: Some(OneOrMany::One(-25.0)),
                    preamp_enable: Some(OneOrMany::One(true)),
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
                    nffts: OneOrMany::One(320),
                    fft_window_type: WindowType::FlatTop,
                    apd_bin_size_db: OneOrMany::One(0.5),
                    td_bin_size_ms: OneOrMany::One(10.0),
                    round_to_places: OneOrMany::One(2),
                }),
                ActionConfig::SteppedFft(SteppedFftParams {
                    name: "M4S_Survey".into(),
                    frequency: OneOrMany::Many(frequencies.clone()),
                    sample_rate,
                    fft_size: 1024,
                    nffts: OneOrMany::One(100),
                    nskip: OneOrMany::One(0),
                    cal_adjust: OneOrMany::One(true),
                    fft_window_type: WindowType::FlatTop,
                    gain: None,
                    attenuation: Some(OneOrMany::One(0.0)),
                    reference_level: Some(OneOrMany::One(-25.0)),
                    preamp_enable: Some(OneOrMany::One(true)),
                }),
                ActionConfig::SteppedIq(SteppedIqParams {
                    name: "IQ_Snapshot".into(),
                    frequency: OneOrMany::Many(frequencies.into_iter().rev().collect()),
                    sample_rate,
                    duration_ms: OneOrMany::One(1.0),
                    nskip: OneOrMany::One(0),
                    cal_adjust: OneOrMany::One(true),
                    gain: None,
                    attenuation: Some(OneOrMany::One(0.0)),
                    reference_level: Some(OneOrMany::One(-25.0)),
                    preamp_enable: Some(OneOrMany::One(true)),
                }),
            ],
        }
    }
}
