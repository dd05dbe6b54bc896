//! Scalar-or-list action parameters and their expansion into per-step values.

use serde::{Deserialize, Serialize};

use crate::prelude::{ProcessingError, ProcessingResult};
use crate::sensor::hardware::SiganSettings;

/// A parameter given once for every step, or once per step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: Clone> OneOrMany<T> {
    /// Number of steps the parameter pins down; `None` when it broadcasts.
    pub fn list_len(&self) -> Option<usize> {
        match self {
            OneOrMany::One(_) => None,
            OneOrMany::Many(values) => Some(values.len()),
        }
    }

    /// Value at `step`. Callers validate the length with [`step_count`].
    pub fn at(&self, step: usize) -> Option<T> {
        match self {
            OneOrMany::One(value) => Some(value.clone()),
            OneOrMany::Many(values) => values.get(step).cloned(),
        }
    }
}

impl<T> From<T> for OneOrMany<T> {
    fn from(value: T) -> Self {
        OneOrMany::One(value)
    }
}

/// Number of steps implied by a set of parameters: every list must share one
/// length, scalars broadcast, and all-scalar parameters yield a single step.
pub fn step_count(lists: &[(&str, Option<usize>)]) -> ProcessingResult<usize> {
    let mut steps: Option<(&str, usize)> = None;
    for (name, len) in lists {
        let Some(len) = len else { continue };
        if *len == 0 {
            return Err(ProcessingError::InvalidParameter(format!(
                "parameter '{}' is an empty list",
                name
            )));
        }
        match steps {
            Some((first, expected)) if expected != *len => {
                return Err(ProcessingError::InvalidParameter(format!(
                    "parameter '{}' has {} values but '{}' has {}",
                    name, len, first, expected
                )));
            }
            Some(_) => {}
            None => steps = Some((*name, *len)),
        }
    }
    Ok(steps.map(|(_, len)| len).unwrap_or(1))
}

pub(crate) fn value_at<T: Clone>(name: &str, param: &OneOrMany<T>, step: usize) -> ProcessingResult<T> {
    param.at(step).ok_or_else(|| {
        ProcessingError::InvalidParameter(format!("parameter '{}' has no value for step {}", name, step))
    })
}

pub(crate) fn optional_at<T: Clone>(
    name: &str,
    param: &Option<OneOrMany<T>>,
    step: usize,
) -> ProcessingResult<Option<T>> {
    param
        .as_ref()
        .map(|param| value_at(name, param, step))
        .transpose()
}

/// Analyzer controls shared by every action's parameter block.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SiganSweep<'a> {
    pub frequency: &'a OneOrMany<f64>,
    pub sample_rate: f64,
    pub gain: &'a Option<OneOrMany<f64>>,
    pub attenuation: &'a Option<OneOrMany<f64>>,
    pub reference_level: &'a Option<OneOrMany<f64>>,
    pub preamp_enable: &'a Option<OneOrMany<bool>>,
}

impl SiganSweep<'_> {
    pub fn lengths(&self) -> Vec<(&'static str, Option<usize>)> {
        vec![
            ("frequency", self.frequency.list_len()),
            ("gain", self.gain.as_ref().and_then(OneOrMany::list_len)),
            ("attenuation", self.attenuation.as_ref().and_then(OneOrMany::list_len)),
            (
                "reference_level",
                self.reference_level.as_ref().and_then(OneOrMany::list_len),
            ),
            (
                "preamp_enable",
                self.preamp_enable.as_ref().and_then(OneOrMany::list_len),
            ),
        ]
    }

    pub fn settings(&self, step: usize) -> ProcessingResult<SiganSettings> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(ProcessingError::InvalidParameter(format!(
                "sample_rate must be positive, got {}",
                self.sample_rate
            )));
        }
        Ok(SiganSettings {
            frequency_hz: value_at("frequency", self.frequency, step)?,
            sample_rate_hz: self.sample_rate,
            gain_db: optional_at("gain", self.gain, step)?,
            attenuation_db: optional_at("attenuation", self.attenuation, step)?,
            reference_level_dbm: optional_at("reference_level", self.reference_level, step)?,
            preamp_enable: optional_at("preamp_enable", self.preamp_enable, step)?,
        })
    }
}

/// Samples in `duration_ms` at `sample_rate_hz`, truncated.
pub fn samples_for_duration(duration_ms: f64, sample_rate_hz: f64) -> ProcessingResult<usize> {
    let samples = (duration_ms * sample_rate_hz * 1e-3).floor();
    if !(samples.is_finite() && samples >= 1.0) {
        return Err(ProcessingError::InvalidParameter(format!(
            "duration_ms {} at {} Hz yields no samples",
            duration_ms, sample_rate_hz
        )));
    }
    Ok(samples as usize)
}
