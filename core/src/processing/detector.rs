use ndarray::{Array1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::math::stats::StatsHelper;

/// A single statistical reduction a detector can apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    Mean,
    Max,
    Min,
    Median,
    /// The first measurement along the reduced axis, untouched.
    Sample,
}

/// Named, ordered set of statistics computed along one axis of repeated
/// measurements. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerDetector {
    name: String,
    statistics: Vec<Statistic>,
}

impl PowerDetector {
    pub fn new(name: impl Into<String>, statistics: &[Statistic]) -> Self {
        Self {
            name: name.into(),
            statistics: statistics.to_vec(),
        }
    }

    pub fn mean_max(name: impl Into<String>) -> Self {
        Self::new(name, &[Statistic::Mean, Statistic::Max])
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn statistics(&self) -> &[Statistic] {
        &self.statistics
    }

    /// Collapses `axis` of `data`, returning one array per statistic in the
    /// detector's declared order. With `ignore_nan`, masked (`NaN`) entries are
    /// skipped; a lane with no valid entries reduces to `NaN`.
    pub fn apply(&self, data: ArrayView2<f64>, axis: Axis, ignore_nan: bool) -> Vec<Array1<f64>> {
        self.statistics
            .iter()
            .map(|statistic| reduce(data, axis, *statistic, ignore_nan))
            .collect()
    }
}

fn reduce(data: ArrayView2<f64>, axis: Axis, statistic: Statistic, ignore_nan: bool) -> Array1<f64> {
    match statistic {
        Statistic::Mean if ignore_nan => data.map_axis(axis, StatsHelper::nan_mean),
        Statistic::Mean => data.map_axis(axis, StatsHelper::mean),
        Statistic::Max if ignore_nan => data.map_axis(axis, StatsHelper::nan_max),
        Statistic::Max => data.map_axis(axis, StatsHelper::max),
        Statistic::Min if ignore_nan => data.map_axis(axis, StatsHelper::nan_min),
        Statistic::Min => data.map_axis(axis, StatsHelper::min),
        Statistic::Median => data.map_axis(axis, |lane| StatsHelper::median(lane, ignore_nan)),
        Statistic::Sample => {
            if data.len_of(axis) == 0 {
                data.map_axis(axis, |_| f64::NAN)
            } else {
                data.index_axis(axis, 0).to_owned()
            }
        }
    }
}
