use ndarray::ArrayView1;

/// NaN-aware reductions used by the detectors and the quantile filter.
pub struct StatsHelper;

impl StatsHelper {
    pub fn mean(values: ArrayView1<f64>) -> f64 {
        if values.is_empty() {
            return f64::NAN;
        }
        values.sum() / values.len() as f64
    }

    /// Mean over the finite-or-infinite entries, skipping `NaN`. An all-`NaN`
    /// lane yields `NaN`.
    pub fn nan_mean(values: ArrayView1<f64>) -> f64 {
        let (sum, count) = values
            .iter()
            .filter(|value| !value.is_nan())
            .fold((0.0, 0usize), |(sum, count), &value| (sum + value, count + 1));
        if count == 0 {
            f64::NAN
        } else {
            sum / count as f64
        }
    }

    /// Maximum that propagates `NaN` like an unmasked reduction.
    pub fn max(values: ArrayView1<f64>) -> f64 {
        Self::extreme(values, false, |candidate, best| candidate > best)
    }

    pub fn nan_max(values: ArrayView1<f64>) -> f64 {
        Self::extreme(values, true, |candidate, best| candidate > best)
    }

    pub fn min(values: ArrayView1<f64>) -> f64 {
        Self::extreme(values, false, |candidate, best| candidate < best)
    }

    pub fn nan_min(values: ArrayView1<f64>) -> f64 {
        Self::extreme(values, true, |candidate, best| candidate < best)
    }

    pub fn median(values: ArrayView1<f64>, ignore_nan: bool) -> f64 {
        if !ignore_nan && values.iter().any(|value| value.is_nan()) {
            return f64::NAN;
        }
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if sorted.is_empty() {
            return f64::NAN;
        }
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            0.5 * (sorted[mid - 1] + sorted[mid])
        } else {
            sorted[mid]
        }
    }

    /// Quantile of ascending `sorted` data with linear interpolation between
    /// the two nearest ranks.
    pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
        if sorted.is_empty() {
            return f64::NAN;
        }
        let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
        let lower = position.floor() as usize;
        let upper = position.ceil() as usize;
        let fraction = position - lower as f64;
        sorted[lower] + fraction * (sorted[upper] - sorted[lower])
    }

    fn extreme(values: ArrayView1<f64>, ignore_nan: bool, better: fn(f64, f64) -> bool) -> f64 {
        let mut best: Option<f64> = None;
        for &value in values.iter() {
            if value.is_nan() {
                if ignore_nan {
                    continue;
                }
                return f64::NAN;
            }
            best = match best {
                Some(current) if !better(value, current) => Some(current),
                _ => Some(value),
            };
        }
        best.unwrap_or(f64::NAN)
    }
}
