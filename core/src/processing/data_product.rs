//! Assembly of the six-array data product for one capture.

use half::f16;
use num_complex::Complex64;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::math::window::WindowType;
use crate::prelude::{ProcessingError, ProcessingResult};
use crate::processing::apd::ApdEstimator;
use crate::processing::filter::{FilterSpec, SosFilter};
use crate::processing::spectrum::SpectralEstimator;
use crate::processing::td_power::{QuantileFilter, TimeDomainPowerEngine};
use crate::telemetry::log::LogManager;

/// Semantic identity of each array in a [`DataProduct`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductComponent {
    FftMeanPower,
    FftMaxPower,
    TdMeanPower,
    TdMaxPower,
    ApdProbability,
    ApdAmplitude,
}

impl ProductComponent {
    /// Storage order of the arrays.
    pub const ORDER: [ProductComponent; 6] = [
        ProductComponent::FftMeanPower,
        ProductComponent::FftMaxPower,
        ProductComponent::TdMeanPower,
        ProductComponent::TdMaxPower,
        ProductComponent::ApdProbability,
        ProductComponent::ApdAmplitude,
    ];

    /// Whether the component is rounded to the configured decimal places.
    /// Probabilities keep their full half-precision resolution.
    pub fn is_rounded(self) -> bool {
        !matches!(self, ProductComponent::ApdProbability)
    }

    pub fn name(self) -> &'static str {
        match self {
            ProductComponent::FftMeanPower => "fft_mean_power",
            ProductComponent::FftMaxPower => "fft_max_power",
            ProductComponent::TdMeanPower => "td_mean_power",
            ProductComponent::TdMaxPower => "td_max_power",
            ProductComponent::ApdProbability => "apd_probability",
            ProductComponent::ApdAmplitude => "apd_amplitude",
        }
    }

    fn index(self) -> usize {
        match self {
            ProductComponent::FftMeanPower => 0,
            ProductComponent::FftMaxPower => 1,
            ProductComponent::TdMeanPower => 2,
            ProductComponent::TdMaxPower => 3,
            ProductComponent::ApdProbability => 4,
            ProductComponent::ApdAmplitude => 5,
        }
    }
}

/// Ordered, half-precision result arrays for one capture.
#[derive(Debug, Clone, PartialEq)]
pub struct DataProduct {
    arrays: [Vec<f16>; 6],
    td_rejected_fraction: f64,
}

impl DataProduct {
    pub fn get(&self, component: ProductComponent) -> &[f16] {
        &self.arrays[component.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProductComponent, &[f16])> {
        ProductComponent::ORDER
            .iter()
            .map(move |component| (*component, self.get(*component)))
    }

    /// Share of time-domain samples discarded by the quantile filter.
    pub fn td_rejected_fraction(&self) -> f64 {
        self.td_rejected_fraction
    }

    /// Total number of stored values across all arrays.
    pub fn total_len(&self) -> usize {
        self.arrays.iter().map(Vec::len).sum()
    }

    pub fn into_arrays(self) -> [Vec<f16>; 6] {
        self.arrays
    }
}

impl Serialize for DataProduct {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(ProductComponent::ORDER.len() + 1))?;
        for (component, values) in self.iter() {
            let widened: Vec<f32> = values.iter().map(|value| value.to_f32()).collect();
            map.serialize_entry(component.name(), &widened)?;
        }
        map.serialize_entry("td_rejected_fraction", &self.td_rejected_fraction)?;
        map.end()
    }
}

/// Per-step processing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProductParams {
    pub iir_apply: bool,
    pub quantile_filter: Option<QuantileFilter>,
    pub num_ffts: usize,
    pub td_bin_size_ms: f64,
    pub apd_bin_size_db: f64,
    pub round_to_places: i32,
}

/// Runs spectrum, filter, time-domain power and APD over one capture. The
/// window and the filter are designed once, at construction, for a single
/// sample rate.
pub struct DataProductAssembler {
    sample_rate_hz: f64,
    spectrum: SpectralEstimator,
    filter: SosFilter,
    logger: LogManager,
}

impl DataProductAssembler {
    pub fn new(
        fft_size: usize,
        window: WindowType,
        filter_spec: &FilterSpec,
        sample_rate_hz: f64,
    ) -> ProcessingResult<Self> {
        Ok(Self {
            sample_rate_hz,
            spectrum: SpectralEstimator::new(fft_size, window)?,
            filter: SosFilter::design_elliptic_lowpass(filter_spec, sample_rate_hz)?,
            logger: LogManager::new("data_product"),
        })
    }

    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }

    pub fn fft_size(&self) -> usize {
        self.spectrum.fft_size()
    }

    pub fn filter(&self) -> &SosFilter {
        &self.filter
    }

    pub fn assemble(
        &mut self,
        samples: &[Complex64],
        sample_rate_hz: f64,
        params: &ProductParams,
    ) -> ProcessingResult<DataProduct> {
        if (sample_rate_hz - self.sample_rate_hz).abs() > f64::EPSILON * self.sample_rate_hz {
            return Err(ProcessingError::InvalidParameter(format!(
                "capture sample rate {} Hz differs from the configured {} Hz",
                sample_rate_hz, self.sample_rate_hz
            )));
        }
        let td_power = TimeDomainPowerEngine::new(params.quantile_filter);
        let apd = ApdEstimator::new(params.apd_bin_size_db)?;

        let spectrum = self.logger.timed("fft", || {
            self.spectrum
                .estimate(samples, params.num_ffts, sample_rate_hz)
        })?;

        let filtered;
        let time_domain: &[Complex64] = if params.iir_apply {
            filtered = self.logger.timed("iir", || self.filter.apply(samples));
            &filtered
        } else {
            samples
        };

        let td = self.logger.timed("td_power", || {
            td_power.compute(time_domain, params.td_bin_size_ms, sample_rate_hz)
        })?;
        if td.rejected_fraction > 0.0 {
            self.logger.debug(&format!(
                "quantile filter rejected {:.2}% of samples",
                100.0 * td.rejected_fraction
            ));
        }
        let distribution = self.logger.timed("apd", || apd.estimate(time_domain))?;

        let raw = [
            spectrum.mean_dbm.to_vec(),
            spectrum.max_dbm.to_vec(),
            td.mean_dbm.to_vec(),
            td.max_dbm.to_vec(),
            distribution.probabilities.to_vec(),
            distribution.amplitudes_dbm.to_vec(),
        ];
        let mut arrays: [Vec<f16>; 6] = Default::default();
        for (component, values) in ProductComponent::ORDER.iter().zip(raw) {
            arrays[component.index()] =
                reduce_precision(*component, &values, params.round_to_places);
        }

        Ok(DataProduct {
            arrays,
            td_rejected_fraction: td.rejected_fraction,
        })
    }
}

/// Rounds half-to-even at `places` decimals (unless the component is
/// exempt), then narrows to binary16.
pub fn reduce_precision(component: ProductComponent, values: &[f64], places: i32) -> Vec<f16> {
    let scale = 10f64.powi(places);
    values
        .iter()
        .map(|&value| {
            let value = if component.is_rounded() && value.is_finite() {
                (value * scale).round_ties_even() / scale
            } else {
                value
            };
            f16::from_f64(value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const FILTER: FilterSpec = FilterSpec {
        passband_ripple_db: 0.1,
        stopband_attenuation_db: 40.0,
        cutoff_hz: 5e6,
        transition_width_hz: 1e6,
    };

    fn params(iir_apply: bool) -> ProductParams {
        ProductParams {
            iir_apply,
            quantile_filter: Some(QuantileFilter::new(0.0, 1.0).unwrap()),
            num_ffts: 8,
            td_bin_size_ms: 0.1,
            apd_bin_size_db: 1.0,
            round_to_places: 2,
        }
    }

    fn capture(len: usize) -> Vec<Complex64> {
        (0..len)
            .map(|n| {
                let phase = 2.0 * PI * 0.05 * n as f64;
                Complex64::from_polar(0.01, phase) + Complex64::new(1e-4 * (n as f64).sin(), 0.0)
            })
            .collect()
    }

    #[test]
    fn rounding_skips_probability_axis() {
        let rounded = reduce_precision(ProductComponent::FftMeanPower, &[-97.123], 2);
        assert_eq!(rounded[0], f16::from_f64(-97.12));
        assert_eq!(rounded[0].to_f64(), -97.125);

        let probabilities = reduce_precision(ProductComponent::ApdProbability, &[0.123456], 2);
        assert_eq!(probabilities[0], f16::from_f64(0.123456));
        assert_ne!(probabilities[0], f16::from_f64(0.12));
    }

    #[test]
    fn rounding_is_half_to_even() {
        let rounded = reduce_precision(ProductComponent::TdMaxPower, &[0.5, 1.5, 2.5], 0);
        let values: Vec<f64> = rounded.iter().map(|v| v.to_f64()).collect();
        assert_eq!(values, vec![0.0, 2.0, 2.0]);
        assert!(reduce_precision(ProductComponent::FftMaxPower, &[f64::NEG_INFINITY], 1)[0]
            .is_infinite());
    }

    #[test]
    fn assembles_arrays_in_order() {
        let mut assembler = DataProductAssembler::new(256, WindowType::Hann, &FILTER, 14e6).unwrap();
        assert_eq!(assembler.filter().order(), 4);
        let samples = capture(14_000);
        let product = assembler.assemble(&samples, 14e6, &params(true)).unwrap();

        let order: Vec<ProductComponent> = product.iter().map(|(component, _)| component).collect();
        assert_eq!(order, ProductComponent::ORDER.to_vec());
        assert_eq!(product.get(ProductComponent::FftMeanPower).len(), 256);
        assert_eq!(product.get(ProductComponent::TdMeanPower).len(), 10);
        assert_eq!(
            product.get(ProductComponent::ApdProbability).len(),
            product.get(ProductComponent::ApdAmplitude).len()
        );
        assert_eq!(product.td_rejected_fraction(), 0.0);

        // spectrum is computed before filtering
        let unfiltered = assembler.assemble(&samples, 14e6, &params(false)).unwrap();
        assert_eq!(
            product.get(ProductComponent::FftMaxPower),
            unfiltered.get(ProductComponent::FftMaxPower)
        );
    }

    #[test]
    fn rejects_capture_at_other_sample_rate() {
        let mut assembler = DataProductAssembler::new(256, WindowType::Hann, &FILTER, 14e6).unwrap();
        let samples = capture(4096);
        assert!(matches!(
            assembler.assemble(&samples, 7e6, &params(false)),
            Err(ProcessingError::InvalidParameter(_))
        ));
        assert!(matches!(
            assembler.assemble(&samples[..1000], 14e6, &params(false)),
            Err(ProcessingError::InsufficientSamples(_))
        ));
    }
}
