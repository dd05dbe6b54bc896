//! Elliptic IIR low-pass design and zero-state SOS filtering.
//!
//! Design follows the classical route: minimum order from the degree
//! equation, analog elliptic prototype, frequency scaling, bilinear transform,
//! then pairing of poles and zeros into second-order sections. The cascade is
//! never collapsed into a single high-order polynomial.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::math::elliptic::{arc_jac_sc1, ellipdeg, ellipj, ellipk, ellipkm1};
use crate::prelude::{ProcessingError, ProcessingResult};

const PAIRING_TOL: f64 = 1e-10;

/// Low-pass design constraints, in the sensor's configuration units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub passband_ripple_db: f64,
    pub stopband_attenuation_db: f64,
    pub cutoff_hz: f64,
    pub transition_width_hz: f64,
}

impl FilterSpec {
    pub fn stopband_edge_hz(&self) -> f64 {
        self.cutoff_hz + self.transition_width_hz
    }

    /// Rough equivalent noise bandwidth of the complex low-pass response.
    pub fn approximate_enbw_hz(&self) -> f64 {
        2.0 * self.stopband_edge_hz()
    }

    fn validate(&self, sample_rate_hz: f64) -> ProcessingResult<()> {
        let fields = [
            ("passband ripple", self.passband_ripple_db),
            ("stopband attenuation", self.stopband_attenuation_db),
            ("cutoff", self.cutoff_hz),
            ("transition width", self.transition_width_hz),
            ("sample rate", sample_rate_hz),
        ];
        if let Some((label, value)) = fields
            .iter()
            .find(|(_, value)| !value.is_finite() || *value <= 0.0)
        {
            return Err(ProcessingError::InvalidFilterSpec(format!(
                "{} must be positive and finite, got {}",
                label, value
            )));
        }
        if self.stopband_attenuation_db <= self.passband_ripple_db {
            return Err(ProcessingError::InvalidFilterSpec(format!(
                "stopband attenuation {} dB must exceed passband ripple {} dB",
                self.stopband_attenuation_db, self.passband_ripple_db
            )));
        }
        let nyquist = sample_rate_hz / 2.0;
        if self.stopband_edge_hz() >= nyquist {
            return Err(ProcessingError::InvalidFilterSpec(format!(
                "stopband edge {} Hz must be below Nyquist {} Hz",
                self.stopband_edge_hz(),
                nyquist
            )));
        }
        Ok(())
    }
}

/// Cascade of second-order sections, each `[b0, b1, b2, a0, a1, a2]` with
/// `a0 == 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct SosFilter {
    sections: Vec<[f64; 6]>,
    order: usize,
    sample_rate_hz: f64,
}

impl SosFilter {
    /// Minimum-order elliptic low-pass meeting `spec` at `sample_rate_hz`.
    pub fn design_elliptic_lowpass(spec: &FilterSpec, sample_rate_hz: f64) -> ProcessingResult<Self> {
        spec.validate(sample_rate_hz)?;
        let nyquist = sample_rate_hz / 2.0;
        let wp = spec.cutoff_hz / nyquist;
        let ws = spec.stopband_edge_hz() / nyquist;

        let order = minimum_order(wp, ws, spec.passband_ripple_db, spec.stopband_attenuation_db);
        let (zeros, poles, gain) =
            analog_prototype(order, spec.passband_ripple_db, spec.stopband_attenuation_db)?;

        // Prewarp the passband edge for a bilinear transform at fs = 2.
        let warped = 4.0 * (PI * wp / 2.0).tan();
        let (zeros, poles, gain) = scale_frequency(zeros, poles, gain, warped);
        let (zeros, poles, gain) = bilinear(zeros, poles, gain, 2.0);
        let sections = pair_sections(&zeros, &poles, gain);

        log::debug!(
            "designed order-{} elliptic low-pass ({} sections), passband {} Hz, stopband {} Hz",
            order,
            sections.len(),
            spec.cutoff_hz,
            spec.stopband_edge_hz()
        );

        Ok(Self {
            sections,
            order,
            sample_rate_hz,
        })
    }

    pub fn sections(&self) -> &[[f64; 6]] {
        &self.sections
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }

    /// Filters a finite buffer from zero initial conditions, one section at a
    /// time (direct form II transposed).
    pub fn apply(&self, samples: &[Complex64]) -> Vec<Complex64> {
        let mut output = samples.to_vec();
        for section in &self.sections {
            let [b0, b1, b2, _, a1, a2] = *section;
            let mut z1 = Complex64::new(0.0, 0.0);
            let mut z2 = Complex64::new(0.0, 0.0);
            for value in output.iter_mut() {
                let x = *value;
                let y = b0 * x + z1;
                z1 = b1 * x - a1 * y + z2;
                z2 = b2 * x - a2 * y;
                *value = y;
            }
        }
        output
    }

    /// Complex response at `freq_hz`.
    pub fn frequency_response(&self, freq_hz: f64) -> Complex64 {
        let omega = 2.0 * PI * freq_hz / self.sample_rate_hz;
        let z_inv = Complex64::from_polar(1.0, -omega);
        let z_inv2 = z_inv * z_inv;
        self.sections
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, [b0, b1, b2, a0, a1, a2]| {
                let numerator = *b0 + *b1 * z_inv + *b2 * z_inv2;
                let denominator = *a0 + *a1 * z_inv + *a2 * z_inv2;
                acc * numerator / denominator
            })
    }

    pub fn magnitude_db(&self, freq_hz: f64) -> f64 {
        20.0 * self.frequency_response(freq_hz).norm().log10()
    }
}

/// Smallest order whose elliptic response meets both band constraints.
/// `wp`/`ws` are band edges normalized to Nyquist.
fn minimum_order(wp: f64, ws: f64, ripple_db: f64, attenuation_db: f64) -> usize {
    let passband = (PI * wp / 2.0).tan();
    let stopband = (PI * ws / 2.0).tan();
    let selectivity = passband / stopband;

    let g_stop = 10f64.powf(0.1 * attenuation_db);
    let g_pass = 10f64.powf(0.1 * ripple_db);
    let discrimination = ((g_pass - 1.0) / (g_stop - 1.0)).sqrt();

    let k0 = selectivity * selectivity;
    let k1 = discrimination * discrimination;
    let order = (ellipk(k0) * ellipkm1(k1) / (ellipkm1(k0) * ellipk(k1))).ceil();
    (order as usize).max(1)
}

type Zpk = (Vec<Complex64>, Vec<Complex64>, f64);

/// Normalized analog elliptic low-pass with unit passband edge.
fn analog_prototype(order: usize, ripple_db: f64, attenuation_db: f64) -> ProcessingResult<Zpk> {
    let eps_sq = 10f64.powf(0.1 * ripple_db) - 1.0;
    if order == 1 {
        let pole = -(1.0 / eps_sq).sqrt();
        return Ok((Vec::new(), vec![Complex64::new(pole, 0.0)], -pole));
    }

    let eps = eps_sq.sqrt();
    let ck1 = eps / (10f64.powf(0.1 * attenuation_db) - 1.0).sqrt();
    let ck1_sq = ck1 * ck1;
    if ck1_sq >= 1.0 {
        return Err(ProcessingError::InvalidFilterSpec(
            "ripple and attenuation leave no usable discrimination".into(),
        ));
    }
    let k_ck1 = ellipk(ck1_sq);

    let m = ellipdeg(order, ck1_sq);
    let capk = ellipk(m);

    let jacobi: Vec<(f64, f64, f64)> = ((1 - order % 2)..order)
        .step_by(2)
        .map(|j| ellipj(j as f64 * capk / order as f64, m))
        .collect();

    let mut zeros: Vec<Complex64> = jacobi
        .iter()
        .filter(|(sn, _, _)| sn.abs() > f64::EPSILON)
        .map(|(sn, _, _)| Complex64::new(0.0, 1.0 / (m.sqrt() * sn)))
        .collect();
    let conjugates: Vec<Complex64> = zeros.iter().map(|z| z.conj()).collect();
    zeros.extend(conjugates);

    let r = arc_jac_sc1(1.0 / eps, ck1_sq).ok_or_else(|| {
        ProcessingError::InvalidFilterSpec("inverse Jacobi function failed to converge".into())
    })?;
    let v0 = capk * r / (order as f64 * k_ck1);
    let (sv, cv, dv) = ellipj(v0, 1.0 - m);

    let mut poles: Vec<Complex64> = jacobi
        .iter()
        .map(|&(s, c, d)| {
            let numerator = Complex64::new(c * d * sv * cv, s * dv);
            -numerator / (1.0 - (d * sv).powi(2))
        })
        .collect();
    if order % 2 == 1 {
        let norm = poles.iter().map(|p| p.norm_sqr()).sum::<f64>().sqrt();
        let complex_poles: Vec<Complex64> = poles
            .iter()
            .filter(|p| p.im.abs() > f64::EPSILON * norm)
            .map(|p| p.conj())
            .collect();
        poles.extend(complex_poles);
    } else {
        let conjugates: Vec<Complex64> = poles.iter().map(|p| p.conj()).collect();
        poles.extend(conjugates);
    }

    let pole_product = poles.iter().fold(Complex64::new(1.0, 0.0), |acc, &p| acc * -p);
    let zero_product = zeros.iter().fold(Complex64::new(1.0, 0.0), |acc, &z| acc * -z);
    let mut gain = (pole_product / zero_product).re;
    if order % 2 == 0 {
        gain /= (1.0 + eps_sq).sqrt();
    }
    Ok((zeros, poles, gain))
}

fn scale_frequency(zeros: Vec<Complex64>, poles: Vec<Complex64>, gain: f64, wo: f64) -> Zpk {
    let degree = poles.len() as i32 - zeros.len() as i32;
    (
        zeros.into_iter().map(|z| z * wo).collect(),
        poles.into_iter().map(|p| p * wo).collect(),
        gain * wo.powi(degree),
    )
}

fn bilinear(zeros: Vec<Complex64>, poles: Vec<Complex64>, gain: f64, fs: f64) -> Zpk {
    let fs2 = 2.0 * fs;
    let degree = poles.len() - zeros.len();
    let zero_factor = zeros.iter().fold(Complex64::new(1.0, 0.0), |acc, &z| acc * (fs2 - z));
    let pole_factor = poles.iter().fold(Complex64::new(1.0, 0.0), |acc, &p| acc * (fs2 - p));

    let mut digital_zeros: Vec<Complex64> = zeros.iter().map(|&z| (fs2 + z) / (fs2 - z)).collect();
    digital_zeros.extend(std::iter::repeat(Complex64::new(-1.0, 0.0)).take(degree));
    let digital_poles = poles.iter().map(|&p| (fs2 + p) / (fs2 - p)).collect();
    (digital_zeros, digital_poles, gain * (zero_factor / pole_factor).re)
}

/// Groups conjugate pole pairs (and leftover real poles) with their nearest
/// zeros. Sections are ordered so the poles closest to the unit circle run
/// last; the overall gain is folded into the first section.
fn pair_sections(zeros: &[Complex64], poles: &[Complex64], gain: f64) -> Vec<[f64; 6]> {
    let mut complex_zeros: Vec<Complex64> = zeros.iter().copied().filter(|z| z.im > PAIRING_TOL).collect();
    let mut real_zeros: Vec<f64> = zeros
        .iter()
        .filter(|z| z.im.abs() <= PAIRING_TOL)
        .map(|z| z.re)
        .collect();

    enum PoleGroup {
        Conjugate(Complex64),
        Real(Vec<f64>),
    }

    let mut real_poles: Vec<f64> = poles
        .iter()
        .filter(|p| p.im.abs() <= PAIRING_TOL)
        .map(|p| p.re)
        .collect();
    real_poles.sort_by(|a, b| b.abs().total_cmp(&a.abs()));

    let mut groups: Vec<(f64, PoleGroup)> = poles
        .iter()
        .filter(|p| p.im > PAIRING_TOL)
        .map(|p| (p.norm(), PoleGroup::Conjugate(*p)))
        .collect();
    for chunk in real_poles.chunks(2) {
        let radius = chunk.iter().fold(0.0f64, |acc, p| acc.max(p.abs()));
        groups.push((radius, PoleGroup::Real(chunk.to_vec())));
    }
    groups.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut sections = Vec::with_capacity(groups.len());
    for (_, group) in groups {
        let (denominator, target, wants_pair) = match group {
            PoleGroup::Conjugate(p) => ([1.0, -2.0 * p.re, p.norm_sqr()], p, true),
            PoleGroup::Real(reals) if reals.len() == 2 => (
                [1.0, -(reals[0] + reals[1]), reals[0] * reals[1]],
                Complex64::new(reals[0], 0.0),
                true,
            ),
            PoleGroup::Real(reals) => ([1.0, -reals[0], 0.0], Complex64::new(reals[0], 0.0), false),
        };
        let numerator = take_zeros(&mut complex_zeros, &mut real_zeros, target, wants_pair);
        sections.push([
            numerator[0],
            numerator[1],
            numerator[2],
            denominator[0],
            denominator[1],
            denominator[2],
        ]);
    }
    sections.reverse();

    if let Some(first) = sections.first_mut() {
        for coefficient in first.iter_mut().take(3) {
            *coefficient *= gain;
        }
    } else {
        sections.push([gain, 0.0, 0.0, 1.0, 0.0, 0.0]);
    }
    sections
}

fn take_zeros(
    complex_zeros: &mut Vec<Complex64>,
    real_zeros: &mut Vec<f64>,
    target: Complex64,
    wants_pair: bool,
) -> [f64; 3] {
    if wants_pair {
        if target.im > PAIRING_TOL || real_zeros.len() < 2 {
            if let Some(index) = nearest(complex_zeros, target) {
                let z = complex_zeros.swap_remove(index);
                return [1.0, -2.0 * z.re, z.norm_sqr()];
            }
        }
        if real_zeros.len() >= 2 {
            let a = real_zeros.remove(0);
            let b = real_zeros.remove(0);
            return [1.0, -(a + b), a * b];
        }
    }
    if !real_zeros.is_empty() {
        let a = real_zeros.remove(0);
        return [1.0, -a, 0.0];
    }
    if let Some(index) = nearest(complex_zeros, target) {
        let z = complex_zeros.swap_remove(index);
        return [1.0, -2.0 * z.re, z.norm_sqr()];
    }
    [1.0, 0.0, 0.0]
}

fn nearest(candidates: &[Complex64], target: Complex64) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (**a - target).norm().total_cmp(&(**b - target).norm()))
        .map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(ripple: f64, attenuation: f64, cutoff: f64, width: f64) -> FilterSpec {
        FilterSpec {
            passband_ripple_db: ripple,
            stopband_attenuation_db: attenuation,
            cutoff_hz: cutoff,
            transition_width_hz: width,
        }
    }

    #[test]
    fn design_meets_band_constraints() {
        let cases = [
            (spec(0.1, 40.0, 5e6, 1e6), 14e6, 4),
            (spec(0.1, 40.0, 10e3, 5e3), 56e3, 5),
            (spec(1.0, 60.0, 1e5, 2e4), 1e6, 7),
        ];
        for (filter_spec, fs, expected_order) in cases {
            let filter = SosFilter::design_elliptic_lowpass(&filter_spec, fs).unwrap();
            assert_eq!(filter.order(), expected_order);
            assert_eq!(filter.sections().len(), (expected_order + 1) / 2);
            for fraction in [0.0, 0.25, 0.5, 0.75, 1.0] {
                let gain = filter.magnitude_db(fraction * filter_spec.cutoff_hz);
                assert!(gain <= 1e-6 && gain >= -filter_spec.passband_ripple_db - 1e-6, "{}", gain);
            }
            let stop = filter_spec.stopband_edge_hz();
            for freq in [stop, 0.5 * (stop + fs / 2.0), 0.99 * fs / 2.0] {
                assert!(filter.magnitude_db(freq) <= -filter_spec.stopband_attenuation_db + 1e-6);
            }
        }
    }

    #[test]
    fn sections_are_stable() {
        let filter = SosFilter::design_elliptic_lowpass(&spec(0.1, 60.0, 1e5, 1e4), 1e6).unwrap();
        for [_, _, _, a0, a1, a2] in filter.sections() {
            assert_eq!(*a0, 1.0);
            assert!(a2.abs() < 1.0 && a1.abs() < 1.0 + a2);
        }
    }

    #[test]
    fn zero_buffer_stays_zero() {
        let filter = SosFilter::design_elliptic_lowpass(&spec(0.1, 40.0, 5e6, 1e6), 14e6).unwrap();
        let filtered = filter.apply(&vec![Complex64::new(0.0, 0.0); 256]);
        assert_eq!(filtered.len(), 256);
        assert!(filtered.iter().all(|x| x.re == 0.0 && x.im == 0.0));
    }

    #[test]
    fn dc_settles_to_passband_gain_and_stopband_tone_is_rejected() {
        let filter_spec = spec(0.1, 40.0, 10e3, 5e3);
        let fs = 56e3;
        let filter = SosFilter::design_elliptic_lowpass(&filter_spec, fs).unwrap();
        let dc = filter.apply(&vec![Complex64::new(1.0, 0.0); 4000]);
        assert!((dc[3999].re - 1.0).abs() < 1e-6);

        let tone_hz = 22.5e3;
        let tone: Vec<Complex64> = (0..4000)
            .map(|n| Complex64::from_polar(1.0, 2.0 * PI * tone_hz * n as f64 / fs))
            .collect();
        let filtered = filter.apply(&tone);
        assert!(20.0 * filtered[3999].norm().log10() < -40.0);
    }

    #[test]
    fn stopband_past_nyquist_is_rejected() {
        let err = SosFilter::design_elliptic_lowpass(&spec(0.1, 40.0, 5e6, 8e6), 14e6).unwrap_err();
        assert!(matches!(err, ProcessingError::InvalidFilterSpec(_)));
    }

    #[test]
    fn enbw_estimate_spans_both_sidebands() {
        assert_eq!(spec(0.1, 40.0, 5e6, 1e6).approximate_enbw_hz(), 12e6);
    }
}
