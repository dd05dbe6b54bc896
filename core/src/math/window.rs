//! Periodic analysis windows and their correction factors.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Analysis window applied to each FFT frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WindowType {
    #[serde(alias = "boxcar", alias = "rect")]
    Rectangular,
    #[default]
    #[serde(alias = "hanning")]
    Hann,
    Hamming,
    Blackman,
    #[serde(alias = "blackmanharris")]
    BlackmanHarris,
    #[serde(alias = "flattop")]
    FlatTop,
}

impl WindowType {
    /// Generalized cosine coefficients for the window family.
    fn cosine_terms(self) -> &'static [f64] {
        match self {
            WindowType::Rectangular => &[1.0],
            WindowType::Hann => &[0.5, 0.5],
            WindowType::Hamming => &[0.54, 0.46],
            WindowType::Blackman => &[0.42, 0.5, 0.08],
            WindowType::BlackmanHarris => &[0.35875, 0.48829, 0.14128, 0.01168],
            WindowType::FlatTop => &[
                0.21557895,
                0.41663158,
                0.277263158,
                0.083578947,
                0.006947368,
            ],
        }
    }

    /// Periodic (DFT-even) window of `length` points.
    pub fn generate(self, length: usize) -> Vec<f64> {
        let terms = self.cosine_terms();
        (0..length)
            .map(|n| {
                let phase = 2.0 * PI * n as f64 / length as f64;
                terms
                    .iter()
                    .enumerate()
                    .map(|(k, &a)| {
                        let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
                        sign * a * (k as f64 * phase).cos()
                    })
                    .sum()
            })
            .collect()
    }
}

/// `sqrt(N / sum(w^2))`: restores the noise power removed by the window.
pub fn energy_correction(window: &[f64]) -> f64 {
    let energy: f64 = window.iter().map(|w| w * w).sum();
    (window.len() as f64 / energy).sqrt()
}
