use num_complex::Complex64;
use rustfft::{num_traits::Zero, Fft, FftPlanner};

/// Helper that wraps the `rustfft` planner for reuse across frames.
pub struct FftHelper {
    fft: std::sync::Arc<dyn Fft<f64>>,
    scratch: Vec<Complex64>,
    size: usize,
}

impl FftHelper {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let scratch = vec![Complex64::zero(); fft.get_inplace_scratch_len()];
        Self { fft, scratch, size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// In-place forward transform scaled by `1/N`, so bin 0 holds the frame's
    /// mean value.
    pub fn forward_normalized(&mut self, frame: &mut [Complex64]) {
        debug_assert_eq!(frame.len(), self.size);
        self.fft.process_with_scratch(frame, &mut self.scratch);
        let scale = 1.0 / self.size as f64;
        for bin in frame.iter_mut() {
            *bin *= scale;
        }
    }
}

/// Reorders bins so index 0 is the most negative frequency.
pub fn fft_shift<T: Clone>(values: &[T]) -> Vec<T> {
    let mut shifted = values.to_vec();
    shifted.rotate_right(values.len() / 2);
    shifted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_normalized_puts_mean_in_dc_bin() {
        let mut helper = FftHelper::new(4);
        let mut frame = vec![Complex64::new(2.0, -1.0); 4];
        helper.forward_normalized(&mut frame);
        assert!((frame[0] - Complex64::new(2.0, -1.0)).norm() < 1e-12);
        assert!(frame[1..].iter().all(|bin| bin.norm() < 1e-12));
    }

    #[test]
    fn fft_shift_matches_even_and_odd_lengths() {
        assert_eq!(fft_shift(&[0, 1, 2, 3]), vec![2, 3, 0, 1]);
        assert_eq!(fft_shift(&[0, 1, 2, 3, 4]), vec![3, 4, 0, 1, 2]);
    }
}
