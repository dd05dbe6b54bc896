use ndarray::ArrayView2;
use num_complex::Complex64;

use crate::prelude::{ProcessingError, ProcessingResult};

pub struct MatrixHelper;

impl MatrixHelper {
    /// Views the leading `rows * cols` samples as consecutive, non-overlapping
    /// rows. Samples past the last full row are ignored.
    pub fn frames(
        samples: &[Complex64],
        rows: usize,
        cols: usize,
    ) -> ProcessingResult<ArrayView2<'_, Complex64>> {
        let needed = rows.checked_mul(cols).ok_or_else(|| {
            ProcessingError::InvalidParameter(format!("{} x {} frame shape overflows", rows, cols))
        })?;
        if needed > samples.len() {
            return Err(ProcessingError::InsufficientSamples(format!(
                "{} x {} frames need {} samples, capture has {}",
                rows,
                cols,
                needed,
                samples.len()
            )));
        }
        ArrayView2::from_shape((rows, cols), &samples[..needed])
            .map_err(|err| ProcessingError::InvalidParameter(err.to_string()))
    }
}
