use chrono::{DateTime, Utc};
use num_complex::Complex64;

/// One contiguous block of complex baseband samples from the analyzer.
#[derive(Debug, Clone)]
pub struct Capture {
    pub data: Vec<Complex64>,
    pub sample_rate_hz: f64,
    pub frequency_hz: f64,
    pub capture_time: DateTime<Utc>,
    pub overload: bool,
}

impl Capture {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Capture length in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        self.data.len() as f64 / self.sample_rate_hz * 1e3
    }
}
