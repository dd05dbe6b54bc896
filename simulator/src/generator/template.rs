use num_complex::Complex64;
use rand::Rng;
use std::f64::consts::PI;

/// Complex exponential at `frequency_hz` with peak `amplitude` volts.
pub fn complex_tone(
    length: usize,
    frequency_hz: f64,
    sample_rate_hz: f64,
    amplitude: f64,
) -> Vec<Complex64> {
    (0..length)
        .map(|n| {
            let phase = 2.0 * PI * frequency_hz * n as f64 / sample_rate_hz;
            Complex64::from_polar(amplitude, phase)
        })
        .collect()
}

/// Circular complex Gaussian noise with `E|x|^2 = mean_square`.
pub fn complex_gaussian_noise<R: Rng>(rng: &mut R, length: usize, mean_square: f64) -> Vec<Complex64> {
    let sigma = (mean_square / 2.0).sqrt();
    (0..length)
        .map(|_| {
            // Box-Muller; 1 - u keeps the logarithm finite
            let u1: f64 = 1.0 - rng.gen::<f64>();
            let u2: f64 = rng.gen();
            let radius = (-2.0 * u1.ln()).sqrt();
            let angle = 2.0 * PI * u2;
            Complex64::new(sigma * radius * angle.cos(), sigma * radius * angle.sin())
        })
        .collect()
}
