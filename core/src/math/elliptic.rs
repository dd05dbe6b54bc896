//! Elliptic integrals and Jacobi elliptic functions for Cauer filter design.
//!
//! All functions take the parameter `m = k^2`, not the modulus `k`.

use num_complex::Complex64;
use std::f64::consts::{FRAC_PI_2, PI};

const MACHEP: f64 = f64::EPSILON;
const LANDEN_MAX_ITER: usize = 10;
const NOME_TERMS: i32 = 7;

fn arithmetic_geometric_mean(mut a: f64, mut b: f64) -> f64 {
    for _ in 0..64 {
        if (a - b).abs() <= MACHEP * a {
            break;
        }
        let next_b = (a * b).sqrt();
        a = 0.5 * (a + b);
        b = next_b;
    }
    a
}

/// Complete elliptic integral of the first kind, `K(m)`.
pub fn ellipk(m: f64) -> f64 {
    FRAC_PI_2 / arithmetic_geometric_mean(1.0, (1.0 - m).sqrt())
}

/// `K(1 - p)`, accurate for small `p`.
pub fn ellipkm1(p: f64) -> f64 {
    FRAC_PI_2 / arithmetic_geometric_mean(1.0, p.sqrt())
}

/// Jacobi elliptic functions `(sn, cn, dn)` of real argument `u`.
pub fn ellipj(u: f64, m: f64) -> (f64, f64, f64) {
    if m < 1e-9 {
        let t = u.sin();
        let b = u.cos();
        let ai = 0.25 * m * (u - t * b);
        return (t - ai * b, b + ai * t, 1.0 - 0.5 * m * t * t);
    }
    if m >= 0.9999999999 {
        let mut ai = 0.25 * (1.0 - m);
        let b = u.cosh();
        let t = u.tanh();
        let phi = 1.0 / b;
        let twon = b * u.sinh();
        let sn = t + ai * (twon - u) / (b * b);
        ai *= t * phi;
        return (sn, phi - ai * (twon - u), phi + ai * (twon + u));
    }

    // descending Landen / AGM recursion
    let mut a = [0.0f64; 9];
    let mut c = [0.0f64; 9];
    a[0] = 1.0;
    c[0] = m.sqrt();
    let mut b = (1.0 - m).sqrt();
    let mut twon = 1.0;
    let mut i = 0;
    while (c[i] / a[i]).abs() > MACHEP && i < 8 {
        let ai = a[i];
        i += 1;
        c[i] = 0.5 * (ai - b);
        let t = (ai * b).sqrt();
        a[i] = 0.5 * (ai + b);
        b = t;
        twon *= 2.0;
    }

    let mut phi = twon * a[i] * u;
    let mut previous = phi;
    while i > 0 {
        let t = c[i] * phi.sin() / a[i];
        previous = phi;
        phi = 0.5 * (t.asin() + phi);
        i -= 1;
    }
    let cn = phi.cos();
    (phi.sin(), cn, cn / (phi - previous).cos())
}

fn complement(k: Complex64) -> Complex64 {
    ((1.0 - k) * (1.0 + k)).sqrt()
}

/// Inverse Jacobi `sn` for complex argument via descending Landen transforms.
fn arc_jac_sn(w: Complex64, m: f64) -> Option<Complex64> {
    let k = m.sqrt();
    if !(0.0..=1.0).contains(&k) {
        return None;
    }
    if k == 1.0 {
        return Some(w.atanh());
    }

    let mut moduli = vec![k];
    while let Some(&last) = moduli.last() {
        if last == 0.0 {
            break;
        }
        if moduli.len() > LANDEN_MAX_ITER {
            return None;
        }
        let last_complement = ((1.0 - last) * (1.0 + last)).sqrt();
        moduli.push((1.0 - last_complement) / (1.0 + last_complement));
    }

    let capk = moduli[1..].iter().fold(FRAC_PI_2, |acc, kn| acc * (1.0 + kn));
    let mut wn = w;
    for pair in moduli.windows(2) {
        let (kn, knext) = (pair[0], pair[1]);
        wn = 2.0 * wn / ((1.0 + knext) * (1.0 + complement(kn * wn)));
    }
    Some(capk * 2.0 / PI * wn.asin())
}

/// Real inverse of Jacobi `sc` with complementary parameter:
/// `v` such that `sc(v, 1 - m) = w`.
pub fn arc_jac_sc1(w: f64, m: f64) -> Option<f64> {
    let z = arc_jac_sn(Complex64::new(0.0, w), m)?;
    if z.re.abs() > 1e-14 {
        return None;
    }
    Some(z.im)
}

/// Solves the degree equation `K'(m)/K(m) = n K'(m1)/K(m1)` for `m` using
/// the nome series.
pub fn ellipdeg(n: usize, m1: f64) -> f64 {
    let k1 = ellipk(m1);
    let k1p = ellipkm1(m1);
    let q1 = (-PI * k1p / k1).exp();
    let q = q1.powf(1.0 / n as f64);
    let numerator: f64 = (0..=NOME_TERMS).map(|i| q.powi(i * (i + 1))).sum();
    let denominator: f64 = 1.0 + 2.0 * (1..=NOME_TERMS + 1).map(|i| q.powi(i * i)).sum::<f64>();
    16.0 * q * (numerator / denominator).powi(4)
}
