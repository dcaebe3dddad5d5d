use nalgebra as na;
use num_traits::Float;

use crate::error::Error;

const GAMMA_EPS: f64 = 1e-14;
const GAMMA_MAX_ITER: usize = 500;

/// Squared Mahalanobis distance `γᵀ S⁻¹ γ` of residual `γ` under
/// innovation covariance `S`.
pub fn mahalanobis_squared(
    residual: &na::DVector<f64>,
    s: &na::DMatrix<f64>,
) -> Result<f64, Error> {
    if !s.is_square() || s.nrows() != residual.len() {
        return Err(Error::DimensionMismatch {
            expected: residual.len(),
            actual: s.nrows(),
        });
    }

    let s_inv = s.clone().try_inverse().ok_or(Error::DegenerateGate)?;
    let d2 = residual.dot(&(s_inv * residual));

    if !d2.is_finite() || d2 < 0.0 {
        return Err(Error::DegenerateGate);
    }

    Ok(d2)
}

/// Lanczos approximation of `ln Γ(x)` for `x > 0`.
fn ln_gamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    const COEF: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if x < 0.5 {
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }

    let x = x - 1.0;
    let mut a = COEF[0];
    let t = x + G + 0.5;
    for (i, c) in COEF.iter().enumerate().skip(1) {
        a += c / (x + i as f64);
    }

    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + a.ln()
}

/// Regularized lower incomplete gamma function `P(a, x)`.
fn gamma_p(a: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }

    let ln_prefix = a * x.ln() - x - ln_gamma(a);

    if x < a + 1.0 {
        // series
        let mut ap = a;
        let mut del = 1.0 / a;
        let mut sum = del;
        for _ in 0..GAMMA_MAX_ITER {
            ap += 1.0;
            del *= x / ap;
            sum += del;
            if del.abs() < sum.abs() * GAMMA_EPS {
                break;
            }
        }

        (sum.ln() + ln_prefix).exp().min(1.0)
    } else {
        // continued fraction for Q(a, x), modified Lentz
        let tiny = f64::MIN_POSITIVE / GAMMA_EPS;
        let mut b = x + 1.0 - a;
        let mut c = 1.0 / tiny;
        let mut d = 1.0 / b;
        let mut h = d;
        for i in 1..GAMMA_MAX_ITER {
            let an = -(i as f64) * (i as f64 - a);
            b += 2.0;
            d = an * d + b;
            if d.abs() < tiny {
                d = tiny;
            }
            c = b + an / c;
            if c.abs() < tiny {
                c = tiny;
            }
            d = 1.0 / d;
            let del = d * c;
            h *= del;
            if (del - 1.0).abs() < GAMMA_EPS {
                break;
            }
        }

        (1.0 - (ln_prefix.exp() * h)).max(0.0)
    }
}

/// Cumulative distribution function of the chi-square distribution.
pub fn chi2_cdf(x: f64, dof: usize) -> f64 {
    if dof == 0 {
        return if x >= 0.0 { 1.0 } else { 0.0 };
    }

    gamma_p(dof as f64 / 2.0, x / 2.0)
}

/// Inverse CDF of the chi-square distribution, i.e. the gate threshold for
/// a confidence level `p` in `(0, 1)` and `dof` degrees of freedom.
pub fn chi2_quantile(p: f64, dof: usize) -> Option<f64> {
    if !(p > 0.0 && p < 1.0) || dof == 0 {
        return None;
    }

    let mut lo = 0.0;
    let mut hi = dof as f64 + 10.0;
    while chi2_cdf(hi, dof) < p {
        lo = hi;
        hi *= 2.0;
    }

    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if chi2_cdf(mid, dof) < p {
            lo = mid;
        } else {
            hi = mid;
        }

        if hi - lo < 1e-12 * hi.max(1.0) {
            break;
        }
    }

    Some(0.5 * (lo + hi))
}

/// `q`-th percentile (0..=100) with linear interpolation between the two
/// closest ranks. Returns `None` for an empty input.
pub fn percentile<T: Float>(values: &[T], q: f64) -> Option<T> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = q.clamp(0.0, 100.0) / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = T::from(rank - lower as f64)?;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}
