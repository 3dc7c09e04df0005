//! Shapiro-Wilk normality diagnostic.
//!
//! Coefficients and p-value follow Royston's AS R94 approximation, which is valid
//! for 3 <= n <= 5000. Above that the same approximation is used and the caller is
//! told through a debug log line.

use log::debug;
use single_utilities::traits::FloatOps;
use statrs::distribution::{ContinuousCDF, Normal};
use std::cmp::Ordering;

use crate::testing::TestResult;

const C1: [f64; 6] = [0.0, 0.221157, -0.147981, -2.071190, 4.434685, -2.706056];
const C2: [f64; 6] = [0.0, 0.042981, -0.293762, -1.752461, 5.682633, -3.582633];
const C3: [f64; 4] = [0.5440, -0.39978, 0.025054, -6.714e-4];
const C4: [f64; 4] = [1.3822, -0.77857, 0.062767, -0.0020322];
const C5: [f64; 4] = [-1.5861, -0.31082, -0.083751, 0.0038915];
const C6: [f64; 3] = [-0.4803, -0.082676, 0.0030302];
const G: [f64; 2] = [-2.273, 0.459];

const SMALL: f64 = 1e-19;

/// Evaluate `c[0] + c[1] x + c[2] x^2 + ...`.
fn poly(c: &[f64], x: f64) -> f64 {
    c.iter().rev().fold(0.0, |acc, &coef| acc * x + coef)
}

/// Half of the antisymmetric Shapiro-Wilk coefficient vector (the weights applied
/// to `x[n-1-i] - x[i]`), normalised so the full vector has unit length.
fn coefficients(n: usize, normal: &Normal) -> Vec<f64> {
    let half = n / 2;
    if n == 3 {
        return vec![std::f64::consts::FRAC_1_SQRT_2];
    }

    let an = n as f64;
    let an25 = an + 0.25;
    let m: Vec<f64> = (1..=half)
        .map(|i| normal.inverse_cdf((i as f64 - 0.375) / an25))
        .collect();
    let summ2 = 2.0 * m.iter().map(|v| v * v).sum::<f64>();
    let ssumm2 = summ2.sqrt();
    let rsn = 1.0 / an.sqrt();

    let a1 = poly(&C1, rsn) - m[0] / ssumm2;
    let mut a = vec![0.0; half];
    a[0] = a1;

    let (first_free, fac) = if n > 5 {
        let a2 = -m[1] / ssumm2 + poly(&C2, rsn);
        a[1] = a2;
        let fac = ((summ2 - 2.0 * m[0] * m[0] - 2.0 * m[1] * m[1])
            / (1.0 - 2.0 * a1 * a1 - 2.0 * a2 * a2))
            .sqrt();
        (2, fac)
    } else {
        let fac = ((summ2 - 2.0 * m[0] * m[0]) / (1.0 - 2.0 * a1 * a1)).sqrt();
        (1, fac)
    };
    for i in first_free..half {
        a[i] = -m[i] / fac;
    }
    a
}

/// Shapiro-Wilk test of the null hypothesis that `values` come from a normal
/// distribution.
///
/// Returns W as the statistic. Fewer than 3 values, or any non-finite value, give
/// `W = NaN, p = 0` so that the sample is never taken as normal by accident.
pub fn shapiro_wilk<T>(values: &[T]) -> TestResult<f64>
where
    T: FloatOps,
{
    let mut x: Vec<f64> = values.iter().filter_map(|v| v.to_f64()).collect();
    let n = x.len();
    if n < 3 || x.iter().any(|v| !v.is_finite()) {
        return TestResult::new(f64::NAN, 0.0);
    }
    if n > 5000 {
        debug!("Shapiro-Wilk on {} values; p-value approximation is only calibrated up to 5000", n);
    }

    x.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let range = x[n - 1] - x[0];
    if range < SMALL {
        // Constant sample: W is 1 by convention.
        return TestResult::new(1.0, 1.0).with_metadata("n", n as f64);
    }

    let normal = Normal::new(0.0, 1.0).expect("standard normal parameters are valid");
    let a = coefficients(n, &normal);

    let mean = x.iter().sum::<f64>() / n as f64;
    let ssq: f64 = x.iter().map(|v| (v - mean) * (v - mean)).sum();
    let b: f64 = a
        .iter()
        .enumerate()
        .map(|(i, ai)| ai * (x[n - 1 - i] - x[i]))
        .sum();
    let w = (b * b / ssq).min(1.0);

    let p_value = shapiro_wilk_p_value(w, n, &normal);
    TestResult::new(w, p_value).with_metadata("n", n as f64)
}

fn shapiro_wilk_p_value(w: f64, n: usize, normal: &Normal) -> f64 {
    if n == 3 {
        const PI6: f64 = 6.0 / std::f64::consts::PI;
        const STQR: f64 = std::f64::consts::FRAC_PI_3;
        let w = w.max(0.75);
        return (PI6 * (w.sqrt().asin() - STQR)).clamp(0.0, 1.0);
    }

    let w1 = 1.0 - w;
    if w1 <= 0.0 {
        return 1.0;
    }
    let an = n as f64;
    let mut y = w1.ln();

    let (m, s) = if n <= 11 {
        let gamma = poly(&G, an);
        if y >= gamma {
            return 1e-99;
        }
        y = -(gamma - y).ln();
        (poly(&C3, an), poly(&C4, an).exp())
    } else {
        let xx = an.ln();
        (poly(&C5, xx), poly(&C6, xx).exp())
    };

    (1.0 - normal.cdf((y - m) / s)).clamp(0.0, 1.0)
}

/// True iff the Shapiro-Wilk p-value of `values` exceeds `alpha`.
///
/// Fewer than three observations give `false`: without evidence of normality the
/// caller falls back to a rank-based test.
pub fn is_approximately_normal<T>(values: &[T], alpha: f64) -> bool
where
    T: FloatOps,
{
    if values.len() < 3 {
        return false;
    }
    let result = shapiro_wilk(values);
    result.p_value > alpha
}
