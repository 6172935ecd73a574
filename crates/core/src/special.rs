//! Special functions used by calibration.

use std::f64::consts::E;

use crate::error::{Result, SamplingError};

const MAX_ITERS: usize = 64;

/// Lower branch `W_{-1}` of the Lambert W function.
///
/// Solves `w * exp(w) = z` for `w <= -1`, defined on `[-1/e, 0)`.
pub fn lambert_w_m1(z: f64) -> Result<f64> {
    let branch_point = -1.0 / E;
    if !z.is_finite() || z >= 0.0 || z < branch_point - 1e-15 {
        return Err(SamplingError::numeric(format!(
            "lower-branch Lambert W is defined on [-1/e, 0), got {z}"
        )));
    }

    // Distance from the branch point, where Halley's update degenerates.
    let q = (1.0 + E * z).max(0.0);
    if q < 1e-14 {
        return Ok(-1.0 - (2.0 * q).sqrt());
    }

    let mut w = initial_guess(z, q);
    for _ in 0..MAX_ITERS {
        let ew = w.exp();
        let f = w * ew - z;
        let wp1 = w + 1.0;
        let denom = ew * wp1 - (w + 2.0) * f / (2.0 * wp1);
        if denom == 0.0 || !denom.is_finite() {
            break;
        }
        let step = f / denom;
        w -= step;
        if step.abs() <= 4.0 * f64::EPSILON * (1.0 + w.abs()) {
            return Ok(w.min(-1.0));
        }
    }

    if (w * w.exp() - z).abs() <= 1e-12 * z.abs().max(1e-300) {
        Ok(w.min(-1.0))
    } else {
        Err(SamplingError::numeric(format!(
            "lower-branch Lambert W did not converge for z = {z}"
        )))
    }
}

fn initial_guess(z: f64, q: f64) -> f64 {
    if z < -0.25 {
        // Series around the branch point in p = -sqrt(2(1 + e z)).
        let p = -(2.0 * q).sqrt();
        -1.0 + p - p * p / 3.0 + 11.0 / 72.0 * p * p * p
    } else {
        // Asymptotic expansion as z -> 0-.
        let l1 = (-z).ln();
        let l2 = (-l1).ln();
        l1 - l2 + l2 / l1
    }
}
