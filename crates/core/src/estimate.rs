//! Reduction of trial samples into a sensitivity estimate.

use statrs::statistics::{Data, OrderStatistics};

use crate::calibration::SamplingParameters;
use crate::error::{Result, SamplingError};

/// Result of a sensitivity-sampling run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensitivityEstimate {
    /// The `k`-th smallest trial sample; the bound to calibrate noise with.
    pub sensitivity: f64,
    /// Mean of all trial samples. Diagnostic only.
    pub mean: f64,
    /// Parameters the run was executed with.
    pub parameters: SamplingParameters,
}

impl From<SensitivityEstimate> for (f64, f64) {
    fn from(estimate: SensitivityEstimate) -> Self {
        (estimate.sensitivity, estimate.mean)
    }
}

/// Reduce samples to `(k-th smallest, mean)` with `k` 1-based.
pub fn reduce_samples(samples: Vec<f64>, k: usize) -> Result<(f64, f64)> {
    if samples.is_empty() {
        return Err(SamplingError::invalid("cannot reduce an empty sample set"));
    }
    if k == 0 || k > samples.len() {
        return Err(SamplingError::invalid(format!(
            "order statistic k = {k} must lie in [1, {}]",
            samples.len()
        )));
    }
    if samples.iter().any(|x| x.is_nan()) {
        return Err(SamplingError::numeric("sensitivity samples contain NaN"));
    }

    // Plain sum: a running mean turns `inf - inf` into NaN.
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    let bound = Data::new(samples).order_statistic(k);
    Ok((bound, mean))
}

/// Check a single trial sample against the norm contract.
pub fn check_sample(trial: usize, value: f64) -> Result<f64> {
    if value.is_nan() || value < 0.0 {
        return Err(SamplingError::contract(
            trial,
            format!("norm returned {value}; samples must be non-negative"),
        ));
    }
    Ok(value)
}
