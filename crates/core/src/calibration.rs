//! Calibration of sample size, order statistic and confidence.
//!
//! Follows the sensitivity-sampling analysis of Rubinstein & Aldà (ICML 2017):
//! taking the `k`-th order statistic of `m` i.i.d. sensitivity samples yields
//! a bound that fails with probability at most `gamma`, where `rho` is the
//! tail mass left uncovered by the empirical quantile.

use crate::error::{Result, SamplingError};
use crate::special::lambert_w_m1;

/// Relative slack under which a value snaps to the nearest integer before `ceil`.
const ROUNDOFF: f64 = 1e-9;

/// Largest trial count representable exactly as an `f64`.
const MAX_TRIALS: f64 = 9_007_199_254_740_992.0;

/// How the caller pins down the sampling parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CalibrationMode {
    /// Derive the smallest sufficient `m` for a target `gamma`.
    FromConfidence {
        /// Target confidence parameter in `(0, 1)`.
        gamma: f64,
    },
    /// Derive the best `gamma` achievable with `m` trials (`k = m`).
    FromSampleSize {
        /// Number of trials.
        m: usize,
    },
    /// Fix both `m` and `gamma` and derive the matching `k`.
    FromBoth {
        /// Number of trials.
        m: usize,
        /// Target confidence parameter in `(0, 1)`.
        gamma: f64,
    },
}

impl CalibrationMode {
    /// Select a mode from optional caller inputs.
    pub fn from_options(m: Option<usize>, gamma: Option<f64>) -> Result<Self> {
        match (m, gamma) {
            (None, None) => Err(SamplingError::invalid(
                "at least one of the sample size m or the confidence gamma must be given",
            )),
            (None, Some(gamma)) => Ok(Self::FromConfidence { gamma }),
            (Some(m), None) => Ok(Self::FromSampleSize { m }),
            (Some(m), Some(gamma)) => Ok(Self::FromBoth { m, gamma }),
        }
    }

    /// Solve for the full parameter set.
    pub fn calibrate(self) -> Result<SamplingParameters> {
        let params = match self {
            Self::FromConfidence { gamma } => from_confidence(gamma)?,
            Self::FromSampleSize { m } => from_sample_size(m)?,
            Self::FromBoth { m, gamma } => from_both(m, gamma)?,
        };
        tracing::debug!(
            mode = ?self,
            m = params.m,
            k = params.k,
            gamma = params.gamma,
            rho = params.rho,
            "calibrated sensitivity sampler"
        );
        Ok(params)
    }
}

/// Solved parameters for one sampling run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplingParameters {
    m: usize,
    gamma: f64,
    k: usize,
    rho: f64,
}

impl SamplingParameters {
    /// Build parameters directly, checking every range invariant.
    pub fn new(m: usize, gamma: f64, k: usize, rho: f64) -> Result<Self> {
        if m == 0 {
            return Err(SamplingError::invalid("m must be positive"));
        }
        check_gamma(gamma)?;
        if k == 0 || k > m {
            return Err(SamplingError::invalid(format!(
                "order statistic k = {k} must lie in [1, {m}]"
            )));
        }
        check_rho(rho)?;
        Ok(Self { m, gamma, k, rho })
    }

    /// Number of trials.
    pub fn m(&self) -> usize {
        self.m
    }

    /// Confidence parameter of the bound.
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// 1-based order statistic reported as the bound.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Robustness (uncovered tail) parameter.
    pub fn rho(&self) -> f64 {
        self.rho
    }
}

/// Solve for the full parameter set from optional `m` and `gamma`.
pub fn calibrate(m: Option<usize>, gamma: Option<f64>) -> Result<SamplingParameters> {
    CalibrationMode::from_options(m, gamma)?.calibrate()
}

fn from_confidence(gamma: f64) -> Result<SamplingParameters> {
    check_gamma(gamma)?;
    let w = lambert_w_m1(-gamma / (2.0 * 0.5f64.exp()))?;
    let rho = (w + 0.5).exp();
    check_rho(rho)?;
    check_gamma_exceeds_rho(gamma, rho)?;

    let m_real = (1.0 / rho).ln() / (2.0 * (gamma - rho).powi(2));
    let m = to_count(ceil_snapped(m_real), "sample size m")?.max(1);
    let gamma_lo = lower_confidence(rho, m)?;
    let k = order_index(m, gamma, gamma_lo)?;
    Ok(SamplingParameters { m, gamma, k, rho })
}

fn from_sample_size(m: usize) -> Result<SamplingParameters> {
    let rho = rho_for_sample_size(m)?;
    let gamma = lower_confidence(rho, m)?;
    if gamma >= 1.0 {
        return Err(SamplingError::numeric(format!(
            "m = {m} trials cannot certify any confidence (derived gamma = {gamma:.4})"
        )));
    }
    Ok(SamplingParameters {
        m,
        gamma,
        k: m,
        rho,
    })
}

fn from_both(m: usize, gamma: f64) -> Result<SamplingParameters> {
    check_gamma(gamma)?;
    let rho = rho_for_sample_size(m)?;
    check_gamma_exceeds_rho(gamma, rho)?;
    let gamma_lo = lower_confidence(rho, m)?;
    let k = order_index(m, gamma, gamma_lo)?;
    Ok(SamplingParameters { m, gamma, k, rho })
}

fn rho_for_sample_size(m: usize) -> Result<f64> {
    if m == 0 {
        return Err(SamplingError::invalid("sample size m must be positive"));
    }
    let w = lambert_w_m1(-1.0 / (4.0 * m as f64))?;
    let rho = (w / 2.0).exp();
    check_rho(rho)?;
    Ok(rho)
}

/// Smallest confidence parameter certified by `m` trials at robustness `rho`.
fn lower_confidence(rho: f64, m: usize) -> Result<f64> {
    let arg = (1.0 / rho).ln() / (2.0 * m as f64);
    if !arg.is_finite() || arg <= 0.0 {
        return Err(SamplingError::numeric(format!(
            "ln(1/rho) / 2m = {arg} is not a positive finite number"
        )));
    }
    Ok(rho + arg.sqrt())
}

fn order_index(m: usize, gamma: f64, gamma_lo: f64) -> Result<usize> {
    let raw = ceil_snapped(m as f64 * (1.0 - gamma + gamma_lo));
    if !raw.is_finite() {
        return Err(SamplingError::numeric("order statistic index is not finite"));
    }
    if raw < 1.0 || raw > m as f64 {
        return Err(SamplingError::invalid(format!(
            "order statistic k = {raw} falls outside [1, {m}]; \
             gamma = {gamma} is below the {gamma_lo:.6} achievable with m = {m}"
        )));
    }
    Ok(raw as usize)
}

fn check_gamma(gamma: f64) -> Result<()> {
    if !gamma.is_finite() || gamma <= 0.0 || gamma >= 1.0 {
        return Err(SamplingError::invalid(format!(
            "gamma must lie in (0, 1), got {gamma}"
        )));
    }
    Ok(())
}

fn check_rho(rho: f64) -> Result<()> {
    if !rho.is_finite() || rho <= 0.0 || rho >= 1.0 {
        return Err(SamplingError::numeric(format!(
            "rho must lie in (0, 1), got {rho}"
        )));
    }
    Ok(())
}

fn check_gamma_exceeds_rho(gamma: f64, rho: f64) -> Result<()> {
    if gamma <= rho {
        return Err(SamplingError::numeric(format!(
            "gamma = {gamma} must exceed rho = {rho}"
        )));
    }
    Ok(())
}

fn ceil_snapped(x: f64) -> f64 {
    let nearest = x.round();
    if (x - nearest).abs() <= ROUNDOFF * nearest.abs().max(1.0) {
        nearest
    } else {
        x.ceil()
    }
}

fn to_count(x: f64, what: &str) -> Result<usize> {
    if !x.is_finite() || x < 0.0 || x > MAX_TRIALS || x > usize::MAX as f64 {
        return Err(SamplingError::numeric(format!(
            "{what} = {x} is not a representable count"
        )));
    }
    Ok(x as usize)
}
