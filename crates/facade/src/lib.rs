//! Sensitivity sampling for random differential privacy.
//!
//! Estimates an upper confidence bound on the sensitivity of an arbitrary
//! query by sampling neighboring datasets from a data oracle, following
//! Rubinstein & Aldà, "Pain-Free Random Differential Privacy with
//! Sensitivity Sampling" (ICML 2017).
//!
//! ```no_run
//! use sensitivity_sampling::{sample_sensitivity, BoxError, DistributionOracle, StreamKey};
//! use rand_distr::Normal;
//!
//! let oracle = DistributionOracle::<_, f64>::new(Normal::new(0.0, 1.0).unwrap());
//! let mean = |d: &[f64]| -> Result<f64, BoxError> { Ok(d.iter().sum::<f64>() / d.len() as f64) };
//! let abs = |a: &f64, b: &f64| -> Result<f64, BoxError> { Ok((a - b).abs()) };
//!
//! let estimate = sample_sensitivity(&mean, &abs, &oracle, 100, None, Some(0.05), StreamKey::new(0))?;
//! println!("sensitivity <= {:.4}", estimate.sensitivity);
//! # Ok::<(), sensitivity_sampling::SamplingError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod sampler;

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use sensitivity_sampling_core as core;
pub use sensitivity_sampling_prng as prng;

pub use config::{CancellationToken, Execution, SamplerConfig};
pub use sensitivity_sampling_core::{
    calibrate, lambert_w_m1, reduce_samples, BoxError, CalibrationMode, DistributionOracle,
    NeighborPair, Norm, Oracle, Query, Result, SamplingError, SamplingParameters,
    SensitivityEstimate, Stage, StopReason,
};
pub use sensitivity_sampling_prng::{StreamKey, StreamRng};
pub use sampler::{sample_sensitivity, SensitivitySampler};

/// Convenience prelude covering the sampling workflow.
pub mod prelude {
    pub use crate::config::{CancellationToken, Execution, SamplerConfig};
    pub use crate::sampler::{sample_sensitivity, SensitivitySampler};
    pub use sensitivity_sampling_core::prelude::*;
    pub use sensitivity_sampling_prng::prelude::*;
}
