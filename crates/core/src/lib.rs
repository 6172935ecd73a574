//! Core building blocks for sensitivity sampling.
//!
//! This crate holds everything that does not depend on how trials are
//! scheduled: the error taxonomy, the query/norm/oracle capability traits,
//! neighboring-pair construction, parameter calibration and the final
//! order-statistic reduction.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod calibration;
pub mod collaborators;
pub mod error;
pub mod estimate;
pub mod neighbors;
pub mod special;

pub use calibration::{calibrate, CalibrationMode, SamplingParameters};
pub use collaborators::{DistributionOracle, Norm, Oracle, Query};
pub use error::{BoxError, Result, SamplingError, Stage, StopReason};
pub use estimate::{check_sample, reduce_samples, SensitivityEstimate};
pub use neighbors::{validate_dataset_size, NeighborPair};
pub use special::lambert_w_m1;

/// Common imports for downstream users.
pub mod prelude {
    pub use crate::{
        calibrate, reduce_samples, BoxError, CalibrationMode, DistributionOracle, NeighborPair,
        Norm, Oracle, Query, Result, SamplingError, SamplingParameters, SensitivityEstimate,
        Stage, StopReason,
    };
}
