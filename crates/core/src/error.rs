//! Error types for sensitivity sampling.

use std::fmt;

/// Boxed error returned by caller-supplied collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Collaborator call that failed during a trial.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// `Oracle::sample`.
    Oracle,
    /// `Query::get`.
    Query,
    /// `Norm::compute`.
    Norm,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Oracle => "oracle",
            Stage::Query => "query",
            Stage::Norm => "norm",
        };
        f.write_str(name)
    }
}

/// Why a run stopped before all trials completed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The caller cancelled the run.
    Cancelled,
    /// The configured wall-clock limit elapsed.
    TimeLimit,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Cancelled => f.write_str("cancelled"),
            StopReason::TimeLimit => f.write_str("time limit exceeded"),
        }
    }
}

/// Errors that can occur while calibrating or running a sensitivity sampler.
#[derive(Debug, thiserror::Error)]
pub enum SamplingError {
    /// Caller-supplied parameters violate a precondition.
    #[error("invalid configuration: {msg}")]
    InvalidConfiguration {
        /// Human-readable error description.
        msg: String,
    },

    /// An intermediate calibration value left its mathematical domain.
    #[error("numeric domain error: {msg}")]
    NumericDomain {
        /// Human-readable error description.
        msg: String,
    },

    /// A collaborator failed during a trial.
    #[error("{stage} failed in trial {trial}")]
    Collaborator {
        /// Zero-based trial index.
        trial: usize,
        /// Which collaborator failed.
        stage: Stage,
        /// The collaborator's own error.
        #[source]
        source: BoxError,
    },

    /// A collaborator returned a value that breaks its contract.
    #[error("contract violation in trial {trial}: {msg}")]
    ContractViolation {
        /// Zero-based trial index.
        trial: usize,
        /// Human-readable error description.
        msg: String,
    },

    /// The run stopped before all trials completed.
    #[error("incomplete estimate: {completed} of {required} trials finished ({reason})")]
    Incomplete {
        /// Trials that finished before the stop.
        completed: usize,
        /// Trials the estimate needs.
        required: usize,
        /// Why the run stopped.
        reason: StopReason,
    },
}

/// Result type for sensitivity sampling.
pub type Result<T> = std::result::Result<T, SamplingError>;

impl SamplingError {
    /// Create an invalid configuration error.
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfiguration { msg: msg.into() }
    }

    /// Create a numeric domain error.
    pub fn numeric<S: Into<String>>(msg: S) -> Self {
        Self::NumericDomain { msg: msg.into() }
    }

    /// Wrap a collaborator failure with its trial context.
    pub fn collaborator(trial: usize, stage: Stage, source: BoxError) -> Self {
        Self::Collaborator {
            trial,
            stage,
            source,
        }
    }

    /// Create a contract violation error.
    pub fn contract<S: Into<String>>(trial: usize, msg: S) -> Self {
        Self::ContractViolation {
            trial,
            msg: msg.into(),
        }
    }

    /// Trial index the error is attributed to, if any.
    pub fn trial(&self) -> Option<usize> {
        match self {
            Self::Collaborator { trial, .. } | Self::ContractViolation { trial, .. } => {
                Some(*trial)
            }
            _ => None,
        }
    }
}
