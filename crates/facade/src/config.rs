//! Sampler configuration and run control.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sensitivity_sampling_core::{
    validate_dataset_size, CalibrationMode, Result, SamplingError, StopReason,
};
use sensitivity_sampling_prng::StreamKey;

/// How trials are scheduled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Execution {
    /// Run trials one after another on the calling thread.
    #[default]
    Sequential,
    /// Run trials on a rayon pool.
    Parallel {
        /// Pool size; `None` uses the global rayon pool.
        threads: Option<usize>,
    },
}

/// Configuration for a [`SensitivitySampler`](crate::SensitivitySampler).
#[derive(Clone, Debug, PartialEq)]
pub struct SamplerConfig {
    /// Size `n` of each sampled dataset.
    pub dataset_size: usize,
    /// How `m`, `k`, `gamma` and `rho` are derived.
    pub calibration: CalibrationMode,
    /// Root key; trial `i` draws from `key.for_trial(i)`.
    pub key: StreamKey,
    /// Trial scheduling.
    pub execution: Execution,
    /// Optional wall-clock budget for the whole run.
    pub time_limit: Option<Duration>,
}

impl SamplerConfig {
    /// Create a sequential configuration seeded with the default key.
    pub fn new(dataset_size: usize, calibration: CalibrationMode) -> Result<Self> {
        let config = Self {
            dataset_size,
            calibration,
            key: StreamKey::default(),
            execution: Execution::Sequential,
            time_limit: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Create a configuration from optional `m` and `gamma`.
    pub fn from_options(dataset_size: usize, m: Option<usize>, gamma: Option<f64>) -> Result<Self> {
        validate_dataset_size(dataset_size)?;
        Self::new(dataset_size, CalibrationMode::from_options(m, gamma)?)
    }

    /// Set the root stream key.
    pub fn with_key(mut self, key: StreamKey) -> Self {
        self.key = key;
        self
    }

    /// Set the root stream key from a seed.
    pub fn with_seed(self, seed: u64) -> Self {
        self.with_key(StreamKey::new(seed))
    }

    /// Set the trial scheduling.
    pub fn with_execution(mut self, execution: Execution) -> Result<Self> {
        self.execution = execution;
        self.validate()?;
        Ok(self)
    }

    /// Bound the wall-clock time of a run.
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validate_dataset_size(self.dataset_size)?;
        if let Execution::Parallel { threads: Some(0) } = self.execution {
            return Err(SamplingError::invalid("parallel execution needs at least one thread"));
        }
        Ok(())
    }
}

/// Shared flag that stops a run before its next trial.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create an untriggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Stop conditions checked between trials.
pub(crate) struct StopGuard<'a> {
    token: &'a CancellationToken,
    deadline: Option<Instant>,
}

impl<'a> StopGuard<'a> {
    pub(crate) fn start(token: &'a CancellationToken, time_limit: Option<Duration>) -> Self {
        Self {
            token,
            deadline: time_limit.and_then(|limit| Instant::now().checked_add(limit)),
        }
    }

    pub(crate) fn check(&self) -> Option<StopReason> {
        if self.token.is_cancelled() {
            return Some(StopReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(StopReason::TimeLimit),
            _ => None,
        }
    }
}
