//! The sensitivity-sampling protocol.
//!
//! Each trial draws `n - 1` shared records plus one replacement record for
//! each side of a neighboring pair, evaluates the query on both datasets and
//! records the norm of the difference. The `k`-th smallest of the `m` samples
//! is the sensitivity bound.

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use sensitivity_sampling_core::{
    check_sample, reduce_samples, NeighborPair, Norm, Oracle, Query, Result, SamplingError,
    SamplingParameters, SensitivityEstimate, Stage,
};
use sensitivity_sampling_prng::StreamKey;

use crate::config::{CancellationToken, Execution, SamplerConfig, StopGuard};

/// Runs sensitivity-sampling trials against caller-supplied collaborators.
#[derive(Clone, Debug)]
pub struct SensitivitySampler {
    config: SamplerConfig,
    cancel: CancellationToken,
}

impl SensitivitySampler {
    /// Create a sampler from a validated configuration.
    pub fn new(config: SamplerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: CancellationToken::new(),
        })
    }

    /// Attach an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels runs of this sampler.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The sampler configuration.
    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Calibrate the parameters a run would use.
    pub fn parameters(&self) -> Result<SamplingParameters> {
        self.config.calibration.calibrate()
    }

    /// Calibrate, run all trials and reduce them to an estimate.
    ///
    /// Honors [`Execution`]; parallel runs return the same estimate as
    /// sequential ones because every trial owns its random stream.
    pub fn sample_sensitivity<Q, N, O>(
        &self,
        query: &Q,
        norm: &N,
        oracle: &O,
    ) -> Result<SensitivityEstimate>
    where
        O: Oracle + Sync,
        O::Record: Clone,
        Q: Query<O::Record> + Sync,
        N: Norm<Q::Output> + Sync,
    {
        let params = self.parameters()?;
        self.sample_with_parameters(&params, query, norm, oracle)
    }

    /// Like [`sample_sensitivity`](Self::sample_sensitivity), always on the
    /// calling thread and without `Sync` requirements on the collaborators.
    pub fn sample_sensitivity_sequential<Q, N, O>(
        &self,
        query: &Q,
        norm: &N,
        oracle: &O,
    ) -> Result<SensitivityEstimate>
    where
        O: Oracle,
        O::Record: Clone,
        Q: Query<O::Record>,
        N: Norm<Q::Output>,
    {
        let params = self.parameters()?;
        self.log_start(&params);
        let samples = self.collect_sequential(params.m(), query, norm, oracle)?;
        self.finish(params, samples)
    }

    /// Run with explicit parameters instead of calibrating.
    pub fn sample_with_parameters<Q, N, O>(
        &self,
        params: &SamplingParameters,
        query: &Q,
        norm: &N,
        oracle: &O,
    ) -> Result<SensitivityEstimate>
    where
        O: Oracle + Sync,
        O::Record: Clone,
        Q: Query<O::Record> + Sync,
        N: Norm<Q::Output> + Sync,
    {
        self.log_start(params);
        let samples = self.trial_samples(params.m(), query, norm, oracle)?;
        self.finish(*params, samples)
    }

    /// Raw samples of trials `0..m`, in trial order.
    pub fn trial_samples<Q, N, O>(
        &self,
        m: usize,
        query: &Q,
        norm: &N,
        oracle: &O,
    ) -> Result<Vec<f64>>
    where
        O: Oracle + Sync,
        O::Record: Clone,
        Q: Query<O::Record> + Sync,
        N: Norm<Q::Output> + Sync,
    {
        match self.config.execution {
            Execution::Sequential => self.collect_sequential(m, query, norm, oracle),
            Execution::Parallel { threads } => {
                self.collect_parallel(m, threads, query, norm, oracle)
            }
        }
    }

    /// Re-derive the sample of a single trial.
    pub fn trial<Q, N, O>(&self, index: usize, query: &Q, norm: &N, oracle: &O) -> Result<f64>
    where
        O: Oracle,
        O::Record: Clone,
        Q: Query<O::Record>,
        N: Norm<Q::Output>,
    {
        run_trial(
            self.config.key,
            self.config.dataset_size,
            index,
            query,
            norm,
            oracle,
        )
    }

    fn collect_sequential<Q, N, O>(
        &self,
        m: usize,
        query: &Q,
        norm: &N,
        oracle: &O,
    ) -> Result<Vec<f64>>
    where
        O: Oracle,
        O::Record: Clone,
        Q: Query<O::Record>,
        N: Norm<Q::Output>,
    {
        let guard = StopGuard::start(&self.cancel, self.config.time_limit);
        let mut samples = Vec::with_capacity(m);
        for trial in 0..m {
            if let Some(reason) = guard.check() {
                tracing::warn!(completed = trial, required = m, %reason, "sampling stopped early");
                return Err(SamplingError::Incomplete {
                    completed: trial,
                    required: m,
                    reason,
                });
            }
            samples.push(self.trial(trial, query, norm, oracle)?);
        }
        Ok(samples)
    }

    fn collect_parallel<Q, N, O>(
        &self,
        m: usize,
        threads: Option<usize>,
        query: &Q,
        norm: &N,
        oracle: &O,
    ) -> Result<Vec<f64>>
    where
        O: Oracle + Sync,
        O::Record: Clone,
        Q: Query<O::Record> + Sync,
        N: Norm<Q::Output> + Sync,
    {
        let guard = StopGuard::start(&self.cancel, self.config.time_limit);
        let completed = AtomicUsize::new(0);
        let key = self.config.key;
        let n = self.config.dataset_size;

        let work = || {
            (0..m)
                .into_par_iter()
                .map(|trial| {
                    if let Some(reason) = guard.check() {
                        return Err(SamplingError::Incomplete {
                            completed: 0,
                            required: m,
                            reason,
                        });
                    }
                    let sample = run_trial(key, n, trial, query, norm, oracle)?;
                    completed.fetch_add(1, Ordering::Relaxed);
                    Ok(sample)
                })
                .collect::<Result<Vec<f64>>>()
        };

        let outcome = match threads {
            Some(threads) => rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| SamplingError::invalid(format!("failed to build thread pool: {e}")))?
                .install(work),
            None => work(),
        };

        match outcome {
            Err(SamplingError::Incomplete {
                required, reason, ..
            }) => {
                let completed = completed.load(Ordering::Relaxed);
                tracing::warn!(completed, required, %reason, "sampling stopped early");
                Err(SamplingError::Incomplete {
                    completed,
                    required,
                    reason,
                })
            }
            other => other,
        }
    }

    fn log_start(&self, params: &SamplingParameters) {
        tracing::debug!(
            n = self.config.dataset_size,
            m = params.m(),
            k = params.k(),
            execution = ?self.config.execution,
            "starting sensitivity sampling"
        );
    }

    fn finish(
        &self,
        parameters: SamplingParameters,
        samples: Vec<f64>,
    ) -> Result<SensitivityEstimate> {
        let (sensitivity, mean) = reduce_samples(samples, parameters.k())?;
        tracing::info!(
            sensitivity,
            mean,
            m = parameters.m(),
            k = parameters.k(),
            "sensitivity estimate ready"
        );
        Ok(SensitivityEstimate {
            sensitivity,
            mean,
            parameters,
        })
    }
}

/// Calibrate from optional `m`/`gamma` and estimate sequentially.
///
/// `key` seeds the trial streams; a fixed key reproduces the estimate.
pub fn sample_sensitivity<Q, N, O>(
    query: &Q,
    norm: &N,
    oracle: &O,
    n: usize,
    m: Option<usize>,
    gamma: Option<f64>,
    key: StreamKey,
) -> Result<SensitivityEstimate>
where
    O: Oracle,
    O::Record: Clone,
    Q: Query<O::Record>,
    N: Norm<Q::Output>,
{
    let config = SamplerConfig::from_options(n, m, gamma)?.with_key(key);
    SensitivitySampler::new(config)?.sample_sensitivity_sequential(query, norm, oracle)
}

fn run_trial<Q, N, O>(
    key: StreamKey,
    n: usize,
    trial: usize,
    query: &Q,
    norm: &N,
    oracle: &O,
) -> Result<f64>
where
    O: Oracle,
    O::Record: Clone,
    Q: Query<O::Record>,
    N: Norm<Q::Output>,
{
    let mut rng = key.for_trial(trial).to_rng();
    let shared = draw(oracle, n - 1, trial, &mut rng)?;
    let first = draw_one(oracle, trial, &mut rng)?;
    let second = draw_one(oracle, trial, &mut rng)?;
    let pair = NeighborPair::from_draws(shared, first, second);

    let a = query
        .get(pair.first())
        .map_err(|e| SamplingError::collaborator(trial, Stage::Query, e))?;
    let b = query
        .get(pair.second())
        .map_err(|e| SamplingError::collaborator(trial, Stage::Query, e))?;
    let distance = norm
        .compute(&a, &b)
        .map_err(|e| SamplingError::collaborator(trial, Stage::Norm, e))?;
    check_sample(trial, distance)
}

fn draw<O: Oracle, G: rand::RngCore>(
    oracle: &O,
    count: usize,
    trial: usize,
    rng: &mut G,
) -> Result<Vec<O::Record>> {
    let records = oracle
        .sample(count, rng)
        .map_err(|e| SamplingError::collaborator(trial, Stage::Oracle, e))?;
    if records.len() != count {
        return Err(SamplingError::contract(
            trial,
            format!("oracle returned {} records, {count} requested", records.len()),
        ));
    }
    Ok(records)
}

fn draw_one<O: Oracle, G: rand::RngCore>(
    oracle: &O,
    trial: usize,
    rng: &mut G,
) -> Result<O::Record> {
    draw(oracle, 1, trial, rng)?
        .pop()
        .ok_or_else(|| SamplingError::contract(trial, "oracle returned no record"))
}
