use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use proptest::prelude::*;
use rand::RngCore;
use rand_distr::Uniform;
use sensitivity_sampling::{
    calibrate, sample_sensitivity, BoxError, CalibrationMode, DistributionOracle, Execution,
    Oracle, SamplerConfig, SamplingError, SamplingParameters, SensitivitySampler, Stage,
    StopReason, StreamKey,
};

fn last_record(d: &[u8]) -> Result<f64, BoxError> {
    Ok(f64::from(*d.last().ok_or("empty dataset")?))
}

fn abs_diff(a: &f64, b: &f64) -> Result<f64, BoxError> {
    Ok((a - b).abs())
}

fn mean_query(d: &[f64]) -> Result<f64, BoxError> {
    Ok(d.iter().sum::<f64>() / d.len() as f64)
}

fn bits() -> DistributionOracle<Uniform<u8>, u8> {
    DistributionOracle::new(Uniform::new_inclusive(0u8, 1))
}

fn unit() -> DistributionOracle<Uniform<f64>, f64> {
    DistributionOracle::new(Uniform::new(0.0f64, 1.0))
}

fn sampler(n: usize, mode: CalibrationMode, seed: u64) -> SensitivitySampler {
    let config = SamplerConfig::new(n, mode).unwrap().with_seed(seed);
    SensitivitySampler::new(config).unwrap()
}

/// Replays a fixed record sequence, ignoring the RNG.
struct ScriptedOracle {
    records: Mutex<VecDeque<u8>>,
}

impl ScriptedOracle {
    fn new(records: &[u8]) -> Self {
        Self {
            records: Mutex::new(records.iter().copied().collect()),
        }
    }
}

impl Oracle for ScriptedOracle {
    type Record = u8;

    fn sample<G: RngCore + ?Sized>(&self, count: usize, _rng: &mut G) -> Result<Vec<u8>, BoxError> {
        let mut records = self.records.lock().map_err(|_| "poisoned")?;
        (0..count)
            .map(|_| records.pop_front().ok_or_else(|| "script exhausted".into()))
            .collect()
    }
}

#[test]
fn missing_m_and_gamma_is_invalid() {
    let err = sample_sensitivity(
        &last_record,
        &abs_diff,
        &bits(),
        5,
        None,
        None,
        StreamKey::new(0),
    )
    .unwrap_err();
    assert!(matches!(err, SamplingError::InvalidConfiguration { .. }));
}

#[test]
fn dataset_smaller_than_two_is_invalid() {
    let err = sample_sensitivity(
        &last_record,
        &abs_diff,
        &bits(),
        1,
        Some(10),
        None,
        StreamKey::new(0),
    )
    .unwrap_err();
    assert!(matches!(err, SamplingError::InvalidConfiguration { .. }));
}

#[test]
fn calibration_errors_surface_before_sampling() {
    let oracle = ScriptedOracle::new(&[]);
    let err = sample_sensitivity(
        &last_record,
        &abs_diff,
        &oracle,
        5,
        Some(3),
        Some(0.5),
        StreamKey::new(0),
    )
    .unwrap_err();
    assert!(matches!(err, SamplingError::InvalidConfiguration { .. }));
}

#[test]
fn fixed_scenario_takes_second_order_statistic() {
    // Trial layout: four shared records, then the D1 and D2 replacements.
    let oracle = ScriptedOracle::new(&[
        0, 0, 0, 0, 1, 0, // |1 - 0| = 1
        1, 1, 0, 1, 0, 0, // |0 - 0| = 0
        0, 1, 1, 0, 0, 1, // |0 - 1| = 1
    ]);
    let params = SamplingParameters::new(3, 0.9, 2, 0.15).unwrap();
    let s = sampler(5, CalibrationMode::FromSampleSize { m: 3 }, 0);

    let est = s
        .sample_with_parameters(&params, &last_record, &abs_diff, &oracle)
        .unwrap();
    assert_eq!(est.sensitivity, 1.0);
    assert!((est.mean - 0.667).abs() < 1e-3);
    assert_eq!(est.parameters.k(), 2);
}

#[test]
fn same_key_reproduces_estimate() {
    let run = |seed| {
        sample_sensitivity(
            &mean_query,
            &abs_diff,
            &unit(),
            20,
            Some(200),
            None,
            StreamKey::new(seed),
        )
        .unwrap()
    };
    let a = run(11);
    let b = run(11);
    assert_eq!(a.sensitivity, b.sensitivity);
    assert_eq!(a.mean, b.mean);
    assert_ne!(run(12).mean, a.mean);
}

#[test]
fn parallel_matches_sequential() {
    let mode = CalibrationMode::FromSampleSize { m: 300 };
    let sequential = sampler(10, mode, 5)
        .sample_sensitivity(&mean_query, &abs_diff, &unit())
        .unwrap();

    for threads in [None, Some(1), Some(3)] {
        let config = SamplerConfig::new(10, mode)
            .unwrap()
            .with_seed(5)
            .with_execution(Execution::Parallel { threads })
            .unwrap();
        let parallel = SensitivitySampler::new(config)
            .unwrap()
            .sample_sensitivity(&mean_query, &abs_diff, &unit())
            .unwrap();
        assert_eq!(parallel, sequential);
    }
}

#[test]
fn estimate_matches_rederived_trials() {
    let s = sampler(8, CalibrationMode::FromBoth { m: 400, gamma: 0.5 }, 21);
    let params = s.parameters().unwrap();
    let est = s
        .sample_sensitivity(&mean_query, &abs_diff, &unit())
        .unwrap();

    let mut samples: Vec<f64> = (0..params.m())
        .map(|i| s.trial(i, &mean_query, &abs_diff, &unit()).unwrap())
        .collect();
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    samples.sort_by(|a, b| a.total_cmp(b));

    assert!(params.k() < params.m());
    assert_eq!(est.sensitivity, samples[params.k() - 1]);
    assert!((est.mean - mean).abs() < 1e-12);
}

#[test]
fn binary_records_reach_unit_sensitivity() {
    let est = sampler(5, CalibrationMode::FromSampleSize { m: 64 }, 1)
        .sample_sensitivity(&last_record, &abs_diff, &bits())
        .unwrap();
    assert_eq!(est.sensitivity, 1.0);
    assert!(est.mean > 0.2 && est.mean < 0.8);
}

#[test]
fn confidence_mode_runs_calibrated_trial_count() {
    let s = sampler(6, CalibrationMode::FromConfidence { gamma: 0.3 }, 2);
    let expected = calibrate(None, Some(0.3)).unwrap();
    let est = s
        .sample_sensitivity(&mean_query, &abs_diff, &unit())
        .unwrap();
    assert_eq!(est.parameters, expected);
    let samples = s
        .trial_samples(expected.m(), &mean_query, &abs_diff, &unit())
        .unwrap();
    assert_eq!(samples.len(), expected.m());
    assert_eq!(expected.k(), expected.m());
    let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    assert_eq!(est.sensitivity, max);
}

#[test]
fn query_failure_carries_trial_and_stage() {
    // Fails once a dataset ends in a record above 0.9.
    let picky = |d: &[f64]| -> Result<f64, BoxError> {
        match d.last() {
            Some(x) if *x > 0.9 => Err("record out of range".into()),
            Some(x) => Ok(*x),
            None => Err("empty".into()),
        }
    };
    let err = sampler(3, CalibrationMode::FromSampleSize { m: 500 }, 4)
        .sample_sensitivity(&picky, &abs_diff, &unit())
        .unwrap_err();
    match err {
        SamplingError::Collaborator {
            stage: Stage::Query,
            source,
            ..
        } => assert_eq!(source.to_string(), "record out of range"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn norm_failure_aborts_the_run() {
    let failing = |_: &f64, _: &f64| -> Result<f64, BoxError> { Err("norm unavailable".into()) };
    let err = sampler(3, CalibrationMode::FromSampleSize { m: 10 }, 0)
        .sample_sensitivity(&mean_query, &failing, &unit())
        .unwrap_err();
    assert!(matches!(
        err,
        SamplingError::Collaborator {
            trial: 0,
            stage: Stage::Norm,
            ..
        }
    ));
}

#[test]
fn oracle_failure_aborts_the_run() {
    let oracle = ScriptedOracle::new(&[0, 0, 1, 0, 0, 1, 0]);
    let err = sampler(3, CalibrationMode::FromSampleSize { m: 10 }, 0)
        .sample_sensitivity(&last_record, &abs_diff, &oracle)
        .unwrap_err();
    assert!(matches!(
        err,
        SamplingError::Collaborator {
            trial: 1,
            stage: Stage::Oracle,
            ..
        }
    ));
}

#[test]
fn negative_norm_is_rejected() {
    let signed = |a: &f64, b: &f64| -> Result<f64, BoxError> { Ok(a - b - 2.0) };
    let err = sampler(3, CalibrationMode::FromSampleSize { m: 10 }, 0)
        .sample_sensitivity(&mean_query, &signed, &unit())
        .unwrap_err();
    assert!(matches!(
        err,
        SamplingError::ContractViolation { trial: 0, .. }
    ));
}

#[test]
fn elapsed_time_limit_reports_incomplete() {
    let config = SamplerConfig::new(4, CalibrationMode::FromSampleSize { m: 50 })
        .unwrap()
        .with_time_limit(Duration::ZERO);
    let err = SensitivitySampler::new(config)
        .unwrap()
        .sample_sensitivity(&mean_query, &abs_diff, &unit())
        .unwrap_err();
    assert!(matches!(
        err,
        SamplingError::Incomplete {
            completed: 0,
            required: 50,
            reason: StopReason::TimeLimit
        }
    ));
}

#[test]
fn cancelled_parallel_run_reports_incomplete() {
    let config = SamplerConfig::new(4, CalibrationMode::FromSampleSize { m: 50 })
        .unwrap()
        .with_execution(Execution::Parallel { threads: Some(2) })
        .unwrap();
    let s = SensitivitySampler::new(config).unwrap();
    s.cancellation_token().cancel();
    let err = s
        .sample_sensitivity(&mean_query, &abs_diff, &unit())
        .unwrap_err();
    assert!(matches!(
        err,
        SamplingError::Incomplete {
            completed: 0,
            reason: StopReason::Cancelled,
            ..
        }
    ));
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 16, .. ProptestConfig::default() })]

    #[test]
    fn sensitivity_is_kth_smallest_trial(seed in any::<u64>(), m in 2usize..64, t in 0.0f64..0.9) {
        let base = calibrate(Some(m), None).unwrap();
        let gamma = base.gamma() + t * (1.0 - base.gamma());
        prop_assume!(gamma < 1.0);
        let s = sampler(4, CalibrationMode::FromBoth { m, gamma }, seed);
        let params = s.parameters().unwrap();

        let est = s.sample_sensitivity(&mean_query, &abs_diff, &unit()).unwrap();
        let mut samples = s.trial_samples(m, &mean_query, &abs_diff, &unit()).unwrap();
        let mean = samples.iter().sum::<f64>() / m as f64;
        samples.sort_by(|a, b| a.total_cmp(b));

        prop_assert_eq!(est.sensitivity, samples[params.k() - 1]);
        prop_assert!((est.mean - mean).abs() < 1e-9);
        prop_assert!(est.sensitivity <= samples[m - 1]);
    }
}
