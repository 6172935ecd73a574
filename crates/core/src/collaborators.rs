//! Capability traits for the query, norm and data oracle a sampler drives.

use std::marker::PhantomData;

use rand::RngCore;
use rand_distr::Distribution;

use crate::error::BoxError;

/// A query evaluated on a dataset.
///
/// Must be a deterministic function of its dataset for sensitivity to be
/// well defined.
pub trait Query<R> {
    /// Query result type.
    type Output;

    /// Evaluate the query on `dataset`.
    fn get(&self, dataset: &[R]) -> Result<Self::Output, BoxError>;
}

impl<R, V, F> Query<R> for F
where
    F: Fn(&[R]) -> Result<V, BoxError>,
{
    type Output = V;

    fn get(&self, dataset: &[R]) -> Result<V, BoxError> {
        self(dataset)
    }
}

/// Norm of the difference between two query results.
pub trait Norm<V> {
    /// Distance between `a` and `b`; must be non-negative.
    fn compute(&self, a: &V, b: &V) -> Result<f64, BoxError>;
}

impl<V, F> Norm<V> for F
where
    F: Fn(&V, &V) -> Result<f64, BoxError>,
{
    fn compute(&self, a: &V, b: &V) -> Result<f64, BoxError> {
        self(a, b)
    }
}

/// Data-generating distribution that records are drawn from.
///
/// All randomness must come from `rng`; the sampler passes each trial its own
/// stream, which is what keeps trials independent.
pub trait Oracle {
    /// Record type produced by the oracle.
    type Record;

    /// Draw `count` records.
    fn sample<G: RngCore + ?Sized>(
        &self,
        count: usize,
        rng: &mut G,
    ) -> Result<Vec<Self::Record>, BoxError>;
}

/// Oracle drawing i.i.d. records from a `rand_distr` distribution.
#[derive(Clone, Debug)]
pub struct DistributionOracle<D, T> {
    dist: D,
    _record: PhantomData<fn() -> T>,
}

impl<D, T> DistributionOracle<D, T>
where
    D: Distribution<T>,
{
    /// Wrap a distribution.
    pub fn new(dist: D) -> Self {
        Self {
            dist,
            _record: PhantomData,
        }
    }
}

impl<D, T> Oracle for DistributionOracle<D, T>
where
    D: Distribution<T>,
{
    type Record = T;

    fn sample<G: RngCore + ?Sized>(&self, count: usize, rng: &mut G) -> Result<Vec<T>, BoxError> {
        Ok((0..count).map(|_| self.dist.sample(rng)).collect())
    }
}
