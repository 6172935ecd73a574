//! Replace-one neighboring datasets.

use crate::error::{Result, SamplingError};

/// Two datasets of equal size sharing every record but the last.
#[derive(Clone, Debug, PartialEq)]
pub struct NeighborPair<R> {
    first: Vec<R>,
    second: Vec<R>,
}

impl<R: Clone> NeighborPair<R> {
    /// Extend `shared` once with `first_last` and once with `second_last`.
    pub fn from_draws(shared: Vec<R>, first_last: R, second_last: R) -> Self {
        let mut second = Vec::with_capacity(shared.len() + 1);
        second.extend_from_slice(&shared);
        second.push(second_last);

        let mut first = shared;
        first.push(first_last);
        Self { first, second }
    }
}

impl<R> NeighborPair<R> {
    /// Dataset ending in the first differing record.
    pub fn first(&self) -> &[R] {
        &self.first
    }

    /// Dataset ending in the second differing record.
    pub fn second(&self) -> &[R] {
        &self.second
    }
}

/// Check that a dataset size admits a replace-one neighbor.
pub fn validate_dataset_size(n: usize) -> Result<()> {
    if n < 2 {
        return Err(SamplingError::invalid(format!(
            "dataset size must be at least 2 to form a neighboring pair, got {n}"
        )));
    }
    Ok(())
}
