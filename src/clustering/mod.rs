//! Clustering engines for access-pattern vectors.
//!
//! Two algorithms share the [`Clusterer`] interface:
//! - [`PartitionClusterer`]: k-means, prototypes relocated until membership settles
//! - [`TopologicalClusterer`]: Kohonen self-organizing map on an n×n grid
//!
//! Both borrow the training [`Dataset`](crate::Dataset) read-only and own their
//! prototypes and membership sets exclusively.

pub mod kmeans;
pub mod som;

use std::collections::BTreeSet;

use rand::prelude::*;
use serde::Serialize;

use crate::error::{ClusterError, ClusterResult};
use crate::metric;

pub use kmeans::{ConvergenceRule, PartitionClusterer};
pub use som::{GridPosition, TopologicalClusterer};

/// Outcome of a `train()` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrainSummary {
    /// Reassignment iterations (k-means) or epochs (SOM) executed
    pub iterations: usize,
    /// False when k-means stopped at the iteration cap
    pub converged: bool,
    /// Transfers counted in the last k-means iteration; 0 for SOM
    pub last_transfers: usize,
    /// Clusters left with no members during prototype recomputation
    pub starved: Vec<usize>,
}

/// Common surface of the trained clustering engines.
pub trait Clusterer {
    /// Run training to completion. Fails with `AlreadyTrained` on a second call.
    fn train(&mut self) -> ClusterResult<TrainSummary>;

    fn is_trained(&self) -> bool;

    /// Dimension of prototypes and accepted vectors
    fn dim(&self) -> usize;

    /// Number of clusters (k-means) or grid units (SOM)
    fn unit_count(&self) -> usize;

    fn prototype(&self, unit: usize) -> &[f32];

    /// Training indices owned by `unit`
    fn members(&self, unit: usize) -> &BTreeSet<usize>;

    /// Human-readable unit label used in reports
    fn unit_label(&self, unit: usize) -> String {
        format!("[{unit}]")
    }

    /// Unit with the nearest prototype; ties go to the lowest unit index.
    fn nearest_unit(&self, vector: &[f32]) -> ClusterResult<usize> {
        if !self.is_trained() {
            return Err(ClusterError::NotTrained);
        }
        if vector.len() != self.dim() {
            return Err(ClusterError::DimensionMismatch {
                expected: self.dim(),
                actual: vector.len(),
            });
        }
        metric::nearest(vector, (0..self.unit_count()).map(|u| self.prototype(u)))
            .map(|(unit, _)| unit)
            .ok_or(ClusterError::NotTrained)
    }

    /// Whether a test vector may be attributed to the unit owning the training
    /// point at the same position. Units that must always be found by distance
    /// return false.
    fn supports_index_aliasing(&self) -> bool {
        true
    }

    /// Linear scan of the membership sets for a training index
    fn find_unit(&self, index: usize) -> Option<usize> {
        (0..self.unit_count()).find(|&u| self.members(u).contains(&index))
    }
}

/// Seeded generator for a run; draws and logs a fresh seed when none is given.
pub(crate) fn seeded_rng(seed: Option<u64>) -> (StdRng, u64) {
    let seed = seed.unwrap_or_else(|| {
        let drawn: u64 = rand::random();
        tracing::info!("no seed configured, using {drawn}");
        drawn
    });
    (StdRng::seed_from_u64(seed), seed)
}
