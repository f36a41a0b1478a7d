//! Prefetch evaluation of a trained clusterer on held-out vectors.
//!
//! Every test vector is mapped to an owning unit. Each prototype component
//! strictly above the threshold is a prefetch decision, which is scored against
//! the actual request indicator of the test vector:
//!
//! - hitrate  = hits / requests
//! - accuracy = hits / prefetches
//!
//! A zero denominator leaves the rate undefined (`None`).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clustering::Clusterer;
use crate::config::EvaluationConfig;
use crate::dataset::Dataset;
use crate::error::{ClusterError, ClusterResult};

pub const DEFAULT_PREFETCH_THRESHOLD: f64 = 0.5;

/// How a test vector finds its owning unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartitionAssignment {
    /// Nearest prototype to the test vector itself
    #[default]
    Nearest,
    /// Unit owning the training point with the same position as the test vector.
    /// Only meaningful when train and test rows describe the same clients.
    TrainingIndex,
}

/// Running totals over all dimensions of all scored vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PrefetchTally {
    pub hits: u64,
    pub prefetched: u64,
    pub requested: f64,
}

impl PrefetchTally {
    /// Score one test vector against the prototype of its owning unit.
    pub fn record(&mut self, prototype: &[f32], actual: &[f32], threshold: f64) {
        for (p, a) in prototype.iter().zip(actual) {
            let prefetch = f64::from(*p) > threshold;
            if prefetch {
                self.prefetched += 1;
                if *a == 1.0 {
                    self.hits += 1;
                }
            }
            self.requested += f64::from(*a);
        }
    }

    pub fn hitrate(&self) -> Option<f64> {
        (self.requested != 0.0).then(|| self.hits as f64 / self.requested)
    }

    pub fn accuracy(&self) -> Option<f64> {
        (self.prefetched != 0).then(|| self.hits as f64 / self.prefetched as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Evaluation {
    pub threshold: f64,
    pub assignment: PartitionAssignment,
    pub tally: PrefetchTally,
    pub hitrate: Option<f64>,
    pub accuracy: Option<f64>,
}

impl Evaluation {
    fn from_tally(threshold: f64, assignment: PartitionAssignment, tally: PrefetchTally) -> Self {
        Self {
            threshold,
            assignment,
            tally,
            hitrate: tally.hitrate(),
            accuracy: tally.accuracy(),
        }
    }

    pub fn hitrate_or_nan(&self) -> f64 {
        self.hitrate.unwrap_or(f64::NAN)
    }

    pub fn accuracy_or_nan(&self) -> f64 {
        self.accuracy.unwrap_or(f64::NAN)
    }

    /// Hitrate plus accuracy; undefined when either is
    pub fn combined(&self) -> Option<f64> {
        Some(self.hitrate? + self.accuracy?)
    }
}

fn fmt_rate(rate: Option<f64>) -> String {
    match rate {
        Some(r) => format!("{r}"),
        None => "undefined".to_string(),
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Prefetch threshold={}", self.threshold)?;
        writeln!(f, "Hitrate: {}", fmt_rate(self.hitrate))?;
        writeln!(f, "Accuracy: {}", fmt_rate(self.accuracy))?;
        write!(f, "Hitrate+Accuracy={}", fmt_rate(self.combined()))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PrefetchEvaluator {
    threshold: f64,
    assignment: PartitionAssignment,
}

impl Default for PrefetchEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_PREFETCH_THRESHOLD)
    }
}

impl PrefetchEvaluator {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            assignment: PartitionAssignment::default(),
        }
    }

    pub fn from_config(config: &EvaluationConfig) -> Self {
        Self::new(config.prefetch_threshold).with_assignment(config.partition_assignment)
    }

    pub fn with_assignment(mut self, assignment: PartitionAssignment) -> Self {
        self.assignment = assignment;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Score `test` against a trained clusterer.
    pub fn evaluate<C>(&self, clusterer: &C, test: &Dataset) -> ClusterResult<Evaluation>
    where
        C: Clusterer + ?Sized,
    {
        if !clusterer.is_trained() {
            return Err(ClusterError::NotTrained);
        }
        if test.dim() != clusterer.dim() {
            return Err(ClusterError::DimensionMismatch {
                expected: clusterer.dim(),
                actual: test.dim(),
            });
        }

        let assignment = if clusterer.supports_index_aliasing() {
            self.assignment
        } else {
            if self.assignment != PartitionAssignment::Nearest {
                tracing::debug!(
                    target: "evaluation",
                    "clusterer does not support index aliasing, using nearest unit"
                );
            }
            PartitionAssignment::Nearest
        };

        let mut tally = PrefetchTally::default();
        for (idx, vector) in test.iter().enumerate() {
            let unit = match assignment {
                PartitionAssignment::Nearest => clusterer.nearest_unit(vector)?,
                PartitionAssignment::TrainingIndex => clusterer
                    .find_unit(idx)
                    .ok_or(ClusterError::UnassignedPoint { index: idx })?,
            };
            tally.record(clusterer.prototype(unit), vector, self.threshold);
        }

        let evaluation = Evaluation::from_tally(self.threshold, assignment, tally);
        if evaluation.hitrate.is_none() || evaluation.accuracy.is_none() {
            tracing::warn!(
                target: "evaluation",
                "undefined rate: {} requests, {} prefetches",
                tally.requested,
                tally.prefetched
            );
        }
        tracing::info!(
            target: "evaluation",
            "{} test vectors: {} hits, {} prefetched, {} requested",
            test.len(),
            tally.hits,
            tally.prefetched,
            tally.requested
        );
        Ok(evaluation)
    }
}
