//! Partition clustering (k-means).
//!
//! Training seeds k clusters with distinct random training points, then
//! alternates prototype recomputation and nearest-prototype reassignment until
//! the configured [`ConvergenceRule`] holds or `max_iterations` is reached.

use std::collections::BTreeSet;

use rand::prelude::*;
use serde::Serialize;

use super::{Clusterer, TrainSummary, seeded_rng};
use crate::config::Settings;
use crate::dataset::Dataset;
use crate::error::{ClusterError, ClusterResult};
use crate::metric;

/// When reassignment is considered settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ConvergenceRule {
    /// Stop after the first iteration in which no point changes cluster
    #[default]
    NoTransfers,
    /// Stop once the last `window` iterations all produced the same transfer count.
    /// A window of 1 stops after the first iteration.
    StableTransfers { window: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct Cluster {
    /// Mean of the current members
    pub prototype: Vec<f32>,
    pub current_members: BTreeSet<usize>,
    /// Points that left this cluster in the most recent reassignment
    pub previous_members: BTreeSet<usize>,
    /// Set when the last recomputation found no members; the prototype was kept
    pub starved: bool,
}

impl Cluster {
    fn new(dim: usize) -> Self {
        Self {
            prototype: vec![0.0; dim],
            current_members: BTreeSet::new(),
            previous_members: BTreeSet::new(),
            starved: false,
        }
    }
}

pub struct PartitionClusterer<'a> {
    data: &'a Dataset,
    clusters: Vec<Cluster>,
    /// Owning cluster per training index, mirrors the membership sets
    assignments: Vec<Option<usize>>,
    rule: ConvergenceRule,
    max_iterations: usize,
    rng: StdRng,
    seed: u64,
    trained: bool,
}

impl<'a> PartitionClusterer<'a> {
    /// Create an untrained clusterer with `k` clusters over `data`.
    ///
    /// `k` must satisfy `1 <= k <= data.len()`.
    pub fn new(data: &'a Dataset, k: usize, seed: Option<u64>) -> ClusterResult<Self> {
        if k == 0 || k > data.len() {
            return Err(ClusterError::InvalidConfiguration(format!(
                "k must be in 1..={}, got {k}",
                data.len()
            )));
        }

        let (rng, seed) = seeded_rng(seed);
        Ok(Self {
            data,
            clusters: (0..k).map(|_| Cluster::new(data.dim())).collect(),
            assignments: vec![None; data.len()],
            rule: ConvergenceRule::default(),
            max_iterations: 1000,
            rng,
            seed,
            trained: false,
        })
    }

    /// Build from layered settings (`kmeans` section and `seed`)
    pub fn from_settings(data: &'a Dataset, settings: &Settings) -> ClusterResult<Self> {
        Ok(Self::new(data, settings.kmeans.k, settings.seed)?
            .with_convergence(settings.kmeans.convergence_rule())
            .with_max_iterations(settings.kmeans.max_iterations))
    }

    pub fn with_convergence(mut self, rule: ConvergenceRule) -> Self {
        self.rule = rule;
        self
    }

    /// Zero is clamped to one iteration
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn k(&self) -> usize {
        self.clusters.len()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// Cluster currently owning training point `index`, if any
    pub fn find_cluster(&self, index: usize) -> Option<usize> {
        self.find_unit(index)
    }

    /// Draw k distinct training indices; a repeated draw is discarded and redrawn.
    fn seed_clusters(&mut self) -> Vec<usize> {
        let n = self.data.len();
        let k = self.clusters.len();
        let mut drawn = BTreeSet::new();
        let mut seeds = Vec::with_capacity(k);

        while seeds.len() < k {
            let idx = self.rng.random_range(0..n);
            if drawn.insert(idx) {
                seeds.push(idx);
            }
        }

        for (c, (cluster, &idx)) in self.clusters.iter_mut().zip(&seeds).enumerate() {
            cluster.current_members = BTreeSet::from([idx]);
            cluster.previous_members.clear();
            cluster.starved = false;
            self.assignments[idx] = Some(c);
        }
        seeds
    }

    /// Recompute every prototype as the mean of its members. Empty clusters keep
    /// their prototype and are returned as starved.
    fn recompute_prototypes(&mut self) -> Vec<usize> {
        let data = self.data;
        let mut starved = Vec::new();

        for (c, cluster) in self.clusters.iter_mut().enumerate() {
            if cluster.current_members.is_empty() {
                if !cluster.starved {
                    tracing::warn!(target: "kmeans", "cluster {c} has no members, keeping its prototype");
                }
                cluster.starved = true;
                starved.push(c);
                continue;
            }

            let mut sums = vec![0.0f64; data.dim()];
            for &idx in &cluster.current_members {
                for (sum, x) in sums.iter_mut().zip(&data[idx]) {
                    *sum += f64::from(*x);
                }
            }
            let count = cluster.current_members.len() as f64;
            for (p, sum) in cluster.prototype.iter_mut().zip(sums) {
                *p = (sum / count) as f32;
            }
            cluster.starved = false;
        }
        starved
    }

    /// Assign every point to its nearest prototype and rebuild the membership
    /// sets. Prototypes are only read here. Returns the number of transfers.
    fn reassign(&mut self) -> usize {
        let owners: Vec<usize> = self
            .data
            .iter()
            .map(|vector| {
                metric::nearest(vector, self.clusters.iter().map(|c| c.prototype.as_slice()))
                    .map(|(c, _)| c)
                    .unwrap_or(0)
            })
            .collect();

        for cluster in &mut self.clusters {
            cluster.current_members.clear();
            cluster.previous_members.clear();
        }

        let mut transfers = 0;
        for (idx, owner) in owners.into_iter().enumerate() {
            if let Some(prev) = self.assignments[idx] {
                if prev != owner {
                    transfers += 1;
                    self.clusters[prev].previous_members.insert(idx);
                }
            }
            self.clusters[owner].current_members.insert(idx);
            self.assignments[idx] = Some(owner);
        }
        transfers
    }
}

impl Clusterer for PartitionClusterer<'_> {
    fn train(&mut self) -> ClusterResult<TrainSummary> {
        if self.trained {
            return Err(ClusterError::AlreadyTrained);
        }

        let seeds = self.seed_clusters();
        tracing::debug!(target: "kmeans", "seeded {} clusters from points {seeds:?}", seeds.len());

        let mut starved: BTreeSet<usize> = self.recompute_prototypes().into_iter().collect();
        let initial = self.reassign();
        tracing::debug!(target: "kmeans", "initial assignment moved {initial} seed points");

        let mut iterations = 0;
        let mut converged = false;
        let mut last_transfers = initial;
        let mut previous: Option<usize> = None;
        let mut streak = 0;

        while iterations < self.max_iterations {
            iterations += 1;
            starved.extend(self.recompute_prototypes());
            let transfers = self.reassign();
            last_transfers = transfers;
            tracing::debug!(target: "kmeans", "iteration {iterations}: {transfers} transfers");

            match self.rule {
                ConvergenceRule::NoTransfers => {
                    if transfers == 0 {
                        converged = true;
                        break;
                    }
                }
                ConvergenceRule::StableTransfers { window } => {
                    if previous == Some(transfers) {
                        streak += 1;
                    } else {
                        streak = 1;
                    }
                    previous = Some(transfers);
                    if streak >= window {
                        converged = true;
                        break;
                    }
                }
            }
        }

        if converged {
            tracing::info!(
                target: "kmeans",
                "converged after {iterations} iterations (k={}, seed={})",
                self.k(),
                self.seed
            );
        } else {
            tracing::warn!(
                target: "kmeans",
                "stopped at iteration cap {} with {last_transfers} transfers still pending",
                self.max_iterations
            );
        }

        self.trained = true;
        Ok(TrainSummary {
            iterations,
            converged,
            last_transfers,
            starved: starved.into_iter().collect(),
        })
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn dim(&self) -> usize {
        self.data.dim()
    }

    fn unit_count(&self) -> usize {
        self.clusters.len()
    }

    fn prototype(&self, unit: usize) -> &[f32] {
        &self.clusters[unit].prototype
    }

    fn members(&self, unit: usize) -> &BTreeSet<usize> {
        &self.clusters[unit].current_members
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_groups() -> Dataset {
        Dataset::new(vec![
            vec![1.0, 1.0, 0.0, 0.0],
            vec![1.0, 1.0, 1.0, 0.0],
            vec![1.0, 1.0, 0.0, 0.0],
            vec![0.0, 0.0, 1.0, 1.0],
            vec![0.0, 0.0, 1.0, 1.0],
            vec![0.0, 1.0, 1.0, 1.0],
        ])
        .unwrap()
    }

    /// Two groups far enough apart that any pair of distinct seeds splits them
    fn separated() -> Dataset {
        Dataset::new(vec![
            vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0],
            vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0],
            vec![1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0],
        ])
        .unwrap()
    }

    fn assert_partition(clusterer: &PartitionClusterer<'_>, n: usize) {
        let mut seen = BTreeSet::new();
        for c in 0..clusterer.unit_count() {
            for &idx in clusterer.members(c) {
                assert!(seen.insert(idx), "point {idx} is in more than one cluster");
            }
        }
        assert_eq!(seen, (0..n).collect::<BTreeSet<_>>());
    }

    #[test]
    fn test_identical_points_single_cluster() {
        let data = Dataset::new(vec![vec![1.0, 0.0]; 4]).unwrap();
        let mut km = PartitionClusterer::new(&data, 1, Some(1)).unwrap();
        let summary = km.train().unwrap();

        assert!(summary.converged);
        assert_eq!(km.members(0), &BTreeSet::from([0, 1, 2, 3]));
        assert_eq!(km.prototype(0), &[1.0, 0.0]);
    }

    #[test]
    fn test_invalid_k_rejected() {
        let data = Dataset::new(vec![vec![1.0, 0.0]; 3]).unwrap();
        assert!(matches!(
            PartitionClusterer::new(&data, 0, Some(1)),
            Err(ClusterError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            PartitionClusterer::new(&data, 4, Some(1)),
            Err(ClusterError::InvalidConfiguration(_))
        ));
        assert!(PartitionClusterer::new(&data, 3, Some(1)).is_ok());
    }

    #[test]
    fn test_separates_two_groups() {
        let data = separated();
        for seed in 0..10 {
            let mut km = PartitionClusterer::new(&data, 2, Some(seed)).unwrap();
            let summary = km.train().unwrap();
            assert!(summary.converged, "seed {seed}");
            assert_partition(&km, data.len());

            let a = km.find_cluster(0).unwrap();
            let b = km.find_cluster(1).unwrap();
            assert_ne!(a, b, "seed {seed}");
            assert_eq!(km.members(a), &BTreeSet::from([0, 2]), "seed {seed}");
            assert_eq!(km.members(b), &BTreeSet::from([1, 3]), "seed {seed}");

            assert_eq!(km.prototype(a), &[1.0, 1.0, 1.0, 0.5, 0.0, 0.0, 0.0, 0.0]);
            assert_eq!(km.prototype(b), &[0.0, 0.0, 0.0, 0.0, 0.5, 1.0, 1.0, 1.0]);
        }
    }

    #[test]
    fn test_k_equals_n_gives_singletons() {
        let data = two_groups();
        let distinct = Dataset::new(vec![
            vec![0.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![1.0, 1.0],
        ])
        .unwrap();
        let mut km = PartitionClusterer::new(&distinct, 4, Some(3)).unwrap();
        let summary = km.train().unwrap();
        assert!(summary.converged);
        assert!(summary.starved.is_empty());
        for c in 0..4 {
            assert_eq!(km.members(c).len(), 1);
        }
        assert_partition(&km, distinct.len());

        // Duplicated points: k = n still seeds n distinct indices
        let mut km = PartitionClusterer::new(&data, data.len(), Some(5)).unwrap();
        km.train().unwrap();
        assert_partition(&km, data.len());
    }

    #[test]
    fn test_starved_cluster_keeps_prototype() {
        let data = Dataset::new(vec![vec![1.0, 0.0]; 4]).unwrap();
        let mut km = PartitionClusterer::new(&data, 2, Some(11)).unwrap();
        let summary = km.train().unwrap();

        // Every point ties between both clusters and the lowest index wins
        assert_eq!(km.members(0), &BTreeSet::from([0, 1, 2, 3]));
        assert!(km.members(1).is_empty());
        assert_eq!(summary.starved, vec![1]);
        assert!(km.clusters()[1].starved);
        assert_eq!(km.prototype(1), &[1.0, 0.0]);
        assert_partition(&km, data.len());
    }

    #[test]
    fn test_same_seed_same_result() {
        let data = separated();
        let mut a = PartitionClusterer::new(&data, 3, Some(42)).unwrap();
        let mut b = PartitionClusterer::new(&data, 3, Some(42)).unwrap();
        a.train().unwrap();
        b.train().unwrap();
        for c in 0..3 {
            assert_eq!(a.members(c), b.members(c));
            assert_eq!(a.prototype(c), b.prototype(c));
        }
    }

    #[test]
    fn test_train_twice_fails() {
        let data = separated();
        let mut km = PartitionClusterer::new(&data, 2, Some(1)).unwrap();
        km.train().unwrap();
        assert!(matches!(km.train(), Err(ClusterError::AlreadyTrained)));
    }

    #[test]
    fn test_stable_transfers_rule() {
        let data = separated();
        let mut km = PartitionClusterer::new(&data, 2, Some(8))
            .unwrap()
            .with_convergence(ConvergenceRule::StableTransfers { window: 3 });
        let summary = km.train().unwrap();
        assert!(summary.converged);
        assert!(summary.iterations >= 3);
        assert_eq!(summary.last_transfers, 0);
    }

    #[test]
    fn test_stable_window_counts_iterations() {
        // A single cluster never transfers, so every iteration repeats the count
        let data = Dataset::new(vec![vec![1.0, 0.0]; 4]).unwrap();
        for window in [1, 3, 50] {
            let mut km = PartitionClusterer::new(&data, 1, Some(3))
                .unwrap()
                .with_convergence(ConvergenceRule::StableTransfers { window });
            let summary = km.train().unwrap();
            assert!(summary.converged);
            assert_eq!(summary.iterations, window, "window {window}");
        }
    }

    #[test]
    fn test_iteration_cap() {
        let data = separated();
        let mut km = PartitionClusterer::new(&data, 2, Some(8))
            .unwrap()
            .with_convergence(ConvergenceRule::StableTransfers { window: 100 })
            .with_max_iterations(5);
        let summary = km.train().unwrap();
        assert!(!summary.converged);
        assert_eq!(summary.iterations, 5);
        assert_partition(&km, data.len());
    }

    #[test]
    fn test_find_cluster() {
        let data = separated();
        let mut km = PartitionClusterer::new(&data, 2, Some(2)).unwrap();
        assert_eq!(km.find_cluster(0), None);
        km.train().unwrap();
        for idx in 0..data.len() {
            let c = km.find_cluster(idx).unwrap();
            assert!(km.members(c).contains(&idx));
        }
        assert_eq!(km.find_cluster(data.len()), None);
    }

    #[test]
    fn test_prototype_length_matches_dim() {
        let data = separated();
        let mut km = PartitionClusterer::new(&data, 3, Some(6)).unwrap();
        km.train().unwrap();
        for c in 0..km.k() {
            assert_eq!(km.prototype(c).len(), data.dim());
        }
    }

    #[test]
    fn test_nearest_unit_requires_training() {
        let data = two_groups();
        let km = PartitionClusterer::new(&data, 2, Some(2)).unwrap();
        assert!(matches!(
            km.nearest_unit(&[1.0, 1.0, 0.0, 0.0]),
            Err(ClusterError::NotTrained)
        ));
    }
}
