//! Topological clustering (Kohonen self-organizing map).
//!
//! An n×n grid of prototypes, initialized uniformly in `[0, 1)`, is trained for
//! a fixed number of epochs. In each epoch every training vector, in dataset
//! order, pulls the prototypes inside a square window around its best-matching
//! unit (BMU) towards itself:
//!
//! ```text
//! learning_rate(t) = eta0 * (1 - t / epochs)
//! radius(t)        = (n / 2) * (1 - t / epochs)
//! prototype        = (1 - learning_rate) * prototype + learning_rate * input
//! ```
//!
//! The update is flat inside the window and absent outside it. After the last
//! epoch every training point is assigned to its BMU.

use std::collections::BTreeSet;
use std::ops::Range;

use rand::prelude::*;
use serde::Serialize;

use super::{Clusterer, TrainSummary, seeded_rng};
use crate::config::Settings;
use crate::dataset::Dataset;
use crate::error::{ClusterError, ClusterResult};
use crate::metric;

pub const DEFAULT_LEARNING_RATE: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct GridPosition {
    pub row: usize,
    pub col: usize,
}

impl GridPosition {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Unit {
    pub prototype: Vec<f32>,
    pub current_members: BTreeSet<usize>,
}

pub struct TopologicalClusterer<'a> {
    data: &'a Dataset,
    n: usize,
    epochs: usize,
    initial_learning_rate: f64,
    /// Row-major, `n * n` units
    units: Vec<Unit>,
    seed: u64,
    trained: bool,
}

impl<'a> TopologicalClusterer<'a> {
    /// Create an `n`×`n` map with random prototypes drawn from the seeded generator.
    pub fn new(
        data: &'a Dataset,
        grid_size: usize,
        epochs: usize,
        seed: Option<u64>,
    ) -> ClusterResult<Self> {
        if grid_size == 0 {
            return Err(ClusterError::InvalidConfiguration(
                "grid size must be at least 1".to_string(),
            ));
        }
        if epochs == 0 {
            return Err(ClusterError::InvalidConfiguration(
                "epochs must be at least 1".to_string(),
            ));
        }

        let (mut rng, seed) = seeded_rng(seed);
        let dim = data.dim();
        let units = (0..grid_size * grid_size)
            .map(|_| Unit {
                prototype: (0..dim).map(|_| rng.random::<f32>()).collect(),
                current_members: BTreeSet::new(),
            })
            .collect();

        Ok(Self {
            data,
            n: grid_size,
            epochs,
            initial_learning_rate: DEFAULT_LEARNING_RATE,
            units,
            seed,
            trained: false,
        })
    }

    /// Build from layered settings (`som` section and `seed`)
    pub fn from_settings(data: &'a Dataset, settings: &Settings) -> ClusterResult<Self> {
        Self::new(data, settings.som.grid_size, settings.som.epochs, settings.seed)?
            .with_learning_rate(settings.som.initial_learning_rate)
    }

    /// Override the initial learning rate; must lie in `(0, 1]`.
    pub fn with_learning_rate(mut self, rate: f64) -> ClusterResult<Self> {
        if !(rate > 0.0 && rate <= 1.0) {
            return Err(ClusterError::InvalidConfiguration(format!(
                "initial learning rate must be in (0, 1], got {rate}"
            )));
        }
        self.initial_learning_rate = rate;
        Ok(self)
    }

    pub fn grid_size(&self) -> usize {
        self.n
    }

    pub fn epochs(&self) -> usize {
        self.epochs
    }

    pub fn initial_learning_rate(&self) -> f64 {
        self.initial_learning_rate
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn learning_rate(&self, epoch: usize) -> f64 {
        self.initial_learning_rate * self.decay(epoch)
    }

    pub fn neighborhood_radius(&self, epoch: usize) -> f64 {
        self.n as f64 / 2.0 * self.decay(epoch)
    }

    /// Linear decay reaching exactly zero at `epochs`
    fn decay(&self, epoch: usize) -> f64 {
        1.0 - epoch as f64 / self.epochs as f64
    }

    pub fn position(&self, unit: usize) -> GridPosition {
        GridPosition::new(unit / self.n, unit % self.n)
    }

    pub fn unit_index(&self, pos: GridPosition) -> usize {
        pos.row * self.n + pos.col
    }

    /// Best-matching unit; ties go to the first unit in row-major order.
    pub fn bmu(&self, vector: &[f32]) -> ClusterResult<GridPosition> {
        if vector.len() != self.data.dim() {
            return Err(ClusterError::DimensionMismatch {
                expected: self.data.dim(),
                actual: vector.len(),
            });
        }
        Ok(self.position(self.bmu_index(vector)))
    }

    fn bmu_index(&self, vector: &[f32]) -> usize {
        metric::nearest(vector, self.units.iter().map(|u| u.prototype.as_slice()))
            .map(|(unit, _)| unit)
            .unwrap_or(0)
    }

    /// Row and column ranges of the square window of half-width `radius`
    /// around `center`, inclusive and clipped to the grid.
    pub fn neighborhood(&self, center: GridPosition, radius: f64) -> (Range<usize>, Range<usize>) {
        let span = |c: usize| {
            let c = c as f64;
            let lo = (c - radius).ceil().max(0.0) as usize;
            let hi = ((c + radius).floor() as usize + 1).min(self.n);
            lo..hi
        };
        (span(center.row), span(center.col))
    }

    /// Move every prototype in the window around `center` towards `input`.
    fn update_neighborhood(
        &mut self,
        center: GridPosition,
        radius: f64,
        learning_rate: f64,
        input: &[f32],
    ) {
        let (rows, cols) = self.neighborhood(center, radius);
        for row in rows {
            for col in cols.clone() {
                let idx = self.unit_index(GridPosition::new(row, col));
                for (p, x) in self.units[idx].prototype.iter_mut().zip(input) {
                    *p = ((1.0 - learning_rate) * f64::from(*p)
                        + learning_rate * f64::from(*x)) as f32;
                }
            }
        }
    }

    fn assign_members(&mut self) {
        for unit in &mut self.units {
            unit.current_members.clear();
        }
        let data = self.data;
        for (idx, vector) in data.iter().enumerate() {
            let bmu = self.bmu_index(vector);
            self.units[bmu].current_members.insert(idx);
        }
    }
}

impl Clusterer for TopologicalClusterer<'_> {
    fn train(&mut self) -> ClusterResult<TrainSummary> {
        if self.trained {
            return Err(ClusterError::AlreadyTrained);
        }

        let data = self.data;
        for epoch in 0..self.epochs {
            let rate = self.learning_rate(epoch);
            let radius = self.neighborhood_radius(epoch);
            tracing::debug!(
                target: "som",
                "epoch {epoch}/{}: learning rate {rate:.4}, radius {radius:.4}",
                self.epochs
            );

            for vector in data.iter() {
                let bmu = self.position(self.bmu_index(vector));
                self.update_neighborhood(bmu, radius, rate, vector);
            }
        }

        self.assign_members();
        self.trained = true;

        let occupied = self
            .units
            .iter()
            .filter(|u| !u.current_members.is_empty())
            .count();
        tracing::info!(
            target: "som",
            "trained {}x{} map for {} epochs (seed={}), {occupied} units occupied",
            self.n,
            self.n,
            self.epochs,
            self.seed
        );

        Ok(TrainSummary {
            iterations: self.epochs,
            converged: true,
            last_transfers: 0,
            starved: Vec::new(),
        })
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn dim(&self) -> usize {
        self.data.dim()
    }

    fn unit_count(&self) -> usize {
        self.units.len()
    }

    fn prototype(&self, unit: usize) -> &[f32] {
        &self.units[unit].prototype
    }

    fn members(&self, unit: usize) -> &BTreeSet<usize> {
        &self.units[unit].current_members
    }

    /// Test vectors are always scored against their own BMU
    fn supports_index_aliasing(&self) -> bool {
        false
    }

    fn unit_label(&self, unit: usize) -> String {
        let pos = self.position(unit);
        format!("[{}][{}]", pos.row, pos.col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(som: &TopologicalClusterer<'_>) -> Vec<Vec<f32>> {
        som.units().iter().map(|u| u.prototype.clone()).collect()
    }

    fn expected_update(old: &[f32], input: &[f32], rate: f64) -> Vec<f32> {
        old.iter()
            .zip(input)
            .map(|(p, x)| ((1.0 - rate) * f64::from(*p) + rate * f64::from(*x)) as f32)
            .collect()
    }

    #[test]
    fn test_schedule_decays_linearly() {
        let data = Dataset::new(vec![vec![1.0, 0.0]]).unwrap();
        let som = TopologicalClusterer::new(&data, 4, 10, Some(1)).unwrap();

        assert_eq!(som.learning_rate(0), 0.8);
        assert!((som.learning_rate(9) - 0.08).abs() < 1e-12);
        assert!(som.learning_rate(10).abs() < 1e-12);
        assert_eq!(som.neighborhood_radius(0), 2.0);
        assert!((som.neighborhood_radius(5) - 1.0).abs() < 1e-12);

        for t in 1..10 {
            assert!(som.learning_rate(t) < som.learning_rate(t - 1));
            assert!(som.neighborhood_radius(t) < som.neighborhood_radius(t - 1));
        }
    }

    #[test]
    fn test_initial_prototypes_in_unit_interval() {
        let data = Dataset::new(vec![vec![0.0; 5]]).unwrap();
        let som = TopologicalClusterer::new(&data, 3, 1, Some(9)).unwrap();
        assert_eq!(som.unit_count(), 9);
        for unit in som.units() {
            assert_eq!(unit.prototype.len(), 5);
            assert!(unit.prototype.iter().all(|&x| (0.0..1.0).contains(&x)));
        }
    }

    #[test]
    fn test_invalid_configuration() {
        let data = Dataset::new(vec![vec![1.0]]).unwrap();
        assert!(TopologicalClusterer::new(&data, 0, 5, Some(1)).is_err());
        assert!(TopologicalClusterer::new(&data, 2, 0, Some(1)).is_err());

        let som = TopologicalClusterer::new(&data, 2, 5, Some(1)).unwrap();
        assert!(som.with_learning_rate(0.0).is_err());
        let som = TopologicalClusterer::new(&data, 2, 5, Some(1)).unwrap();
        assert!(som.with_learning_rate(1.5).is_err());
        let som = TopologicalClusterer::new(&data, 2, 5, Some(1)).unwrap();
        assert_eq!(som.with_learning_rate(1.0).unwrap().initial_learning_rate(), 1.0);
    }

    #[test]
    fn test_neighborhood_window_is_clipped() {
        let data = Dataset::new(vec![vec![1.0]]).unwrap();
        let som = TopologicalClusterer::new(&data, 4, 1, Some(1)).unwrap();

        assert_eq!(som.neighborhood(GridPosition::new(0, 0), 2.0), (0..3, 0..3));
        assert_eq!(som.neighborhood(GridPosition::new(3, 1), 0.5), (3..4, 1..2));
        assert_eq!(som.neighborhood(GridPosition::new(2, 2), 1.5), (1..4, 1..4));
        assert_eq!(som.neighborhood(GridPosition::new(1, 2), 10.0), (0..4, 0..4));
    }

    #[test]
    fn test_two_by_two_single_epoch_moves_whole_window() {
        let data = Dataset::new(vec![vec![1.0, 1.0]]).unwrap();
        let mut som = TopologicalClusterer::new(&data, 2, 1, Some(5)).unwrap();
        let before = snapshot(&som);

        som.train().unwrap();

        // Radius at epoch 0 is n/2 = 1, so the window covers the whole 2x2 grid
        for (unit, old) in before.iter().enumerate() {
            assert_eq!(som.prototype(unit), expected_update(old, &[1.0, 1.0], 0.8).as_slice());
        }
        let bmu = som.bmu(&[1.0, 1.0]).unwrap();
        assert_eq!(som.members(som.unit_index(bmu)), &BTreeSet::from([0]));
    }

    #[test]
    fn test_units_outside_window_keep_initial_values() {
        let data = Dataset::new(vec![vec![1.0, 1.0]]).unwrap();
        let mut som = TopologicalClusterer::new(&data, 4, 1, Some(17)).unwrap();
        let before = snapshot(&som);
        let bmu = som.bmu(&[1.0, 1.0]).unwrap();
        let (rows, cols) = som.neighborhood(bmu, som.neighborhood_radius(0));

        som.train().unwrap();

        let mut moved = 0;
        for (unit, old) in before.iter().enumerate() {
            let pos = som.position(unit);
            if rows.contains(&pos.row) && cols.contains(&pos.col) {
                moved += 1;
                assert_eq!(som.prototype(unit), expected_update(old, &[1.0, 1.0], 0.8).as_slice());
            } else {
                assert_eq!(som.prototype(unit), old.as_slice());
            }
        }
        assert_eq!(moved, rows.len() * cols.len());
    }

    #[test]
    fn test_corner_update_leaves_far_units_alone() {
        let data = Dataset::new(vec![vec![1.0, 1.0]]).unwrap();
        let mut som = TopologicalClusterer::new(&data, 4, 1, Some(2)).unwrap();
        let before = snapshot(&som);

        som.update_neighborhood(GridPosition::new(0, 0), 1.0, 0.5, &[1.0, 1.0]);

        for (unit, old) in before.iter().enumerate() {
            let pos = som.position(unit);
            if pos.row <= 1 && pos.col <= 1 {
                assert_eq!(som.prototype(unit), expected_update(old, &[1.0, 1.0], 0.5).as_slice());
            } else {
                assert_eq!(som.prototype(unit), old.as_slice());
            }
        }
    }

    #[test]
    fn test_update_never_moves_bmu_away() {
        let data = Dataset::new(vec![vec![1.0, 0.0, 1.0]]).unwrap();
        let mut som = TopologicalClusterer::new(&data, 3, 4, Some(23)).unwrap();
        let input = [1.0, 0.0, 1.0];

        let bmu = som.bmu(&input).unwrap();
        let before = metric::distance(som.prototype(som.unit_index(bmu)), &input).unwrap();
        som.update_neighborhood(bmu, 0.5, 0.3, &input);

        let after_bmu = som.bmu(&input).unwrap();
        let after = metric::distance(som.prototype(som.unit_index(after_bmu)), &input).unwrap();
        assert!(after <= before);
    }

    #[test]
    fn test_identical_points_share_unit() {
        let data = Dataset::new(vec![
            vec![1.0, 0.0, 1.0],
            vec![1.0, 0.0, 1.0],
            vec![1.0, 0.0, 1.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 1.0, 0.0],
        ])
        .unwrap();
        let mut som = TopologicalClusterer::new(&data, 2, 20, Some(3)).unwrap();
        let summary = som.train().unwrap();
        assert_eq!(summary.iterations, 20);

        let a = som.find_unit(0).unwrap();
        let b = som.find_unit(3).unwrap();
        assert_ne!(a, b);
        assert_eq!(som.members(a), &BTreeSet::from([0, 1, 2]));
        assert_eq!(som.members(b), &BTreeSet::from([3, 4]));

        let total: usize = (0..som.unit_count()).map(|u| som.members(u).len()).sum();
        assert_eq!(total, data.len());
    }

    #[test]
    fn test_same_seed_same_map() {
        let data = Dataset::new(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]]).unwrap();
        let mut a = TopologicalClusterer::new(&data, 3, 10, Some(77)).unwrap();
        let mut b = TopologicalClusterer::new(&data, 3, 10, Some(77)).unwrap();
        a.train().unwrap();
        b.train().unwrap();
        assert_eq!(snapshot(&a), snapshot(&b));
    }

    #[test]
    fn test_train_twice_fails() {
        let data = Dataset::new(vec![vec![1.0, 0.0]]).unwrap();
        let mut som = TopologicalClusterer::new(&data, 2, 2, Some(1)).unwrap();
        som.train().unwrap();
        assert!(matches!(som.train(), Err(ClusterError::AlreadyTrained)));
    }

    #[test]
    fn test_unit_labels() {
        let data = Dataset::new(vec![vec![1.0, 0.0]]).unwrap();
        let som = TopologicalClusterer::new(&data, 3, 2, Some(1)).unwrap();
        assert_eq!(som.unit_label(5), "[1][2]");
        assert_eq!(som.position(5), GridPosition::new(1, 2));
        assert_eq!(som.unit_index(GridPosition::new(2, 0)), 6);
    }
}
