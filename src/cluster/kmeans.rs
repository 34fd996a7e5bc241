//! K-means clustering over arbitrary point spaces.
//!
//! Partitions points into k clusters by minimizing the within-cluster
//! distance to the centroid, using Lloyd's reassignment loop.
//!
//! # Seeding
//!
//! Instead of k-means++, seeds are chosen by a max–min separation search:
//! several random draws of k distinct points are scored by
//!
//! ```text
//! score = Σᵢ min_{j≠i} d²(seedᵢ, seedⱼ)
//! ```
//!
//! and the best-scoring draw wins. When k ≥ n, points are assigned to
//! clusters cyclically and no search takes place.
//!
//! # Lloyd's Loop
//!
//! 1. **Assign**: each point → nearest seed (a seed point always joins its own cluster)
//! 2. **Update**: each centroid → mean of its members
//! 3. **Reassign** against the centroids, recompute, and repeat
//!
//! The loop tracks `quality = Σ √d²(point, centroid)` and the number of
//! points that changed cluster (`moves`). It stops after `max_phases`, or
//! earlier once quality improves by less than `min_rel_improvement` or fewer
//! than `min_rel_moves · n` points move, whichever comes first (never before
//! `min_phases` phases).
//!
//! Empty clusters are kept; their centroid stays at zero.

use rand::prelude::*;
use tracing::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::traits::PointSpace;
use crate::dataset::Dataset;
use crate::kernel::Centroid;

/// Lloyd-style k-means with max–min seed selection.
#[derive(Debug, Clone)]
pub struct Kmeans {
    /// Number of clusters.
    k: usize,
    /// Random seed draws to score.
    seed_trials: usize,
    /// Maximum reassignment phases.
    max_phases: usize,
    /// Stop once quality improves by less than this share.
    min_rel_improvement: f64,
    /// Stop once fewer than this share of points move.
    min_rel_moves: f64,
    /// Never stop before this many phases.
    min_phases: usize,
    /// Random seed.
    seed: u64,
}

/// Outcome of a k-means run.
#[derive(Debug, Clone)]
pub struct KmeansFit<C> {
    /// Cluster of every point.
    pub assignments: Vec<usize>,
    /// Members of every cluster, ascending.
    pub members: Vec<Vec<usize>>,
    /// Final centroids (zero for empty clusters).
    pub centroids: Vec<C>,
    /// Σ √d² of every point to its assigned centroid.
    pub quality: f64,
    /// Reassignment phases run.
    pub phases: usize,
}

impl Kmeans {
    /// Create a new K-means clusterer.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            seed_trials: 30,
            max_phases: 10,
            min_rel_improvement: 0.01,
            min_rel_moves: 0.01,
            min_phases: 0,
            seed: 123,
        }
    }

    /// Set the number of seed draws.
    pub fn with_seed_trials(mut self, trials: usize) -> Self {
        self.seed_trials = trials.max(1);
        self
    }

    /// Set the phase cap.
    pub fn with_max_phases(mut self, phases: usize) -> Self {
        self.max_phases = phases;
        self
    }

    /// Set the relative quality-improvement stop threshold.
    pub fn with_min_rel_improvement(mut self, share: f64) -> Self {
        self.min_rel_improvement = share;
        self
    }

    /// Set the relative-moves stop threshold.
    pub fn with_min_rel_moves(mut self, share: f64) -> Self {
        self.min_rel_moves = share;
        self
    }

    /// Set the number of phases that always run.
    pub fn with_min_phases(mut self, phases: usize) -> Self {
        self.min_phases = phases;
        self
    }

    /// Set random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Number of clusters.
    pub fn n_clusters(&self) -> usize {
        self.k
    }

    /// Pick seed points. Cyclic when `k >= n`.
    fn select_seeds<S: PointSpace>(&self, space: &S, rng: &mut impl Rng) -> Vec<usize> {
        let n = space.n_points();
        if self.k >= n {
            return (0..self.k).map(|i| i % n).collect();
        }

        let mut best: Vec<usize> = Vec::new();
        let mut best_score = f64::NEG_INFINITY;
        for _ in 0..self.seed_trials {
            let mut seeds: Vec<usize> = Vec::with_capacity(self.k);
            while seeds.len() < self.k {
                let candidate = rng.random_range(0..n);
                if !seeds.contains(&candidate) {
                    seeds.push(candidate);
                }
            }

            let score: f64 = seeds
                .iter()
                .enumerate()
                .map(|(i, &a)| {
                    seeds
                        .iter()
                        .enumerate()
                        .filter(|&(j, _)| j != i)
                        .map(|(_, &b)| space.point_dist2(a, b))
                        .fold(f64::INFINITY, f64::min)
                })
                .map(|d| if d.is_finite() { d } else { 0.0 })
                .sum();

            if best.is_empty() || score > best_score {
                best_score = score;
                best = seeds;
            }
        }
        best
    }

    /// Cluster every point of `space`.
    pub fn fit<S: PointSpace>(&self, space: &S) -> KmeansFit<S::Centroid> {
        let n = space.n_points();
        let k = self.k;
        if n == 0 || k == 0 {
            return KmeansFit {
                assignments: vec![0; n],
                members: vec![Vec::new(); k],
                centroids: (0..k).map(|_| space.empty_centroid()).collect(),
                quality: 0.0,
                phases: 0,
            };
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let seeds = self.select_seeds(space, &mut rng);

        // Initial assignment against the seed points themselves.
        let mut assignments = vec![0usize; n];
        let mut quality = 0.0;
        for (point, slot) in assignments.iter_mut().enumerate() {
            let mut best = 0;
            let mut best_dist = f64::INFINITY;
            for (cluster, &seed) in seeds.iter().enumerate() {
                if point == seed {
                    best = cluster;
                    best_dist = 0.0;
                    break;
                }
                let dist = space.point_dist2(point, seed);
                if dist < best_dist {
                    best = cluster;
                    best_dist = dist;
                }
            }
            *slot = best;
            quality += best_dist.max(0.0).sqrt();
        }
        let (mut members, mut centroids) = self.recompute(space, &assignments);

        let mut phases = 0;
        for phase in 0..self.max_phases {
            let nearest = nearest_centroids(space, &centroids);
            let new_quality: f64 = nearest.iter().map(|&(_, d)| d.max(0.0).sqrt()).sum();
            let moves = nearest
                .iter()
                .zip(&assignments)
                .filter(|((new, _), old)| new != *old)
                .count();
            for (slot, (cluster, _)) in assignments.iter_mut().zip(&nearest) {
                *slot = *cluster;
            }
            (members, centroids) = self.recompute(space, &assignments);
            phases = phase + 1;

            debug!(
                phase,
                max_phases = self.max_phases,
                moves,
                n,
                quality,
                new_quality,
                "k-means phase"
            );

            let stalled = new_quality > quality * (1.0 - self.min_rel_improvement);
            let stable = (moves as f64) < n as f64 * self.min_rel_moves;
            quality = new_quality;
            if phase >= self.min_phases && (stalled || stable) {
                break;
            }
        }

        KmeansFit {
            assignments,
            members,
            centroids,
            quality,
            phases,
        }
    }

    fn recompute<S: PointSpace>(
        &self,
        space: &S,
        assignments: &[usize],
    ) -> (Vec<Vec<usize>>, Vec<S::Centroid>) {
        let mut members = vec![Vec::new(); self.k];
        let mut centroids: Vec<S::Centroid> = (0..self.k).map(|_| space.empty_centroid()).collect();
        for (point, &cluster) in assignments.iter().enumerate() {
            members[cluster].push(point);
            space.accumulate(&mut centroids[cluster], point);
        }
        for (centroid, m) in centroids.iter_mut().zip(&members) {
            space.scale(centroid, 1.0 / m.len().max(1) as f64);
        }
        (members, centroids)
    }
}

/// Nearest centroid (first minimum wins) and its squared distance, per point.
fn nearest_centroids<S: PointSpace>(space: &S, centroids: &[S::Centroid]) -> Vec<(usize, f64)> {
    let nearest = |point: usize| {
        let mut best = 0;
        let mut best_dist = f64::INFINITY;
        for (cluster, centroid) in centroids.iter().enumerate() {
            let dist = space.centroid_dist2(point, centroid);
            if dist < best_dist {
                best = cluster;
                best_dist = dist;
            }
        }
        (best, best_dist)
    };

    #[cfg(feature = "parallel")]
    let result = (0..space.n_points()).into_par_iter().map(nearest).collect();

    #[cfg(not(feature = "parallel"))]
    let result = (0..space.n_points()).map(nearest).collect();

    result
}

/// Rows of a dataset as points, measured by the dataset kernel.
#[derive(Debug, Clone, Copy)]
pub struct DatasetSpace<'a> {
    dataset: &'a Dataset,
}

impl<'a> DatasetSpace<'a> {
    /// Wrap a dataset.
    pub fn new(dataset: &'a Dataset) -> Self {
        Self { dataset }
    }
}

impl PointSpace for DatasetSpace<'_> {
    type Centroid = Centroid;

    fn n_points(&self) -> usize {
        self.dataset.n_rows()
    }

    fn point_dist2(&self, a: usize, b: usize) -> f64 {
        self.dataset.row_dist2(a, b)
    }

    fn centroid_dist2(&self, point: usize, centroid: &Centroid) -> f64 {
        self.dataset.row_centroid_dist2(point, centroid)
    }

    fn empty_centroid(&self) -> Centroid {
        Centroid::zeros(self.dataset)
    }

    fn accumulate(&self, centroid: &mut Centroid, point: usize) {
        centroid.add_row(self.dataset, point, 1.0);
    }

    fn scale(&self, centroid: &mut Centroid, coef: f64) {
        centroid.scale(coef);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::VectorSpace;
    use crate::dataset::{AttributeKind, AttributeSpec, DatasetBuilder};
    use crate::kernel::CentroidComponent;

    fn numeric_dataset(values: &[f64]) -> Dataset {
        let mut builder =
            DatasetBuilder::new(vec![AttributeSpec::new("x", AttributeKind::NumericFloat)
                .with_dist_weight(1.0)])
            .unwrap();
        for &v in values {
            builder.push_row(&[v.into()]);
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_two_well_separated_groups() {
        let ds = numeric_dataset(&[0.0, 0.0, 0.0, 10.0, 10.0, 10.0]);
        let fit = Kmeans::new(2).fit(&DatasetSpace::new(&ds));

        let mut sizes: Vec<usize> = fit.members.iter().map(Vec::len).collect();
        sizes.sort();
        assert_eq!(sizes, vec![3, 3]);
        assert_eq!(fit.assignments[0], fit.assignments[1]);
        assert_eq!(fit.assignments[0], fit.assignments[2]);
        assert_eq!(fit.assignments[3], fit.assignments[5]);
        assert_ne!(fit.assignments[0], fit.assignments[3]);

        for (members, centroid) in fit.members.iter().zip(&fit.centroids) {
            let expected = if members[0] < 3 { 0.0 } else { 10.0 };
            match centroid.component(0) {
                CentroidComponent::Scalar(v) => assert!((v - expected).abs() < 1e-9),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_k_at_least_n_is_cyclic() {
        let ds = numeric_dataset(&[1.0, 2.0, 3.0]);
        let fit = Kmeans::new(5).fit(&DatasetSpace::new(&ds));

        assert_eq!(fit.assignments, vec![0, 1, 2]);
        assert_eq!(fit.members.len(), 5);
        assert!(fit.members[3].is_empty());
        assert!(fit.members[4].is_empty());
        assert!(matches!(
            fit.centroids[4].component(0),
            CentroidComponent::Scalar(v) if *v == 0.0
        ));
    }

    #[test]
    fn test_identical_points_keep_seed_clusters_nonempty() {
        let points = vec![vec![1.0], vec![1.0], vec![1.0], vec![1.0]];
        let fit = Kmeans::new(2).fit(&VectorSpace::new(&points, 1));

        assert_eq!(fit.assignments.len(), 4);
        assert_eq!(fit.members.iter().map(Vec::len).sum::<usize>(), 4);
    }

    #[test]
    fn test_deterministic_with_seed() {
        let points: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![(i % 7) as f64, (i / 7) as f64 * 0.3])
            .collect();
        let space = VectorSpace::new(&points, 2);
        let a = Kmeans::new(4).with_seed(9).fit(&space);
        let b = Kmeans::new(4).with_seed(9).fit(&space);
        assert_eq!(a.assignments, b.assignments);
        assert_eq!(a.quality, b.quality);
    }

    #[test]
    fn test_all_points_assigned_once() {
        let points: Vec<Vec<f64>> = (0..50)
            .map(|i| vec![i as f64 * 0.1, (i % 5) as f64])
            .collect();
        let fit = Kmeans::new(5).fit(&VectorSpace::new(&points, 2));

        let mut seen = vec![0; 50];
        for m in &fit.members {
            for &p in m {
                seen[p] += 1;
            }
        }
        assert!(seen.iter().all(|&c| c == 1));
        assert!(fit.assignments.iter().all(|&c| c < 5));
    }

    #[test]
    fn test_min_phases_forces_phases() {
        let points = vec![vec![0.0], vec![0.1], vec![5.0], vec![5.1]];
        let space = VectorSpace::new(&points, 1);
        let fit = Kmeans::new(2).with_min_phases(3).fit(&space);
        assert_eq!(fit.phases, 4);
        let quick = Kmeans::new(2).fit(&space);
        assert_eq!(quick.phases, 1);
    }
}
