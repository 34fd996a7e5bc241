//! Transition structure of each scale and eigenvalue-based scale selection.
//!
//! # Transition matrices
//!
//! Rows are read as a time series. Counting consecutive pairs of initial
//! states gives the initial transition matrix; its stationary probabilities
//! are plain occupancy shares. A coarser partition inherits the joint mass
//!
//! ```text
//! P(cur = A, next = B) = Σ_{i∈A} Σ_{j∈B} P(next = j | cur = i) · π(i)
//! ```
//!
//! which is then renormalized per row. A state seen only on the last row
//! has no outgoing mass and keeps an all-zero row.
//!
//! # Eigenvalues
//!
//! [`dominant_eigenpairs`] runs power iteration with deflation against the
//! directions found so far. Transition matrices are not symmetric, so the
//! deflated directions are only approximately eigenvectors past the first;
//! the values are used as a signature for comparing scales, not as an exact
//! spectrum.
//!
//! # Scale selection
//!
//! Every partition but the initial one becomes a point whose coordinates are
//! its zero-padded eigenvalues. K-means over those points groups scales
//! with similar dynamics; the member nearest each cluster centroid is kept,
//! together with the initial partition.

use ndarray::{Array1, Array2};
use rand::prelude::*;
use tracing::{debug, info};

use crate::cluster::{Kmeans, VectorSpace};
use crate::hierarchy::Partition;

const POWER_ITERATIONS: usize = 30;
const CONVERGENCE: f64 = 1e-5;

/// Transition counts between consecutive rows, as probabilities.
///
/// Returns the occupancy share of every initial state and the row-normalized
/// transition matrix.
pub fn initial_transitions(row_to_initial: &[usize], n_initial: usize) -> (Vec<f64>, Array2<f64>) {
    let n_rows = row_to_initial.len();
    let mut stationary = vec![0.0; n_initial];
    let mut transitions = Array2::<f64>::zeros((n_initial, n_initial));
    for (row, &si) in row_to_initial.iter().enumerate() {
        stationary[si] += 1.0;
        if let Some(&sj) = row_to_initial.get(row + 1) {
            transitions[[si, sj]] += 1.0;
        }
    }
    for (i, p) in stationary.iter_mut().enumerate() {
        if n_rows > 0 {
            *p /= n_rows as f64;
        }
        let mut row = transitions.row_mut(i);
        let total = row.sum();
        if total > 0.0 {
            row /= total;
        }
    }
    (stationary, transitions)
}

/// Fill in the stationary probabilities and transition matrix of `partition`.
pub fn aggregate_transitions(
    partition: &mut Partition,
    initial_transitions: &Array2<f64>,
    initial_stationary: &[f64],
) {
    let m = partition.n_states();
    let map = &partition.initial_to_state;
    let mut stationary = vec![0.0; m];
    for (i, &p) in initial_stationary.iter().enumerate() {
        stationary[map[i]] += p;
    }

    let mut joint = Array2::<f64>::zeros((m, m));
    for ((i, j), &p) in initial_transitions.indexed_iter() {
        joint[[map[i], map[j]]] += p * initial_stationary[i];
    }
    for mut row in joint.rows_mut() {
        let total = row.sum();
        let coef = if total <= 1e-16 { 0.0 } else { 1.0 / total };
        row *= coef;
    }

    partition.stationary = stationary;
    partition.transitions = joint;
}

fn normalize(v: &mut Array1<f64>) {
    let norm = v.dot(v).sqrt();
    if norm > 0.0 {
        *v /= norm;
    }
}

/// Top `k` eigenvalues of `matrix` by power iteration with deflation.
///
/// Each direction starts from a random unit vector, iterates `y = A·x`,
/// projects out the directions already found and renormalizes, and stops
/// after 30 iterations or once consecutive iterates have a dot product of
/// at least `1 − 1e-5`. The eigenvalue is the Rayleigh quotient `xᵀAx`.
/// Returns the values and the directions as matrix columns.
pub fn dominant_eigenpairs(
    matrix: &Array2<f64>,
    k: usize,
    rng: &mut impl Rng,
) -> (Vec<f64>, Array2<f64>) {
    let n = matrix.nrows();
    let k = k.min(n);
    let mut values = Vec::with_capacity(k);
    let mut vectors = Array2::<f64>::zeros((n, k));

    for i in 0..k {
        let mut x: Array1<f64> = (0..n).map(|_| rng.random::<f64>()).collect();
        normalize(&mut x);
        let mut iterations = 0;
        for iter in 0..POWER_ITERATIONS {
            let mut y = matrix.dot(&x);
            for prev in 0..i {
                let v = vectors.column(prev);
                let dot = y.dot(&v);
                y.scaled_add(-dot, &v);
            }
            normalize(&mut y);
            iterations = iter + 1;
            if x.dot(&y) >= 1.0 - CONVERGENCE {
                break;
            }
            x = y;
        }
        let lambda = x.dot(&matrix.dot(&x));
        debug!(direction = i, iterations, lambda, "power iteration");
        vectors.column_mut(i).assign(&x);
        values.push(lambda);
    }
    (values, vectors)
}

/// Chooses a representative subset of scales from an aggregation chain.
#[derive(Debug, Clone)]
pub struct ScaleSelector {
    /// Upper bound on the number of scales kept besides the initial one.
    max_scales: usize,
    /// Base random seed.
    seed: u64,
}

impl Default for ScaleSelector {
    fn default() -> Self {
        Self {
            max_scales: 10,
            seed: 123,
        }
    }
}

impl ScaleSelector {
    /// Create a selector with the default bound of 10 scales.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scale bound.
    pub fn with_max_scales(mut self, max_scales: usize) -> Self {
        self.max_scales = max_scales;
        self
    }

    /// Set the base random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Compute transitions, stationary probabilities and padded eigenvalues
    /// for every partition of the chain.
    ///
    /// The eigen search of an `m`-state partition is seeded with `seed + m`.
    pub fn compute_spectra(&self, chain: &mut [Partition], row_to_initial: &[usize]) {
        let Some(n_initial) = chain.first().map(Partition::n_states) else {
            return;
        };
        let (init_stationary, init_transitions) = initial_transitions(row_to_initial, n_initial);
        for partition in chain.iter_mut() {
            aggregate_transitions(partition, &init_transitions, &init_stationary);
            let m = partition.n_states();
            let mut rng = StdRng::seed_from_u64(self.seed + m as u64);
            let (mut values, _) = dominant_eigenpairs(&partition.transitions, m, &mut rng);
            values.resize(n_initial, 0.0);
            debug!(n_states = m, eigenvalues = ?values, "scale spectrum");
            partition.eigenvalues = values;
        }
    }

    /// Indices into `chain` of the scales to keep, finest first.
    ///
    /// Keeps `min(max_scales, len / 2)` representatives plus the initial
    /// partition; a chain too short for that to be a real choice is kept
    /// whole. Requires [`ScaleSelector::compute_spectra`] to have run.
    pub fn select(&self, chain: &[Partition]) -> Vec<usize> {
        let n_scales = self.max_scales.min(chain.len() / 2);
        if n_scales < 2 || n_scales >= chain.len() {
            return (0..chain.len()).collect();
        }
        self.select_n(chain, n_scales)
    }

    /// Cluster the non-initial partitions into `n_clusters` groups by eigenvalue
    /// signature and keep one representative of each.
    pub fn select_n(&self, chain: &[Partition], n_clusters: usize) -> Vec<usize> {
        if chain.len() <= 1 {
            return (0..chain.len()).collect();
        }
        let dim = chain[0].eigenvalues.len();
        let points: Vec<Vec<f64>> = chain[1..].iter().map(|p| p.eigenvalues.clone()).collect();
        let space = VectorSpace::new(&points, dim);
        let fit = Kmeans::new(n_clusters)
            .with_seed_trials(100)
            .with_min_rel_moves(0.1)
            .with_min_phases(3)
            .with_seed(self.seed)
            .fit(&space);

        let mut selected = vec![0];
        for (members, centroid) in fit.members.iter().zip(&fit.centroids) {
            let mut best: Option<(usize, f64)> = None;
            for &point in members {
                let dist: f64 = points[point]
                    .iter()
                    .zip(centroid)
                    .map(|(a, b)| (a - b).powi(2))
                    .sum();
                if best.map_or(true, |(_, d)| dist < d) {
                    best = Some((point, dist));
                }
            }
            if let Some((point, _)) = best {
                selected.push(point + 1);
            }
        }
        selected.sort_by(|&a, &b| chain[b].n_states().cmp(&chain[a].n_states()));
        selected.dedup();
        info!(
            selected = ?selected.iter().map(|&i| chain[i].n_states()).collect::<Vec<_>>(),
            "selected scales"
        );
        selected
    }
}
