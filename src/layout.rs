//! Two-dimensional placement of states.
//!
//! The finest kept scale is projected from centroid space onto the plane
//! with a rank-2 SVD of the (row-centered) centroid matrix. With a single
//! expanded dimension an SVD says nothing about the second axis, so states
//! are spread around the unit circle instead. Coarser states sit at the mean
//! position of their initial states.
//!
//! Radii make circle areas proportional to stationary probability:
//!
//! ```text
//! r = √(p / π)
//! ```
//!
//! After projection the finest scale is rescaled so the circles cover about
//! half of their bounding box and the box becomes square:
//!
//! ```text
//! fx = √(0.5 · Σπr² / (W · H))      fy = fx · W / H
//! ```
//!
//! Overlapping circles are then pushed apart in small steps until no pair
//! within a scale overlaps.

use std::f64::consts::{PI, TAU};

use faer::Mat;
use rand::prelude::*;
use tracing::{debug, warn};

use crate::dataset::{ColumnKind, Dataset};
use crate::hierarchy::{Partition, State, StateId};
use crate::kernel::{Centroid, CentroidComponent};

/// Arranges the states of the kept scales on the plane.
#[derive(Debug, Clone)]
pub struct Layout {
    seed: u64,
    /// Distance moved per overlap correction.
    step: f64,
    /// Circles closer than this multiple of their radius sum count as overlapping.
    overlap_extra: f64,
    /// Share of the bounding box the finest scale's circles should cover.
    occupancy: f64,
    max_passes: usize,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            seed: 123,
            step: 0.02,
            overlap_extra: 1.1,
            occupancy: 0.5,
            max_passes: 10_000,
        }
    }
}

/// States at adjacent scales made of the same initial states.
#[derive(Debug, Clone, Copy, Default)]
struct SameAs {
    /// Position in the next coarser scale.
    parent: Option<usize>,
    /// Position in the next finer scale.
    child: Option<usize>,
}

impl Layout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed of the projection and of the overlap-removal order.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Cap on overlap-removal passes over all scales.
    pub fn with_max_passes(mut self, passes: usize) -> Self {
        self.max_passes = passes;
        self
    }

    /// Set position and radius of every state of the scales `selected`
    /// (indices into `chain`, finest first).
    ///
    /// `chain[0]` must be the initial partition.
    pub fn place(&self, dataset: &Dataset, states: &mut [State], chain: &[Partition], selected: &[usize]) {
        let Some(&finest) = selected.first() else {
            return;
        };
        for &scale in selected {
            let partition = &chain[scale];
            for (pos, &id) in partition.states.iter().enumerate() {
                states[id].radius = (partition.stationary[pos] / PI).sqrt();
            }
        }

        let finest_ids = &chain[finest].states;
        let centroids: Vec<&Centroid> = finest_ids.iter().map(|&id| &states[id].centroid).collect();
        let positions = project_centroids(dataset, &centroids);
        for (&id, (x, y)) in finest_ids.iter().zip(positions) {
            states[id].x = x;
            states[id].y = y;
        }
        self.spread(states, finest_ids);

        let initial_ids = &chain[0].states;
        for &scale in &selected[1..] {
            for &id in &chain[scale].states {
                let inits = &states[id].initial_states;
                let n = inits.len().max(1) as f64;
                let (sx, sy) = inits.iter().fold((0.0, 0.0), |(sx, sy), &init| {
                    let s = &states[initial_ids[init]];
                    (sx + s.x, sy + s.y)
                });
                states[id].x = sx / n;
                states[id].y = sy / n;
            }
        }

        let scales: Vec<&[StateId]> = selected.iter().map(|&s| chain[s].states.as_slice()).collect();
        self.remove_overlaps(states, &scales);
    }

    /// Scale positions about the bounding-box center so the circles cover
    /// `occupancy` of the box and the box is as tall as it is wide.
    fn spread(&self, states: &mut [State], ids: &[StateId]) {
        let (mut x_min, mut x_max) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut y_min, mut y_max) = (f64::INFINITY, f64::NEG_INFINITY);
        let mut covered = 0.0;
        for &id in ids {
            let s = &states[id];
            x_min = x_min.min(s.x - s.radius);
            x_max = x_max.max(s.x + s.radius);
            y_min = y_min.min(s.y - s.radius);
            y_max = y_max.max(s.y + s.radius);
            covered += PI * s.radius * s.radius;
        }
        let (width, height) = (x_max - x_min, y_max - y_min);
        let box_area = width * height;
        if !(box_area.is_finite() && box_area > 1e-12) {
            return;
        }
        let factor_x = (covered * self.occupancy / box_area).sqrt();
        let factor_y = if height > 1e-12 {
            factor_x * width / height
        } else {
            factor_x
        };
        let (x_mid, y_mid) = ((x_min + x_max) / 2.0, (y_min + y_max) / 2.0);
        debug!(factor_x, factor_y, "rescaling finest scale");
        for &id in ids {
            states[id].x = (states[id].x - x_mid) * factor_x;
            states[id].y = (states[id].y - y_mid) * factor_y;
        }
    }

    /// Push overlapping circles apart, scale by scale, until nothing moves.
    fn remove_overlaps(&self, states: &mut [State], scales: &[&[StateId]]) {
        let links = same_as_links(states, scales);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut passes = 0;
        loop {
            let mut moved = false;
            for (scale, ids) in scales.iter().enumerate() {
                let mut order: Vec<usize> = (0..ids.len()).collect();
                order.shuffle(&mut rng);
                for i in 0..order.len() {
                    for j in i + 1..order.len() {
                        let (a, b) = (ids[order[i]], ids[order[j]]);
                        let mut dx = states[a].x - states[b].x;
                        let mut dy = states[a].y - states[b].y;
                        let mut dist = (dx * dx + dy * dy).sqrt();
                        if dist > (states[a].radius + states[b].radius) * self.overlap_extra {
                            continue;
                        }
                        moved = true;
                        if dist < 1e-6 {
                            let angle = rng.random::<f64>() * TAU;
                            (dx, dy, dist) = (angle.cos(), angle.sin(), 1.0);
                        }
                        states[a].x += dx * self.step / dist;
                        states[a].y += dy * self.step / dist;
                        propagate(states, scales, &links, scale, order[i]);
                    }
                }
            }
            passes += 1;
            if !moved {
                break;
            }
            if passes >= self.max_passes {
                warn!(passes, "overlaps remain after the pass limit");
                break;
            }
        }
        debug!(passes, "overlap removal finished");
    }
}

/// Link every state to the set-identical state at the neighbouring scales.
fn same_as_links(states: &[State], scales: &[&[StateId]]) -> Vec<Vec<SameAs>> {
    let mut links: Vec<Vec<SameAs>> = scales.iter().map(|ids| vec![SameAs::default(); ids.len()]).collect();
    for scale in 0..scales.len().saturating_sub(1) {
        for (pos, &id) in scales[scale].iter().enumerate() {
            let parent = scales[scale + 1]
                .iter()
                .position(|&p| states[p].initial_states == states[id].initial_states);
            if let Some(parent) = parent {
                links[scale][pos].parent = Some(parent);
                links[scale + 1][parent].child = Some(pos);
            }
        }
    }
    links
}

/// Copy the position of `scales[scale][pos]` along its chains of identical states.
fn propagate(states: &mut [State], scales: &[&[StateId]], links: &[Vec<SameAs>], scale: usize, pos: usize) {
    let source = scales[scale][pos];
    let (x, y) = (states[source].x, states[source].y);

    let (mut cur, mut p) = (scale, pos);
    while let Some(child) = links[cur][p].child {
        cur -= 1;
        p = child;
        let id = scales[cur][p];
        states[id].x = x;
        states[id].y = y;
    }
    let (mut cur, mut p) = (scale, pos);
    while let Some(parent) = links[cur][p].parent {
        cur += 1;
        p = parent;
        let id = scales[cur][p];
        states[id].x = x;
        states[id].y = y;
    }
}

/// Plane coordinates of the given centroids.
///
/// Every non-time column expands to weighted dimensions: one for a numeric
/// column, one per key for categorical and text columns, all scaled by
/// `√weight` (a zero-weight column still counts, as an all-zero row). A
/// single dimension is mapped to angles on the unit circle; otherwise the
/// coordinates are `(s₀·V[·,0], s₁·V[·,1])` from the thin SVD
/// `X = U·S·Vᵀ` of the row-centered centroid matrix.
pub fn project_centroids(dataset: &Dataset, centroids: &[&Centroid]) -> Vec<(f64, f64)> {
    let n_states = centroids.len();
    let x = centroid_matrix(dataset, centroids);
    let n_dim = x.nrows();
    debug!(n_dim, n_states, "projecting states");

    if n_dim == 1 {
        let values: Vec<f64> = (0..n_states).map(|s| x[(0, s)]).collect();
        return polar_positions(&values);
    }
    if n_dim == 0 || n_states == 0 {
        return vec![(0.0, 0.0); n_states];
    }

    let mut centered = x;
    for r in 0..n_dim {
        let mean = (0..n_states).map(|s| centered[(r, s)]).sum::<f64>() / n_states as f64;
        for s in 0..n_states {
            centered[(r, s)] -= mean;
        }
    }
    let svd = match centered.thin_svd() {
        Ok(svd) => svd,
        Err(err) => {
            warn!(?err, "centroid SVD failed; states start at the origin");
            return vec![(0.0, 0.0); n_states];
        }
    };
    let sigma = svd.S().column_vector();
    let v = svd.V();
    let coord = |s: usize, k: usize| {
        if k < v.ncols() {
            sigma[k] * v[(s, k)]
        } else {
            0.0
        }
    };
    (0..n_states).map(|s| (coord(s, 0), coord(s, 1))).collect()
}

/// Unit-circle positions whose angles grow linearly with `values`.
///
/// The range is stretched by `n / (n − 1)` so the largest value does not
/// land on top of the smallest. All-equal values all map to angle 0.
pub fn polar_positions(values: &[f64]) -> Vec<(f64, f64)> {
    let n = values.len();
    let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = (hi - lo) * n as f64 / n.saturating_sub(1).max(1) as f64;
    values
        .iter()
        .map(|&v| {
            let angle = if range < 1e-8 { 0.0 } else { (v - lo) / range * TAU };
            (angle.cos(), angle.sin())
        })
        .collect()
}

/// Dense `n_dim × n_states` matrix of weighted centroid coordinates.
fn centroid_matrix(dataset: &Dataset, centroids: &[&Centroid]) -> Mat<f64> {
    let used: Vec<(usize, usize)> = dataset
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, col)| col.kind() != ColumnKind::Time)
        .map(|(idx, col)| {
            let width = match col.kind() {
                ColumnKind::Numeric => 1,
                ColumnKind::Categorical | ColumnKind::Text => col.n_keys(),
                ColumnKind::Time => 0,
            };
            (idx, width)
        })
        .collect();
    let n_dim: usize = used.iter().map(|&(_, w)| w).sum();

    let mut x = Mat::<f64>::zeros(n_dim, centroids.len());
    for (s, centroid) in centroids.iter().enumerate() {
        let mut offset = 0;
        for &(idx, width) in &used {
            let w = dataset.column(idx).weight().sqrt();
            match centroid.component(idx) {
                CentroidComponent::Scalar(v) => x[(offset, s)] = w * v,
                CentroidComponent::Dense(values) => {
                    for (k, v) in values.iter().enumerate().take(width) {
                        x[(offset + k, s)] = w * v;
                    }
                }
                CentroidComponent::Sparse(sparse) => {
                    for (k, v) in sparse.iter().filter(|&(k, _)| k < width) {
                        x[(offset + k, s)] = w * v;
                    }
                }
            }
            offset += width;
        }
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{AttributeKind, AttributeSpec, DatasetBuilder};

    fn numeric(columns: usize, rows: &[&[f64]]) -> Dataset {
        let specs = (0..columns)
            .map(|c| AttributeSpec::new(format!("x{c}"), AttributeKind::NumericFloat).with_dist_weight(1.0))
            .collect();
        let mut builder = DatasetBuilder::new(specs).unwrap();
        for row in rows {
            let values: Vec<_> = row.iter().map(|&v| v.into()).collect();
            builder.push_row(&values);
        }
        builder.build().unwrap()
    }

    fn singleton_centroids(ds: &Dataset) -> Vec<Centroid> {
        (0..ds.n_rows()).map(|r| Centroid::mean_of_rows(ds, &[r])).collect()
    }

    #[test]
    fn test_single_dimension_uses_unit_circle() {
        let ds = numeric(1, &[&[1.0], &[2.0], &[3.0]]);
        let centroids = singleton_centroids(&ds);
        let refs: Vec<&Centroid> = centroids.iter().collect();
        let pos = project_centroids(&ds, &refs);

        let angles: Vec<f64> = pos.iter().map(|&(x, y)| y.atan2(x).rem_euclid(TAU)).collect();
        for &(x, y) in &pos {
            assert!(((x * x + y * y) - 1.0).abs() < 1e-12);
        }
        assert!(angles[0].abs() < 1e-12);
        assert!(angles[0] < angles[1] && angles[1] < angles[2]);
        assert!((angles[1] - TAU / 3.0).abs() < 1e-9);
        assert!((angles[2] - 2.0 * TAU / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_equal_values_map_to_angle_zero() {
        let pos = polar_positions(&[4.0, 4.0]);
        assert_eq!(pos, vec![(1.0, 0.0), (1.0, 0.0)]);
    }

    #[test]
    fn test_svd_projection_preserves_planar_distances() {
        let ds = numeric(2, &[&[0.0, 0.0], &[10.0, 0.0], &[0.0, 10.0]]);
        let centroids = singleton_centroids(&ds);
        let refs: Vec<&Centroid> = centroids.iter().collect();
        let pos = project_centroids(&ds, &refs);
        for i in 0..3 {
            for j in i + 1..3 {
                let expected = ds.centroid_dist2(&centroids[i], &centroids[j]).sqrt();
                let (dx, dy) = (pos[i].0 - pos[j].0, pos[i].1 - pos[j].1);
                let got = (dx * dx + dy * dy).sqrt();
                assert!((got - expected).abs() < 1e-9, "{got} vs {expected}");
            }
        }
    }

    fn dist(a: (f64, f64), b: (f64, f64)) -> f64 {
        ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
    }

    #[test]
    fn test_close_singular_values_keep_leading_axes() {
        // Axis spreads 1, 0.99 and 0.98: the third axis must collapse.
        let ds = numeric(
            3,
            &[
                &[1.0, 0.0, 0.0],
                &[-1.0, 0.0, 0.0],
                &[0.0, 0.99, 0.0],
                &[0.0, -0.99, 0.0],
                &[0.0, 0.0, 0.98],
                &[0.0, 0.0, -0.98],
            ],
        );
        let centroids = singleton_centroids(&ds);
        let refs: Vec<&Centroid> = centroids.iter().collect();
        let pos = project_centroids(&ds, &refs);

        assert!((dist(pos[0], pos[1]) - 2.0).abs() < 1e-9);
        assert!((dist(pos[2], pos[3]) - 1.98).abs() < 1e-9);
        for &(x, y) in &pos[4..] {
            assert!(x.abs() < 1e-9 && y.abs() < 1e-9, "({x}, {y})");
        }
    }

    #[test]
    fn test_zero_weight_column_still_counts_as_dimension() {
        let mut builder = DatasetBuilder::new(vec![
            AttributeSpec::new("x", AttributeKind::NumericFloat).with_dist_weight(1.0),
            AttributeSpec::new("y", AttributeKind::NumericFloat).with_dist_weight(0.0),
        ])
        .unwrap();
        for (x, y) in [(1.0, 7.0), (2.0, -3.0), (3.0, 5.0)] {
            builder.push_row(&[x.into(), y.into()]);
        }
        let ds = builder.build().unwrap();
        let centroids = singleton_centroids(&ds);
        let refs: Vec<&Centroid> = centroids.iter().collect();
        let pos = project_centroids(&ds, &refs);

        // Two dimensions, so no unit circle: everything lies on one line.
        for &(_, y) in &pos {
            assert!(y.abs() < 1e-9);
        }
        assert!((dist(pos[0], pos[1]) - 1.0).abs() < 1e-9);
        assert!((dist(pos[0], pos[2]) - 2.0).abs() < 1e-9);
    }

    fn lone_state(centroid: Centroid, init: usize, x: f64, y: f64, radius: f64) -> State {
        let mut s = State::new(vec![init], vec![init], centroid);
        s.x = x;
        s.y = y;
        s.radius = radius;
        s
    }

    #[test]
    fn test_rescale_squares_box_at_half_occupancy() {
        let ds = numeric(1, &[&[0.0], &[0.0], &[0.0], &[0.0]]);
        let mut states: Vec<State> = [(0.0, 0.0), (10.0, 0.0), (0.0, 2.0), (10.0, 2.0)]
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| lone_state(Centroid::zeros(&ds), i, x, y, 0.5))
            .collect();
        Layout::new().spread(&mut states, &[0, 1, 2, 3]);

        // Box before rescaling: 11 wide, 3 tall, four circles of area π/4.
        let (width, height, covered) = (11.0, 3.0, PI);
        let fx = (states[1].x - states[0].x) / 10.0;
        let fy = (states[2].y - states[0].y) / 2.0;
        assert!((fx * fx * width * height - 0.5 * covered).abs() < 1e-12);
        assert!((fx * width - fy * height).abs() < 1e-12);
        assert!((states[0].x + 5.0 * fx).abs() < 1e-12);
        assert!((states[0].y + fy).abs() < 1e-12);
        assert!((states[3].x - 5.0 * fx).abs() < 1e-12);
        assert!((states[3].y - fy).abs() < 1e-12);
        assert!((states[0].radius - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_coincident_states_are_separated() {
        let ds = numeric(1, &[&[0.0], &[0.0]]);
        let mut states = vec![
            lone_state(Centroid::zeros(&ds), 0, 0.0, 0.0, 0.1),
            lone_state(Centroid::zeros(&ds), 1, 0.0, 0.0, 0.1),
        ];
        let ids = [0, 1];
        Layout::new().remove_overlaps(&mut states, &[&ids]);
        let d = ((states[0].x - states[1].x).powi(2) + (states[0].y - states[1].y).powi(2)).sqrt();
        assert!(d > 0.2 * 1.1, "distance {d}");
    }

    #[test]
    fn test_identical_states_move_together() {
        let ds = numeric(1, &[&[0.0], &[0.0], &[0.0]]);
        let mut states = vec![
            lone_state(Centroid::zeros(&ds), 0, 0.0, 0.0, 0.1),
            lone_state(Centroid::zeros(&ds), 1, 0.05, 0.0, 0.1),
            lone_state(Centroid::zeros(&ds), 2, 5.0, 0.0, 0.1),
            // Same initial state as 0, but a separate arena entry.
            lone_state(Centroid::zeros(&ds), 0, 0.0, 0.0, 0.1),
        ];
        let fine = [0, 1, 2];
        let coarse = [3, 2];
        Layout::new().remove_overlaps(&mut states, &[&fine, &coarse]);
        assert_eq!((states[0].x, states[0].y), (states[3].x, states[3].y));
    }

    #[test]
    fn test_place_sets_radius_from_stationary_probability() {
        let ds = numeric(2, &[&[0.0, 0.0], &[10.0, 0.0], &[0.0, 10.0], &[10.0, 10.0]]);
        let mut states: Vec<State> = (0..4)
            .map(|r| State::new(vec![r], vec![r], Centroid::mean_of_rows(&ds, &[r])))
            .collect();
        states.push(State::merged(&states[0], &states[1]));
        let mut fine = Partition::new(vec![0, 1, 2, 3], vec![0, 1, 2, 3]);
        fine.stationary = vec![0.25; 4];
        let mut coarse = Partition::new(vec![4, 2, 3], vec![0, 0, 1, 2]);
        coarse.stationary = vec![0.5, 0.25, 0.25];
        let chain = vec![fine, coarse];

        Layout::new().place(&ds, &mut states, &chain, &[0, 1]);
        assert!((states[0].radius - (0.25 / PI).sqrt()).abs() < 1e-12);
        assert!((states[4].radius - (0.5 / PI).sqrt()).abs() < 1e-12);
        for s in &states {
            assert!(s.x.is_finite() && s.y.is_finite());
        }
    }
}
