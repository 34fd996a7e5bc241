//! Heterogeneous weighted distance and centroid kernel.
//!
//! Every distance here is a weighted sum of squared per-column differences:
//!
//! ```text
//! d²(a, b) = Σ_c  w_c · δ_c(a, b)²
//! ```
//!
//! | Column kind | δ² between rows | Centroid representation |
//! |-------------|-----------------|--------------------------|
//! | Numeric     | (v₁ − v₂)²      | scalar mean              |
//! | Categorical | 1 if keys differ | dense key-frequency vector |
//! | Text        | ‖a − b‖² over token weights | sparse token → weight map |
//! | Time        | excluded        | scalar mean (for export only) |
//!
//! Categorical and text distances against centroids use the quadratic
//! expansion `‖a‖² + ‖b‖² − 2·a·b`, so a row never has to be materialized
//! as a dense indicator vector. Columns with weight 0 are skipped.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::dataset::{ColumnData, Dataset};

/// Sparse token → weight map with a lazily cached squared norm.
#[derive(Debug, Clone, Default)]
pub struct SparseCentroid {
    weights: BTreeMap<usize, f64>,
    norm2: OnceLock<f64>,
}

impl SparseCentroid {
    /// Weight of `key`, 0 if absent.
    pub fn get(&self, key: usize) -> f64 {
        self.weights.get(&key).copied().unwrap_or(0.0)
    }

    /// Squared Euclidean norm; computed on first use after a mutation.
    pub fn norm2(&self) -> f64 {
        *self
            .norm2
            .get_or_init(|| self.weights.values().map(|w| w * w).sum())
    }

    /// Non-zero entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.weights.iter().map(|(&k, &w)| (k, w))
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// True if no entry is stored.
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    fn add(&mut self, key: usize, weight: f64) {
        *self.weights.entry(key).or_insert(0.0) += weight;
        self.norm2.take();
    }

    fn scale(&mut self, coef: f64) {
        for w in self.weights.values_mut() {
            *w *= coef;
        }
        self.norm2.take();
    }

    fn dot(&self, other: &SparseCentroid) -> f64 {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.iter().map(|(k, w)| w * large.get(k)).sum()
    }
}

/// Per-column aggregate of a set of rows.
#[derive(Debug, Clone)]
pub enum CentroidComponent {
    /// Numeric or time column.
    Scalar(f64),
    /// Categorical column, indexed by key index.
    Dense(Vec<f64>),
    /// Text column.
    Sparse(SparseCentroid),
}

impl CentroidComponent {
    /// `self += coef * other`; both sides must describe the same column.
    fn add(&mut self, other: &CentroidComponent, coef: f64) {
        match (self, other) {
            (CentroidComponent::Scalar(a), CentroidComponent::Scalar(b)) => *a += coef * b,
            (CentroidComponent::Dense(a), CentroidComponent::Dense(b)) => {
                debug_assert_eq!(a.len(), b.len());
                for (x, y) in a.iter_mut().zip(b) {
                    *x += coef * y;
                }
            }
            (CentroidComponent::Sparse(a), CentroidComponent::Sparse(b)) => {
                for (k, w) in b.iter() {
                    a.add(k, coef * w);
                }
            }
            _ => debug_assert!(false, "centroid components of different kinds"),
        }
    }

    fn scale(&mut self, coef: f64) {
        match self {
            CentroidComponent::Scalar(a) => *a *= coef,
            CentroidComponent::Dense(a) => a.iter_mut().for_each(|x| *x *= coef),
            CentroidComponent::Sparse(a) => a.scale(coef),
        }
    }
}

/// One component per dataset column.
#[derive(Debug, Clone)]
pub struct Centroid {
    components: Vec<CentroidComponent>,
}

impl Centroid {
    /// All-zero centroid shaped after the dataset's columns.
    pub fn zeros(dataset: &Dataset) -> Self {
        let components = dataset
            .columns()
            .iter()
            .map(|col| match &col.data {
                ColumnData::Float(_) | ColumnData::Int(_) | ColumnData::Time { .. } => {
                    CentroidComponent::Scalar(0.0)
                }
                ColumnData::CategoricalInt { keys, .. } => {
                    CentroidComponent::Dense(vec![0.0; keys.len()])
                }
                ColumnData::CategoricalStr { keys, .. } => {
                    CentroidComponent::Dense(vec![0.0; keys.len()])
                }
                ColumnData::Text(_) => CentroidComponent::Sparse(SparseCentroid::default()),
            })
            .collect();
        Self { components }
    }

    /// Mean of the given rows; all-zero for an empty set.
    pub fn mean_of_rows(dataset: &Dataset, rows: &[usize]) -> Self {
        let mut centroid = Self::zeros(dataset);
        for &row in rows {
            centroid.add_row(dataset, row, 1.0);
        }
        centroid.scale(1.0 / rows.len().max(1) as f64);
        centroid
    }

    /// `self += coef * row`.
    pub fn add_row(&mut self, dataset: &Dataset, row: usize, coef: f64) {
        for (component, col) in self.components.iter_mut().zip(dataset.columns()) {
            match (component, &col.data) {
                (CentroidComponent::Scalar(a), _) => {
                    *a += coef * col.scalar(row).unwrap_or(0.0);
                }
                (CentroidComponent::Dense(a), _) => {
                    if let Some(key) = col.category(row) {
                        a[key] += coef;
                    }
                }
                (CentroidComponent::Sparse(a), ColumnData::Text(rows)) => {
                    for &(key, w) in rows.row(row) {
                        a.add(key, coef * w);
                    }
                }
                (CentroidComponent::Sparse(_), _) => {}
            }
        }
    }

    /// `self += coef * other`.
    pub fn add(&mut self, other: &Centroid, coef: f64) {
        for (a, b) in self.components.iter_mut().zip(&other.components) {
            a.add(b, coef);
        }
    }

    /// `self *= coef`.
    pub fn scale(&mut self, coef: f64) {
        for c in &mut self.components {
            c.scale(coef);
        }
    }

    /// Count-weighted average of two centroids.
    pub fn weighted_mean(a: &Centroid, n_a: usize, b: &Centroid, n_b: usize) -> Centroid {
        let mut merged = a.clone();
        merged.scale(n_a as f64);
        merged.add(b, n_b as f64);
        merged.scale(1.0 / (n_a + n_b).max(1) as f64);
        merged
    }

    /// Components in column order.
    pub fn components(&self) -> &[CentroidComponent] {
        &self.components
    }

    /// Component for column `idx`.
    pub fn component(&self, idx: usize) -> &CentroidComponent {
        &self.components[idx]
    }
}

impl Dataset {
    /// Weighted squared distance between two rows.
    pub fn row_dist2(&self, r1: usize, r2: usize) -> f64 {
        let mut total = 0.0;
        for col in self.columns() {
            if !col.in_distance() {
                continue;
            }
            let delta2 = match &col.data {
                ColumnData::Float(v) => (v[r1] - v[r2]).powi(2),
                ColumnData::Int(v) => (v[r1] as f64 - v[r2] as f64).powi(2),
                ColumnData::CategoricalInt { values, .. }
                | ColumnData::CategoricalStr { values, .. } => {
                    if values[r1] == values[r2] {
                        0.0
                    } else {
                        1.0
                    }
                }
                ColumnData::Text(rows) => sparse_rows_dist2(rows.row(r1), rows.row(r2)),
                ColumnData::Time { .. } => 0.0,
            };
            total += col.weight() * delta2;
        }
        total
    }

    /// Weighted squared distance between a row and a centroid.
    pub fn row_centroid_dist2(&self, row: usize, centroid: &Centroid) -> f64 {
        let mut total = 0.0;
        for (col, component) in self.columns().iter().zip(centroid.components()) {
            if !col.in_distance() {
                continue;
            }
            let delta2 = match (&col.data, component) {
                (_, CentroidComponent::Scalar(c)) => (col.scalar(row).unwrap_or(0.0) - c).powi(2),
                (_, CentroidComponent::Dense(c)) => {
                    let key = col.category(row).unwrap_or(0);
                    let c2: f64 = c.iter().map(|x| x * x).sum();
                    (1.0 + c2 - 2.0 * c.get(key).copied().unwrap_or(0.0)).max(0.0)
                }
                (ColumnData::Text(rows), CentroidComponent::Sparse(c)) => {
                    let entries = rows.row(row);
                    let sum11: f64 = entries.iter().map(|(_, w)| w * w).sum();
                    let sum12: f64 = entries.iter().map(|&(k, w)| w * c.get(k)).sum();
                    (sum11 + c.norm2() - 2.0 * sum12).max(0.0)
                }
                (_, CentroidComponent::Sparse(_)) => 0.0,
            };
            total += col.weight() * delta2;
        }
        total
    }

    /// Weighted squared distance between two centroids.
    pub fn centroid_dist2(&self, c1: &Centroid, c2: &Centroid) -> f64 {
        let mut total = 0.0;
        for ((col, a), b) in self
            .columns()
            .iter()
            .zip(c1.components())
            .zip(c2.components())
        {
            if !col.in_distance() {
                continue;
            }
            let delta2 = match (a, b) {
                (CentroidComponent::Scalar(x), CentroidComponent::Scalar(y)) => (x - y).powi(2),
                (CentroidComponent::Dense(x), CentroidComponent::Dense(y)) => {
                    x.iter().zip(y).map(|(p, q)| (p - q).powi(2)).sum()
                }
                (CentroidComponent::Sparse(x), CentroidComponent::Sparse(y)) => {
                    (x.norm2() + y.norm2() - 2.0 * x.dot(y)).max(0.0)
                }
                _ => 0.0,
            };
            total += col.weight() * delta2;
        }
        total
    }
}

/// Merge-join over two key-sorted sparse rows.
fn sparse_rows_dist2(a: &[(usize, f64)], b: &[(usize, f64)]) -> f64 {
    let (mut i, mut j) = (0, 0);
    let mut total = 0.0;
    while i < a.len() || j < b.len() {
        if j >= b.len() || (i < a.len() && a[i].0 < b[j].0) {
            total += a[i].1 * a[i].1;
            i += 1;
        } else if i >= a.len() || b[j].0 < a[i].0 {
            total += b[j].1 * b[j].1;
            j += 1;
        } else {
            total += (a[i].1 - b[j].1).powi(2);
            i += 1;
            j += 1;
        }
    }
    total
}
