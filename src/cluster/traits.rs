//! Clustering traits.

/// A finite set of points that Lloyd-style clustering can run over.
///
/// Points are addressed by index `0..n_points()`. Centroids live in the
/// same space but have their own representation, so the dataset kernel
/// (mixed-type rows) and plain vectors (eigenvalue signatures) share one
/// clustering routine.
pub trait PointSpace: Sync {
    /// Aggregate representation of a set of points.
    type Centroid: Clone + Send + Sync;

    /// Number of points.
    fn n_points(&self) -> usize;

    /// Squared distance between two points.
    fn point_dist2(&self, a: usize, b: usize) -> f64;

    /// Squared distance between a point and a centroid.
    fn centroid_dist2(&self, point: usize, centroid: &Self::Centroid) -> f64;

    /// Zero centroid.
    fn empty_centroid(&self) -> Self::Centroid;

    /// `centroid += point`.
    fn accumulate(&self, centroid: &mut Self::Centroid, point: usize);

    /// `centroid *= coef`.
    fn scale(&self, centroid: &mut Self::Centroid, coef: f64);
}

/// Euclidean space over a list of equal-length vectors.
#[derive(Debug, Clone, Copy)]
pub struct VectorSpace<'a> {
    points: &'a [Vec<f64>],
    dim: usize,
}

impl<'a> VectorSpace<'a> {
    /// Wrap a list of points of dimension `dim`.
    pub fn new(points: &'a [Vec<f64>], dim: usize) -> Self {
        debug_assert!(points.iter().all(|p| p.len() == dim));
        Self { points, dim }
    }
}

fn euclidean2(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

impl PointSpace for VectorSpace<'_> {
    type Centroid = Vec<f64>;

    fn n_points(&self) -> usize {
        self.points.len()
    }

    fn point_dist2(&self, a: usize, b: usize) -> f64 {
        euclidean2(&self.points[a], &self.points[b])
    }

    fn centroid_dist2(&self, point: usize, centroid: &Vec<f64>) -> f64 {
        euclidean2(&self.points[point], centroid)
    }

    fn empty_centroid(&self) -> Vec<f64> {
        vec![0.0; self.dim]
    }

    fn accumulate(&self, centroid: &mut Vec<f64>, point: usize) {
        for (c, x) in centroid.iter_mut().zip(&self.points[point]) {
            *c += x;
        }
    }

    fn scale(&self, centroid: &mut Vec<f64>, coef: f64) {
        centroid.iter_mut().for_each(|c| *c *= coef);
    }
}
