//! Clustering of rows into initial states, and of states into coarser ones.
//!
//! ## Algorithms
//!
//! ### K-means
//!
//! Lloyd iterations over any [`PointSpace`]:
//!
//! ```text
//! repeat:
//!   assign every point to its nearest centroid
//!   recompute every centroid as the mean of its members
//! until few points move or quality stops improving
//! ```
//!
//! Seeds are the best of several random draws, scored by how far apart
//! the drawn points are. Runs are reproducible for a fixed seed.
//!
//! Used twice: once over dataset rows ([`DatasetSpace`]) to produce the
//! initial states, and once over eigenvalue signatures ([`VectorSpace`])
//! to pick representative scales.
//!
//! ### Average linkage
//!
//! [`StateAggregator`] merges the two closest states until two remain.
//! The distance between two states is the mean distance between the
//! centroids of their initial states:
//!
//! ```text
//! d(A, B) = (1 / |A||B|) Σ_{a∈A} Σ_{b∈B} ‖c_a − c_b‖
//! ```
//!
//! Every merge produces a new [`Partition`](crate::hierarchy::Partition);
//! together they form the aggregation chain.

mod hierarchical;
mod kmeans;
mod traits;

pub use hierarchical::{Aggregation, StateAggregator};
pub use kmeans::{DatasetSpace, Kmeans, KmeansFit};
pub use traits::{PointSpace, VectorSpace};
