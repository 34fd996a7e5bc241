//! Hierarchical (agglomerative) aggregation of initial states.
//!
//! Bottom-up: start from the k initial states and repeatedly merge the two
//! closest aggregate states until two remain. Every step yields a new
//! [`Partition`], so the result is a chain of k − 1 scales with k, k − 1,
//! …, 2 states.
//!
//! # Linkage
//!
//! Distances between initial states are the (non-squared) kernel distances
//! between their centroids. Aggregate states are compared by **average
//! linkage** over their initial states:
//!
//! ```text
//! D(A, B) = Σ_{i∈A} Σ_{j∈B} d(i, j) / (|A| · |B|)
//! ```
//!
//! where `|A|` counts initial states, not rows. The closest pair is found by
//! a linear scan over `(hi, lo)` with `lo < hi`, first minimum wins.
//!
//! # Sharing
//!
//! Only the merged state is new; every other state of the next partition is
//! the same arena entry as in the previous one.

use ndarray::Array2;
use tracing::debug;

use crate::dataset::Dataset;
use crate::hierarchy::{Dendrogram, Partition, State, StateId};

/// Result of aggregating the initial partition.
#[derive(Debug, Clone)]
pub struct Aggregation {
    /// Partitions from the initial one (k states) down to 2 states.
    pub chain: Vec<Partition>,
    /// Merge steps, one per partition after the first.
    pub history: Dendrogram,
}

/// Average-linkage aggregator over initial states.
#[derive(Debug, Clone)]
pub struct StateAggregator {
    initial_dist: Array2<f64>,
}

impl StateAggregator {
    /// Precompute distances between the initial states of `initial`.
    pub fn new(dataset: &Dataset, states: &[State], initial: &Partition) -> Self {
        let k = initial.n_states();
        let mut initial_dist = Array2::zeros((k, k));
        for i in 0..k {
            for j in 0..i {
                let d2 = dataset.centroid_dist2(
                    &states[initial.states[i]].centroid,
                    &states[initial.states[j]].centroid,
                );
                let d = if d2 <= 0.0 { 0.0 } else { d2.sqrt() };
                initial_dist[[i, j]] = d;
                initial_dist[[j, i]] = d;
            }
        }
        Self { initial_dist }
    }

    /// Distance between initial states `i` and `j`.
    pub fn initial_distance(&self, i: usize, j: usize) -> f64 {
        self.initial_dist[[i, j]]
    }

    /// Average-linkage distances between every pair of states of `partition`.
    pub fn linkage_matrix(&self, states: &[State], partition: &Partition) -> Array2<f64> {
        let m = partition.n_states();
        let k = partition.initial_to_state.len();
        let mut sums = Array2::<f64>::zeros((m, m));
        for s1 in 0..k {
            for s2 in 0..k {
                let a1 = partition.initial_to_state[s1];
                let a2 = partition.initial_to_state[s2];
                sums[[a1, a2]] += self.initial_dist[[s1, s2]];
            }
        }
        for a1 in 0..m {
            let n1 = states[partition.states[a1]].initial_states.len();
            for a2 in 0..m {
                let n2 = states[partition.states[a2]].initial_states.len();
                sums[[a1, a2]] /= (n1 * n2).max(1) as f64;
            }
        }
        sums
    }

    /// Merge the closest pair of `partition`, pushing the merged state into `states`.
    ///
    /// Returns the next partition and the `(absorbed, into, distance)` of the merge.
    pub fn merge_step(
        &self,
        states: &mut Vec<State>,
        partition: &Partition,
    ) -> (Partition, usize, usize, f64) {
        let m = partition.n_states();
        debug_assert!(m >= 2);
        let linkage = self.linkage_matrix(states, partition);

        let (mut hi, mut lo) = (1, 0);
        for a1 in 0..m {
            for a2 in 0..a1 {
                if linkage[[a1, a2]] < linkage[[hi, lo]] {
                    hi = a1;
                    lo = a2;
                }
            }
        }
        let distance = linkage[[hi, lo]];

        let initial_to_state = partition
            .initial_to_state
            .iter()
            .map(|&a| match a {
                a if a == hi => lo,
                a if a > hi => a - 1,
                a => a,
            })
            .collect();

        let merged = State::merged(&states[partition.states[hi]], &states[partition.states[lo]]);
        let merged_id: StateId = states.len();
        states.push(merged);

        let next_states = partition
            .states
            .iter()
            .enumerate()
            .filter(|&(pos, _)| pos != hi)
            .map(|(pos, &id)| if pos == lo { merged_id } else { id })
            .collect();

        (Partition::new(next_states, initial_to_state), hi, lo, distance)
    }

    /// Build the whole chain down to two states.
    pub fn build_chain(&self, states: &mut Vec<State>, initial: Partition) -> Aggregation {
        let mut history = Dendrogram::new(initial.n_states());
        let mut chain = vec![initial];
        while let Some(last) = chain.last().filter(|p| p.n_states() > 2) {
            let (next, absorbed, into, distance) = self.merge_step(states, last);
            let size = states[next.states[into]].initial_states.len();
            debug!(
                n_states = next.n_states(),
                absorbed,
                into,
                distance,
                "merged states"
            );
            history.add_merge(absorbed, into, distance, size);
            chain.push(next);
        }
        Aggregation { chain, history }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{AttributeKind, AttributeSpec, DatasetBuilder};
    use crate::kernel::Centroid;

    fn singleton_states(values: &[f64]) -> (Dataset, Vec<State>, Partition) {
        let mut builder =
            DatasetBuilder::new(vec![AttributeSpec::new("x", AttributeKind::NumericFloat)
                .with_dist_weight(1.0)])
            .unwrap();
        for &v in values {
            builder.push_row(&[v.into()]);
        }
        let ds = builder.build().unwrap();
        let states: Vec<State> = (0..values.len())
            .map(|i| State::new(vec![i], vec![i], Centroid::mean_of_rows(&ds, &[i])))
            .collect();
        let partition = Partition::new((0..values.len()).collect(), (0..values.len()).collect());
        (ds, states, partition)
    }

    #[test]
    fn test_first_merge_joins_closest_pair() {
        let (ds, mut states, initial) = singleton_states(&[0.0, 10.0, 1.0]);
        let agg = StateAggregator::new(&ds, &states, &initial);
        let result = agg.build_chain(&mut states, initial);

        assert_eq!(result.chain.len(), 2);
        let coarse = &result.chain[1];
        assert_eq!(coarse.n_states(), 2);
        let larger = coarse
            .states
            .iter()
            .map(|&id| &states[id])
            .max_by_key(|s| s.n_members())
            .unwrap();
        assert_eq!(larger.initial_states, vec![0, 2]);
        assert_eq!(larger.members, vec![0, 2]);
        // Merged into the lower slot; the untouched state is shared.
        assert_eq!(coarse.initial_to_state, vec![0, 1, 0]);
        assert_eq!(coarse.states[1], 1);
        assert!((result.history.distances()[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_merged_centroid_is_weighted() {
        let (ds, states, _) = singleton_states(&[0.0, 3.0]);
        let a = State::merged(&states[0], &states[1]);
        let b = State::merged(&a, &states[0]);
        let expected = Centroid::mean_of_rows(&ds, &[0, 1]);
        assert!(ds.centroid_dist2(&a.centroid, &expected) < 1e-12);
        // Members deduplicate when the same row appears on both sides.
        assert_eq!(b.members, vec![0, 1]);
    }

    #[test]
    fn test_chain_is_monotone() {
        let (ds, mut states, initial) = singleton_states(&[0.0, 1.0, 5.0, 5.5, 20.0, 21.0, 40.0]);
        let agg = StateAggregator::new(&ds, &states, &initial);
        let result = agg.build_chain(&mut states, initial);

        assert_eq!(result.chain.len(), 6);
        for (i, p) in result.chain.iter().enumerate() {
            assert_eq!(p.n_states(), 7 - i);
            assert_eq!(result.history.cut_to_k(p.n_states()), p.initial_to_state);
        }
    }

    #[test]
    fn test_average_linkage_matches_kodama_merge_heights() {
        let values = [0.0, 1.0, 5.0, 5.5, 20.0, 23.0];
        let (ds, mut states, initial) = singleton_states(&values);
        let agg = StateAggregator::new(&ds, &states, &initial);
        let result = agg.build_chain(&mut states, initial);

        let n = values.len();
        let mut condensed = Vec::new();
        for i in 0..n - 1 {
            for j in i + 1..n {
                condensed.push((values[i] - values[j]).abs());
            }
        }
        let oracle = kodama::linkage(&mut condensed, n, kodama::Method::Average);
        let expected: Vec<f64> = oracle.steps().iter().map(|s| s.dissimilarity).collect();

        // kodama merges all the way to one cluster; the chain stops at two.
        for (got, want) in result.history.distances().iter().zip(&expected) {
            assert!((got - want).abs() < 1e-9, "{got} vs {want}");
        }
        assert_eq!(result.history.n_merges(), n - 2);
    }
}
