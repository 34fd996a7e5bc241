//! Merge history of the state aggregation.
//!
//! Each merge turns a partition with `m` states into one with `m − 1`
//! states. Positions are indices into the finer partition's state list:
//! the state at `absorbed` is folded into the state at `into`
//! (`into < absorbed`), the merged state takes slot `into`, and every slot
//! after `absorbed` moves down by one.

/// Full merge history, from the initial partition down to two states.
#[derive(Debug, Clone)]
pub struct Dendrogram {
    merges: Vec<Merge>,
    /// Number of initial states.
    n_items: usize,
}

/// A single merge step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    /// Slot of the state folded away.
    pub absorbed: usize,
    /// Slot of the state it was folded into; the merged state keeps this slot.
    pub into: usize,
    /// Average-linkage distance between the two states.
    pub distance: f64,
    /// Number of initial states in the merged state.
    pub size: usize,
}

impl Dendrogram {
    /// Create an empty history over `n_items` initial states.
    pub fn new(n_items: usize) -> Self {
        Self {
            merges: Vec::with_capacity(n_items.saturating_sub(2)),
            n_items,
        }
    }

    /// Record a merge operation.
    pub fn add_merge(&mut self, absorbed: usize, into: usize, distance: f64, size: usize) {
        debug_assert!(into < absorbed);
        self.merges.push(Merge {
            absorbed,
            into,
            distance,
            size,
        });
    }

    /// Slot of every initial state once the partition is down to `k` states.
    ///
    /// `k` is clamped to the range the history covers.
    pub fn cut_to_k(&self, k: usize) -> Vec<usize> {
        let mut labels: Vec<usize> = (0..self.n_items).collect();
        let n_merges = self.n_items.saturating_sub(k).min(self.merges.len());
        for merge in &self.merges[..n_merges] {
            for label in labels.iter_mut() {
                if *label == merge.absorbed {
                    *label = merge.into;
                } else if *label > merge.absorbed {
                    *label -= 1;
                }
            }
        }
        labels
    }

    /// Number of initial states.
    pub fn n_items(&self) -> usize {
        self.n_items
    }

    /// Number of merges recorded.
    pub fn n_merges(&self) -> usize {
        self.merges.len()
    }

    /// Iterate over merges.
    pub fn merges(&self) -> impl Iterator<Item = &Merge> {
        self.merges.iter()
    }

    /// Get the merge distances (for visualization).
    pub fn distances(&self) -> Vec<f64> {
        self.merges.iter().map(|m| m.distance).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dendrogram_creation() {
        let dendro = Dendrogram::new(5);
        assert_eq!(dendro.n_items(), 5);
        assert_eq!(dendro.n_merges(), 0);
        assert_eq!(dendro.cut_to_k(5), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_cut_replays_renumbering() {
        let mut dendro = Dendrogram::new(4);
        // Fold slot 2 into slot 0: [0, 1, 0, 2].
        dendro.add_merge(2, 0, 0.5, 2);
        // Fold slot 2 (initial state 3) into slot 1: [0, 1, 0, 1].
        dendro.add_merge(2, 1, 0.7, 2);

        assert_eq!(dendro.n_merges(), 2);
        assert_eq!(dendro.cut_to_k(3), vec![0, 1, 0, 2]);
        assert_eq!(dendro.cut_to_k(2), vec![0, 1, 0, 1]);
        assert_eq!(dendro.distances(), vec![0.5, 0.7]);
    }
}
