//! Explanations of states: histograms, suggested labels and decision trees.
//!
//! None of these affect the model's structure; they describe each state in
//! terms of the original attributes so a person can tell states apart.

mod histogram;
mod label;
mod tree;

pub use histogram::{column_histograms, population_histograms, Bins, Histogram};
pub use label::{label_population, suggest_label, StateLabel, LABEL_BUCKETS};
pub use tree::{entropy, DecisionTree, GrowthLimits, Split, SplitRule, SplitStats, TreeNode};
