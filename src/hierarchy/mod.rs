//! States, scales and the model that ties them together.
//!
//! # Structure
//!
//! A model is a chain of partitions of the same rows, each one state
//! coarser than the last:
//!
//! ```text
//! scale 2:   [  A ∪ B ∪ C  ]   [   D   ]
//!                  │               │
//! scale 1:   [ A ∪ B ]  [ C ]   [   D   ]
//!               │         │         │
//! scale 0:   [A]  [B]   [ C ]   [   D   ]     initial states
//! ```
//!
//! States are stored once, in an arena, and partitions refer to them by
//! [`StateId`]. `C` and `D` above are one arena entry each even though they
//! appear at several scales.
//!
//! # Module Overview
//!
//! - [`State`] and [`Partition`]: the arena entries and one scale over them
//! - [`Dendrogram`]: the merge steps that produced the chain
//! - [`Model`]: the build pipeline and accessors over its result
//! - [`check_partition_chain`]: structural invariants, reported as a
//!   [`ValidationReport`]

mod dendrogram;
mod model;
mod state;
mod validate;

pub use dendrogram::{Dendrogram, Merge};
pub use model::Model;
pub use state::{Partition, State, StateId};
pub use validate::{check_partition_chain, Severity, ValidationIssue, ValidationReport};
