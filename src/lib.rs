//! # multiscale
//!
//! Multi-resolution state models for tabular, time-ordered data.
//!
//! Rows are clustered into initial states, the initial states are merged
//! pairwise into coarser and coarser partitions, and a handful of scales
//! with distinct transition dynamics is kept. Every kept state gets a
//! position on the plane, a suggested label, per-attribute histograms and
//! a decision tree describing it.
//!
//! ```no_run
//! use multiscale::{AttributeKind, AttributeSpec, DatasetBuilder, Model, ModelConfig};
//!
//! let mut builder = DatasetBuilder::new(vec![
//!     AttributeSpec::new("time", AttributeKind::Time(multiscale::TimeKind::Time)),
//!     AttributeSpec::new("load", AttributeKind::NumericFloat),
//! ])?;
//! builder.push_row(&["2024-01-01 00:00:00".into(), 0.3.into()]);
//! // ...
//! let model = Model::build(builder.build()?, &ModelConfig::new(10))?;
//! println!("{}", model.to_json()?);
//! # Ok::<(), multiscale::Error>(())
//! ```
//!
//! The crate logs through `tracing` and never installs a subscriber.

pub mod cluster;
pub mod config;
pub mod dataset;
/// Error types used across `multiscale`.
pub mod error;
pub mod explain;
pub mod export;
pub mod hierarchy;
pub mod kernel;
pub mod layout;
pub mod spectral;

#[cfg(test)]
mod pipeline_tests;

pub use config::{DecisionTreeConfig, ModelConfig};
pub use dataset::{
    AttributeKind, AttributeSpec, Column, ColumnKind, Dataset, DatasetBuilder, TimeKind, Value,
};
pub use error::{Error, Result};
pub use explain::{DecisionTree, Histogram, StateLabel};
pub use export::ModelExport;
pub use hierarchy::{
    Dendrogram, Model, Partition, Severity, State, StateId, ValidationIssue, ValidationReport,
};
pub use kernel::Centroid;
