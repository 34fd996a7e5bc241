//! Model-building configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::explain::{entropy, GrowthLimits};
use crate::hierarchy::ValidationReport;

/// Configuration for [`Model::build`](crate::Model::build).
///
/// Deserializes from camelCase JSON; every field except
/// `numInitialStates` has a default.
///
/// ```
/// use multiscale::ModelConfig;
///
/// let config = ModelConfig::new(20).with_histogram_buckets(8);
/// assert!(config.validate().is_healthy());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    /// Number of states produced by the initial clustering.
    pub num_initial_states: usize,
    /// Bucket count of numeric histograms.
    #[serde(default = "default_histogram_buckets")]
    pub num_histogram_buckets: usize,
    #[serde(default = "yes")]
    pub include_histograms: bool,
    #[serde(default = "yes")]
    pub include_decision_trees: bool,
    /// Export the sequence of initial states along the row order.
    #[serde(default = "yes")]
    pub include_state_history: bool,
    /// Share of extreme values ignored when deriving default distance weights.
    #[serde(default = "default_outliers")]
    pub dist_weight_outliers: f64,
    /// Upper bound on the number of scales kept.
    #[serde(default = "default_max_scales")]
    pub max_scales: usize,
    /// Base seed of every random choice.
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub decision_tree: DecisionTreeConfig,
}

/// Decision-tree growth parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DecisionTreeConfig {
    pub max_depth: usize,
    /// Defaults to the entropy of one positive among `3k` rows, `k` the
    /// number of initial states.
    pub min_entropy_to_split: Option<f64>,
    pub min_norm_inf_gain_to_split: f64,
}

impl Default for DecisionTreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            min_entropy_to_split: None,
            min_norm_inf_gain_to_split: 0.0,
        }
    }
}

impl DecisionTreeConfig {
    /// Resolved growth limits for a model with `n_initial_states` initial states.
    pub fn limits(&self, n_initial_states: usize) -> GrowthLimits {
        let default_entropy = entropy(1, (3 * n_initial_states).saturating_sub(1));
        GrowthLimits {
            max_depth: self.max_depth,
            min_entropy_to_split: self.min_entropy_to_split.unwrap_or(default_entropy),
            min_norm_inf_gain_to_split: self.min_norm_inf_gain_to_split,
        }
    }
}

fn default_histogram_buckets() -> usize {
    10
}

fn yes() -> bool {
    true
}

fn default_outliers() -> f64 {
    0.05
}

fn default_max_scales() -> usize {
    10
}

fn default_seed() -> u64 {
    123
}

impl ModelConfig {
    /// Defaults with the given number of initial states.
    pub fn new(num_initial_states: usize) -> Self {
        Self {
            num_initial_states,
            num_histogram_buckets: default_histogram_buckets(),
            include_histograms: true,
            include_decision_trees: true,
            include_state_history: true,
            dist_weight_outliers: default_outliers(),
            max_scales: default_max_scales(),
            seed: default_seed(),
            decision_tree: DecisionTreeConfig::default(),
        }
    }

    /// Parse from JSON and validate.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| Error::InvalidParameter {
                name: "config",
                message: e.to_string(),
            })?;
        let report = config.validate();
        if report.is_healthy() {
            Ok(config)
        } else {
            Err(Error::Validation(report))
        }
    }

    pub fn with_histogram_buckets(mut self, n: usize) -> Self {
        self.num_histogram_buckets = n;
        self
    }

    pub fn with_histograms(mut self, on: bool) -> Self {
        self.include_histograms = on;
        self
    }

    pub fn with_decision_trees(mut self, on: bool) -> Self {
        self.include_decision_trees = on;
        self
    }

    pub fn with_state_history(mut self, on: bool) -> Self {
        self.include_state_history = on;
        self
    }

    pub fn with_dist_weight_outliers(mut self, share: f64) -> Self {
        self.dist_weight_outliers = share;
        self
    }

    pub fn with_max_scales(mut self, n: usize) -> Self {
        self.max_scales = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_decision_tree(mut self, tree: DecisionTreeConfig) -> Self {
        self.decision_tree = tree;
        self
    }

    /// Check every parameter, reporting all problems at once.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::new();
        if self.num_initial_states == 0 {
            report.error("numInitialStates must be at least 1");
        }
        if self.num_histogram_buckets == 0 {
            report.error("numHistogramBuckets must be at least 1");
        }
        if !(0.0..1.0).contains(&self.dist_weight_outliers) {
            report.error(format!(
                "distWeightOutliers must be in [0, 1), got {}",
                self.dist_weight_outliers
            ));
        }
        if self.max_scales == 0 {
            report.error("maxScales must be at least 1");
        }
        if let Some(e) = self.decision_tree.min_entropy_to_split {
            if !e.is_finite() || e < 0.0 {
                report.error(format!(
                    "decisionTree.minEntropyToSplit must be a non-negative number, got {e}"
                ));
            }
        }
        if !self.decision_tree.min_norm_inf_gain_to_split.is_finite() {
            report.error("decisionTree.minNormInfGainToSplit must be a finite number");
        }
        if self.include_decision_trees && self.decision_tree.max_depth == 0 {
            report.warn("decisionTree.maxDepth is 0; every tree will be a single leaf");
        }
        report
    }

    /// Validate against a dataset of `n_rows` rows.
    pub(crate) fn check(&self, n_rows: usize) -> Result<()> {
        let report = self.validate();
        if !report.is_healthy() {
            return Err(Error::Validation(report));
        }
        if n_rows < self.num_initial_states {
            return Err(Error::InvalidClusterCount {
                requested: self.num_initial_states,
                n_items: n_rows,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::Severity;

    #[test]
    fn test_defaults_from_json() {
        let config = ModelConfig::from_json(r#"{ "numInitialStates": 12 }"#).unwrap();
        assert_eq!(config, ModelConfig::new(12));
        assert_eq!(config.num_histogram_buckets, 10);
        assert_eq!(config.decision_tree.max_depth, 3);
        assert_eq!(config.seed, 123);
    }

    #[test]
    fn test_nested_tree_config() {
        let config = ModelConfig::from_json(
            r#"{ "numInitialStates": 4, "includeHistograms": false,
                 "decisionTree": { "maxDepth": 5, "minEntropyToSplit": 0.2 } }"#,
        )
        .unwrap();
        assert!(!config.include_histograms);
        assert_eq!(config.decision_tree.max_depth, 5);
        let limits = config.decision_tree.limits(4);
        assert_eq!(limits.min_entropy_to_split, 0.2);
        assert_eq!(limits.min_norm_inf_gain_to_split, 0.0);
    }

    #[test]
    fn test_missing_required_field() {
        assert!(matches!(
            ModelConfig::from_json("{}"),
            Err(Error::InvalidParameter { name: "config", .. })
        ));
    }

    #[test]
    fn test_all_violations_reported() {
        let config = ModelConfig::new(0)
            .with_histogram_buckets(0)
            .with_dist_weight_outliers(1.5);
        let report = config.validate();
        assert_eq!(report.issues_at_level(Severity::Error).len(), 3);
    }

    #[test]
    fn test_default_min_entropy() {
        let limits = DecisionTreeConfig::default().limits(2);
        // One positive among six rows.
        assert!((limits.min_entropy_to_split - entropy(1, 5)).abs() < 1e-12);
    }

    #[test]
    fn test_not_enough_rows() {
        assert_eq!(
            ModelConfig::new(10).check(4),
            Err(Error::InvalidClusterCount {
                requested: 10,
                n_items: 4
            })
        );
        assert!(ModelConfig::new(4).check(4).is_ok());
    }
}
