//! Serializable view of a built model.
//!
//! [`Model::export`] flattens the state arena into one nested document per
//! kept scale, in the shape consumed by the visualization client: every
//! state carries its layout, label, centroid, histograms, children at the
//! next finer kept scale and decision tree.

use serde::Serialize;
use serde_json::{json, Value as Json};
use tracing::info;

use crate::dataset::{Column, ColumnData, Dataset};
use crate::error::Result;
use crate::explain::{Bins, DecisionTree, Histogram, StateLabel, TreeNode};
use crate::hierarchy::{Model, State};
use crate::kernel::CentroidComponent;

/// The whole model.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelExport {
    /// Kept scales, finest first.
    pub scales: Vec<ScaleExport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_histograms: Option<Vec<HistogramExport>>,
    /// State `stateHistoryInitialStates[i]` holds from `stateHistoryTimes[i]`
    /// up to `stateHistoryTimes[i + 1]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_history_times: Option<Vec<Json>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_history_initial_states: Option<Vec<usize>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleExport {
    pub n_states: usize,
    pub states: Vec<StateExport>,
    pub are_these_initial_states: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateExport {
    /// Position within the scale.
    pub state_no: usize,
    pub initial_states: Vec<usize>,
    pub n_members: usize,
    pub x_center: f64,
    pub y_center: f64,
    pub radius: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_label: Option<LabelExport>,
    pub centroid: Vec<CentroidExport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub histograms: Option<Vec<HistogramExport>>,
    /// Positions of the contained states at the next finer kept scale.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_states: Option<Vec<usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_tree: Option<TreeNodeExport>,
    pub stationary_probability: f64,
    /// This state's row of the scale's transition matrix.
    pub next_state_prob_distr: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelExport {
    pub label: String,
    pub n_covered_in_state: usize,
    pub n_covered_outside_state: usize,
    pub n_not_covered_in_state: usize,
    pub n_not_covered_outside_state: usize,
    pub log_odds_ratio: Option<f64>,
}

impl From<&StateLabel> for LabelExport {
    fn from(label: &StateLabel) -> Self {
        Self {
            label: label.label.clone(),
            n_covered_in_state: label.n_covered_in_state,
            n_covered_outside_state: label.n_covered_outside_state,
            n_not_covered_in_state: label.n_not_covered_in_state,
            n_not_covered_outside_state: label.n_not_covered_outside_state,
            log_odds_ratio: label.log_odds_ratio,
        }
    }
}

/// One attribute of a centroid.
///
/// Numeric attributes set `value`; categorical and text attributes set
/// `values` (key or token with its mean weight); wall-clock times set
/// `value` to the formatted time and `fltValue` to epoch seconds.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CentroidExport {
    pub attr_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<KeyValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flt_value: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyValue {
    pub key: Json,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramExport {
    pub attr_name: String,
    pub freq_sum: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub freqs: Vec<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bounds: Vec<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub day_of_week_freqs: Vec<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub month_freqs: Vec<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hour_freqs: Vec<usize>,
    /// Key of every bucket of a categorical histogram.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<Json>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNodeExport {
    pub n_pos: usize,
    pub n_neg: usize,
    /// Branch text as seen from the parent; absent on the root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_attr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entropy_after_split: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_inf_gain: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_norm_inf_gain: Option<f64>,
    pub entropy_before_split: f64,
    /// Non-empty branches only, in branch order.
    pub children: Vec<TreeNodeExport>,
}

impl Model {
    /// Build the serializable view of this model.
    pub fn export(&self) -> ModelExport {
        let dataset = self.dataset();
        let config = self.config();
        let n_initial = self.n_initial_states();

        let scales = self
            .scales()
            .enumerate()
            .map(|(scale_no, partition)| ScaleExport {
                n_states: partition.n_states(),
                states: partition
                    .states
                    .iter()
                    .enumerate()
                    .map(|(pos, &id)| {
                        let state = self.state(id);
                        let mut out = export_state(dataset, pos, state, config.include_histograms);
                        out.child_states = self.child_states(scale_no, pos);
                        out.stationary_probability = partition.stationary[pos];
                        out.next_state_prob_distr = partition.transitions.row(pos).to_vec();
                        out
                    })
                    .collect(),
                are_these_initial_states: partition.n_states() == n_initial,
            })
            .collect();

        let total_histograms = config
            .include_histograms
            .then(|| export_histograms(dataset, self.total_histograms()));

        let (state_history_times, state_history_initial_states) = if config.include_state_history {
            let (times, states) = state_history(dataset, self.row_to_initial());
            info!(
                n_rows = dataset.n_rows(),
                n_times = times.len(),
                n_states = states.len(),
                "state history exported"
            );
            (Some(times), Some(states))
        } else {
            (None, None)
        };

        ModelExport {
            scales,
            total_histograms,
            state_history_times,
            state_history_initial_states,
        }
    }

    /// The exported model as a JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.export())?)
    }
}

fn export_state(dataset: &Dataset, pos: usize, state: &State, with_histograms: bool) -> StateExport {
    StateExport {
        state_no: pos,
        initial_states: state.initial_states.clone(),
        n_members: state.n_members(),
        x_center: state.x,
        y_center: state.y,
        radius: state.radius,
        suggested_label: state.label.as_ref().map(LabelExport::from),
        centroid: dataset
            .columns()
            .iter()
            .zip(state.centroid.components())
            .map(|(col, component)| export_component(col, component))
            .collect(),
        histograms: with_histograms.then(|| export_histograms(dataset, &state.histograms)),
        child_states: None,
        decision_tree: state
            .decision_tree
            .as_ref()
            .map(|tree| export_tree_node(dataset, &tree.root, None)),
        stationary_probability: state.stationary_probability,
        next_state_prob_distr: Vec::new(),
    }
}

fn export_component(col: &Column, component: &CentroidComponent) -> CentroidExport {
    let mut out = CentroidExport {
        attr_name: col.name.clone(),
        value: None,
        values: None,
        flt_value: None,
    };
    match component {
        CentroidComponent::Scalar(v) if col.is_wall_clock() => {
            out.value = Some(Json::String(col.format_time(*v)));
            out.flt_value = Some(*v);
        }
        CentroidComponent::Scalar(v) => out.value = Some(json!(v)),
        CentroidComponent::Dense(weights) => {
            out.values = Some(
                weights
                    .iter()
                    .enumerate()
                    .map(|(k, &w)| KeyValue {
                        key: key_json(col, k),
                        value: w,
                    })
                    .collect(),
            );
        }
        CentroidComponent::Sparse(weights) => {
            out.values = Some(
                weights
                    .iter()
                    .map(|(k, w)| KeyValue {
                        key: key_json(col, k),
                        value: w,
                    })
                    .collect(),
            );
        }
    }
    out
}

/// Integer keys stay numbers, everything else is a string.
fn key_json(col: &Column, key: usize) -> Json {
    match &col.data {
        ColumnData::CategoricalInt { keys, .. } => json!(keys.key(key)),
        _ => Json::String(col.key_name(key)),
    }
}

fn export_histograms(dataset: &Dataset, histograms: &[Histogram]) -> Vec<HistogramExport> {
    dataset
        .columns()
        .iter()
        .zip(histograms)
        .map(|(col, hist)| export_histogram(col, hist))
        .collect()
}

fn export_histogram(col: &Column, hist: &Histogram) -> HistogramExport {
    let mut out = HistogramExport {
        attr_name: col.name.clone(),
        freq_sum: hist.freq_sum,
        freqs: Vec::new(),
        bounds: Vec::new(),
        day_of_week_freqs: Vec::new(),
        month_freqs: Vec::new(),
        hour_freqs: Vec::new(),
        keys: None,
    };
    match &hist.bins {
        Bins::Numeric { bounds, freqs } => {
            out.bounds = bounds.clone();
            out.freqs = freqs.clone();
        }
        Bins::Categorical { freqs } => {
            out.freqs = freqs.clone();
            out.keys = Some((0..freqs.len()).map(|k| key_json(col, k)).collect());
        }
        Bins::Calendar {
            hour,
            day_of_week,
            month,
        } => {
            out.hour_freqs = hour.clone();
            out.day_of_week_freqs = day_of_week.clone();
            out.month_freqs = month.clone();
        }
        Bins::None => {}
    }
    out
}

fn export_tree_node(dataset: &Dataset, node: &TreeNode, split_label: Option<String>) -> TreeNodeExport {
    let mut out = TreeNodeExport {
        n_pos: node.n_pos,
        n_neg: node.n_neg,
        split_label,
        split_attr: None,
        entropy_after_split: None,
        split_cost: None,
        split_inf_gain: None,
        split_norm_inf_gain: None,
        entropy_before_split: node.stats.entropy_before_split,
        children: Vec::new(),
    };
    if let Some(split) = &node.split {
        out.split_attr = Some(DecisionTree::split_attribute_name(dataset, split));
        out.entropy_after_split = Some(node.stats.entropy_after_split);
        out.split_cost = Some(node.stats.split_cost);
        out.split_inf_gain = Some(node.stats.inf_gain);
        out.split_norm_inf_gain = Some(node.stats.norm_inf_gain);
        let labels = DecisionTree::branch_labels(dataset, split);
        out.children = split
            .children
            .iter()
            .zip(labels)
            .filter_map(|(child, label)| {
                child
                    .as_ref()
                    .map(|c| export_tree_node(dataset, c, Some(label)))
            })
            .collect();
    }
    out
}

/// Times at which the initial state changes along the row order, and the
/// state entered at each. One extra time, taken from the last row, closes
/// the final interval.
fn state_history(dataset: &Dataset, row_to_initial: &[usize]) -> (Vec<Json>, Vec<usize>) {
    let time_col = dataset.first_time_column().map(|c| dataset.column(c));
    let time_at = |row: usize| match time_col {
        Some(col) => {
            let v = col.scalar(row).unwrap_or(0.0);
            if col.is_wall_clock() {
                Json::String(col.format_time(v))
            } else {
                json!(v)
            }
        }
        None => json!(row),
    };

    let mut times = Vec::new();
    let mut states = Vec::new();
    let mut prev = None;
    for (row, &state) in row_to_initial.iter().enumerate() {
        if prev == Some(state) {
            continue;
        }
        prev = Some(state);
        times.push(time_at(row));
        states.push(state);
    }
    let n_rows = row_to_initial.len();
    if n_rows > 0 {
        times.push(match time_col {
            Some(_) => time_at(n_rows - 1),
            None => json!(n_rows),
        });
    }
    (times, states)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{AttributeKind, AttributeSpec, DatasetBuilder, TimeKind};

    fn timed_dataset(kind: TimeKind, times: &[&str]) -> Dataset {
        let mut builder = DatasetBuilder::new(vec![
            AttributeSpec::new("x", AttributeKind::NumericFloat),
            AttributeSpec::new("t", AttributeKind::Time(kind)),
        ])
        .unwrap();
        for (i, t) in times.iter().enumerate() {
            let time: crate::dataset::Value = match kind {
                TimeKind::Time => (*t).into(),
                _ => t.parse::<f64>().unwrap().into(),
            };
            builder.push_row(&[(i as f64).into(), time]);
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_state_history_without_time_column() {
        let mut builder =
            DatasetBuilder::new(vec![AttributeSpec::new("x", AttributeKind::NumericFloat)]).unwrap();
        for i in 0..5 {
            builder.push_row(&[(i as f64).into()]);
        }
        let ds = builder.build().unwrap();
        let (times, states) = state_history(&ds, &[0, 0, 1, 1, 0]);
        assert_eq!(states, vec![0, 1, 0]);
        assert_eq!(times, vec![json!(0), json!(2), json!(4), json!(5)]);
    }

    #[test]
    fn test_state_history_formats_wall_clock() {
        let ds = timed_dataset(
            TimeKind::Time,
            &["2024-05-01 10:00:00", "2024-05-01 11:00:00", "2024-05-01 12:00:00"],
        );
        let (times, states) = state_history(&ds, &[2, 2, 0]);
        assert_eq!(states, vec![2, 0]);
        assert_eq!(
            times,
            vec![
                json!("2024-05-01 10:00:00"),
                json!("2024-05-01 12:00:00"),
                json!("2024-05-01 12:00:00"),
            ]
        );
    }

    #[test]
    fn test_state_history_numeric_times() {
        let ds = timed_dataset(TimeKind::Float, &["0.5", "1.5", "2.5"]);
        let (times, _) = state_history(&ds, &[0, 1, 1]);
        assert_eq!(times, vec![json!(0.5), json!(1.5), json!(2.5)]);
    }

    #[test]
    fn test_categorical_histogram_keys() {
        let mut builder =
            DatasetBuilder::new(vec![AttributeSpec::new("k", AttributeKind::CategoricalInt)]).unwrap();
        for k in [7i64, 3, 7] {
            builder.push_row(&[k.into()]);
        }
        let ds = builder.build().unwrap();
        let hist = Histogram::of_column(ds.column(0), 10);
        let out = export_histogram(ds.column(0), &hist);
        assert_eq!(out.keys, Some(vec![json!(7), json!(3)]));
        assert_eq!(out.freqs, vec![2, 1]);
        let text = serde_json::to_value(&out).unwrap();
        assert!(text.get("bounds").is_none());
        assert!(text.get("hourFreqs").is_none());
    }

    #[test]
    fn test_wall_clock_centroid() {
        let ds = timed_dataset(TimeKind::Time, &["2024-05-01 10:00:00"]);
        let col = ds.column(1);
        let secs = col.scalar(0).unwrap();
        let out = export_component(col, &CentroidComponent::Scalar(secs));
        assert_eq!(out.value, Some(json!("2024-05-01 10:00:00")));
        assert_eq!(out.flt_value, Some(secs));
    }
}
