//! Decision trees that describe a state in terms of attribute values.
//!
//! Rows inside the state are positive, all other rows negative. The tree is
//! grown greedily: at each node every usable attribute proposes its best
//! split, and the one with the highest normalized information gain
//! (information gain divided by the entropy of the branch sizes) wins.
//!
//! ```text
//! H(p, n)   = -(p/N) log2(p/N) - (n/N) log2(n/N)
//! gain      = H(parent) - Σ_c (N_c/N) H(c)
//! splitCost = -Σ_c (N_c/N) log2(N_c/N)
//! ```
//!
//! Split kinds:
//! - numeric: `value < threshold` goes left, everything else right;
//! - categorical: one child per key; the attribute is not offered again
//!   further down the same lineage;
//! - wall-clock time: an interval `from..to` on the hour, weekday or month
//!   cycle goes left, its complement right.
//!
//! Text attributes and epoch-number time attributes are never split on.

use tracing::debug;

use crate::dataset::{CalendarUnit, ColumnData, ColumnKind, Dataset};

/// Gains at or below this are treated as no gain at all.
const MIN_GAIN: f64 = 1e-12;

/// Categorical splits whose branch-size entropy is at or below this separate nothing.
const MIN_CATEGORICAL_SPLIT_COST: f64 = 1e-6;

/// Binary Shannon entropy, in bits, of `n_pos` positives and `n_neg` negatives.
///
/// Zero when either count is zero.
pub fn entropy(n_pos: usize, n_neg: usize) -> f64 {
    if n_pos == 0 || n_neg == 0 {
        return 0.0;
    }
    let n = (n_pos + n_neg) as f64;
    let p = n_pos as f64 / n;
    let q = n_neg as f64 / n;
    -(p * p.log2() + q * q.log2())
}

/// Entropy, in bits, of a distribution given by counts; empty counts are skipped.
fn branch_entropy(counts: impl IntoIterator<Item = usize>, total: usize) -> f64 {
    let total = total as f64;
    counts
        .into_iter()
        .filter(|&c| c > 0)
        .map(|c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum()
}

/// When to stop growing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowthLimits {
    /// Levels of splits allowed below the root.
    pub max_depth: usize,
    /// Nodes with less entropy than this are not split.
    pub min_entropy_to_split: f64,
    /// Splits with less normalized gain than this are not taken.
    pub min_norm_inf_gain_to_split: f64,
}

/// How a node divides its rows.
#[derive(Debug, Clone, PartialEq)]
pub enum SplitRule {
    /// Left child gets `value < threshold`.
    Threshold { threshold: f64 },
    /// Child `i` gets key `i`.
    Categorical,
    /// Left child gets values on the cycle from `from` up to but excluding `to`,
    /// wrapping past the end when `from >= to`.
    Cyclic {
        unit: CalendarUnit,
        from: usize,
        to: usize,
    },
}

impl SplitRule {
    /// Whether a cyclic value falls inside the interval.
    pub fn cyclic_contains(from: usize, to: usize, value: usize) -> bool {
        if from < to {
            from <= value && value < to
        } else {
            from <= value || value < to
        }
    }
}

/// Quality of a node's split. A leaf has `entropy_after_split == entropy_before_split`
/// and zeros elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SplitStats {
    pub entropy_before_split: f64,
    pub entropy_after_split: f64,
    pub split_cost: f64,
    pub inf_gain: f64,
    pub norm_inf_gain: f64,
}

/// A split node's attribute, rule and children.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    /// Column index.
    pub attribute: usize,
    pub rule: SplitRule,
    /// One slot per branch; `None` where no row went.
    pub children: Vec<Option<TreeNode>>,
}

/// One node of a [`DecisionTree`].
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    /// Rows reaching this node that belong to the state.
    pub n_pos: usize,
    /// Rows reaching this node that do not.
    pub n_neg: usize,
    pub stats: SplitStats,
    /// `None` for leaves.
    pub split: Option<Split>,
}

impl TreeNode {
    /// True if this node has no split.
    pub fn is_leaf(&self) -> bool {
        self.split.is_none()
    }

    /// Number of nodes in this subtree.
    pub fn n_nodes(&self) -> usize {
        1 + self
            .split
            .iter()
            .flat_map(|s| s.children.iter().flatten())
            .map(TreeNode::n_nodes)
            .sum::<usize>()
    }

    /// Depth of this subtree; a leaf has depth 0.
    pub fn depth(&self) -> usize {
        self.split
            .iter()
            .flat_map(|s| s.children.iter().flatten())
            .map(|c| 1 + c.depth())
            .max()
            .unwrap_or(0)
    }
}

/// A state's decision tree.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionTree {
    pub root: TreeNode,
}

impl DecisionTree {
    /// Grow a tree separating `pos` rows from `neg` rows.
    pub fn build(dataset: &Dataset, pos: &[usize], neg: &[usize], limits: GrowthLimits) -> Self {
        let mut ignored = vec![false; dataset.n_columns()];
        let root = grow(dataset, pos, neg, &mut ignored, limits.max_depth, &limits);
        Self { root }
    }

    /// Display text of each branch of `split`, in child order.
    ///
    /// Numeric branches read `< t` / `>= t`, categorical branches are key
    /// names, cyclic branches are value ranges such as `Mon..Fri` and their
    /// complement (`not 9..16`, or the explicit remainder when the interval
    /// touches an end of the cycle).
    pub fn branch_labels(dataset: &Dataset, split: &Split) -> Vec<String> {
        let col = dataset.column(split.attribute);
        match &split.rule {
            SplitRule::Threshold { threshold } => {
                let t = match col.data {
                    ColumnData::Int(_) => format!("{}", threshold.round() as i64),
                    _ => format!("{threshold}"),
                };
                vec![format!("< {t}"), format!(">= {t}")]
            }
            SplitRule::Categorical => (0..split.children.len()).map(|k| col.key_name(k)).collect(),
            SplitRule::Cyclic { unit, from, to } => {
                let (left, right) = cyclic_labels(*unit, *from, *to);
                vec![left, right]
            }
        }
    }

    /// Display name of the split attribute; hour splits read `Hour(attr)`.
    pub fn split_attribute_name(dataset: &Dataset, split: &Split) -> String {
        let label = &dataset.column(split.attribute).label;
        match split.rule {
            SplitRule::Cyclic {
                unit: CalendarUnit::Hour,
                ..
            } => format!("Hour({label})"),
            _ => label.clone(),
        }
    }
}

fn cyclic_labels(unit: CalendarUnit, from: usize, to: usize) -> (String, String) {
    let period = unit.period();
    let name = |v: usize| unit.value_name(v % period);
    let range = |a: usize, b: usize| {
        if a == b {
            name(a)
        } else {
            format!("{}..{}", name(a), name(b))
        }
    };
    if from >= to {
        let left = range(from, (to + period - 1) % period);
        let right = format!("not {left}");
        return (left, right);
    }
    let left = range(from, to - 1);
    let right = if from == 0 {
        if to >= period {
            String::new()
        } else {
            range(to, period - 1)
        }
    } else if to >= period {
        range(0, from - 1)
    } else {
        format!("not {left}")
    };
    (left, right)
}

/// Best split proposed by one attribute.
struct Candidate {
    attribute: usize,
    rule: SplitRule,
    norm_inf_gain: f64,
}

fn grow(
    dataset: &Dataset,
    pos: &[usize],
    neg: &[usize],
    ignored: &mut [bool],
    max_depth: usize,
    limits: &GrowthLimits,
) -> TreeNode {
    let before = entropy(pos.len(), neg.len());
    let mut node = TreeNode {
        n_pos: pos.len(),
        n_neg: neg.len(),
        stats: SplitStats {
            entropy_before_split: before,
            entropy_after_split: before,
            ..SplitStats::default()
        },
        split: None,
    };
    debug!(
        depth = max_depth,
        n_pos = pos.len(),
        n_neg = neg.len(),
        entropy = before,
        "growing decision tree node"
    );
    if max_depth == 0 || before < limits.min_entropy_to_split {
        return node;
    }
    let Some(best) = best_split(dataset, pos, neg, ignored) else {
        return node;
    };
    debug!(attribute = best.attribute, norm_inf_gain = best.norm_inf_gain, "best split");
    if best.norm_inf_gain < limits.min_norm_inf_gain_to_split {
        return node;
    }

    let n_children = match best.rule {
        SplitRule::Categorical => dataset.column(best.attribute).n_keys(),
        _ => 2,
    };
    let mut child_pos = vec![Vec::new(); n_children];
    let mut child_neg = vec![Vec::new(); n_children];
    for &row in pos {
        child_pos[route(dataset, best.attribute, &best.rule, row)].push(row);
    }
    for &row in neg {
        child_neg[route(dataset, best.attribute, &best.rule, row)].push(row);
    }

    let previously_ignored = ignored[best.attribute];
    if best.rule == SplitRule::Categorical {
        ignored[best.attribute] = true;
    }
    let children = child_pos
        .iter()
        .zip(&child_neg)
        .map(|(p, n)| {
            if p.is_empty() && n.is_empty() {
                None
            } else {
                Some(grow(dataset, p, n, ignored, max_depth - 1, limits))
            }
        })
        .collect();
    ignored[best.attribute] = previously_ignored;

    let total = pos.len() + neg.len();
    let after: f64 = child_pos
        .iter()
        .zip(&child_neg)
        .filter(|(p, n)| !p.is_empty() || !n.is_empty())
        .map(|(p, n)| (p.len() + n.len()) as f64 / total as f64 * entropy(p.len(), n.len()))
        .sum();
    let split_cost = branch_entropy(
        child_pos.iter().zip(&child_neg).map(|(p, n)| p.len() + n.len()),
        total,
    );
    node.stats.entropy_after_split = after;
    node.stats.split_cost = split_cost;
    node.stats.inf_gain = before - after;
    node.stats.norm_inf_gain = node.stats.inf_gain / split_cost;
    node.split = Some(Split {
        attribute: best.attribute,
        rule: best.rule,
        children,
    });
    node
}

fn route(dataset: &Dataset, attribute: usize, rule: &SplitRule, row: usize) -> usize {
    let col = dataset.column(attribute);
    match rule {
        SplitRule::Threshold { threshold } => match col.scalar(row) {
            Some(v) if v < *threshold => 0,
            _ => 1,
        },
        SplitRule::Categorical => col.category(row).unwrap_or(0),
        SplitRule::Cyclic { unit, from, to } => match col.calendar(row) {
            Some(parts) if SplitRule::cyclic_contains(*from, *to, parts.get(*unit)) => 0,
            _ => 1,
        },
    }
}

/// Best split over all usable attributes; ties keep the first found.
fn best_split(dataset: &Dataset, pos: &[usize], neg: &[usize], ignored: &[bool]) -> Option<Candidate> {
    let mut best: Option<Candidate> = None;
    let mut offer = |cand: Candidate| {
        if best
            .as_ref()
            .map_or(true, |b| cand.norm_inf_gain > b.norm_inf_gain)
        {
            best = Some(cand);
        }
    };
    for (attribute, col) in dataset.columns().iter().enumerate() {
        if ignored[attribute] {
            continue;
        }
        match col.kind() {
            ColumnKind::Categorical => {
                let mut counts = vec![(0usize, 0usize); col.n_keys()];
                for &row in pos {
                    if let Some(k) = col.category(row) {
                        counts[k].0 += 1;
                    }
                }
                for &row in neg {
                    if let Some(k) = col.category(row) {
                        counts[k].1 += 1;
                    }
                }
                if let Some(norm_inf_gain) = categorical_gain(&counts) {
                    offer(Candidate {
                        attribute,
                        rule: SplitRule::Categorical,
                        norm_inf_gain,
                    });
                }
            }
            ColumnKind::Numeric => {
                let values_of = |rows: &[usize]| -> Vec<f64> {
                    rows.iter().filter_map(|&r| col.scalar(r)).collect()
                };
                if let Some((threshold, norm_inf_gain)) =
                    numeric_split(&values_of(pos), &values_of(neg))
                {
                    offer(Candidate {
                        attribute,
                        rule: SplitRule::Threshold { threshold },
                        norm_inf_gain,
                    });
                }
            }
            ColumnKind::Time if col.is_wall_clock() => {
                for unit in [CalendarUnit::Hour, CalendarUnit::DayOfWeek, CalendarUnit::Month] {
                    let mut counts = vec![(0usize, 0usize); unit.period()];
                    for &row in pos {
                        if let Some(parts) = col.calendar(row) {
                            counts[parts.get(unit)].0 += 1;
                        }
                    }
                    for &row in neg {
                        if let Some(parts) = col.calendar(row) {
                            counts[parts.get(unit)].1 += 1;
                        }
                    }
                    if let Some((from, to, norm_inf_gain)) = interval_split(&counts) {
                        offer(Candidate {
                            attribute,
                            rule: SplitRule::Cyclic { unit, from, to },
                            norm_inf_gain,
                        });
                    }
                }
            }
            ColumnKind::Time | ColumnKind::Text => {}
        }
    }
    best
}

/// Normalized gain of a multi-way split with per-branch `(pos, neg)` counts.
fn categorical_gain(counts: &[(usize, usize)]) -> Option<f64> {
    let n_pos: usize = counts.iter().map(|c| c.0).sum();
    let n_neg: usize = counts.iter().map(|c| c.1).sum();
    let total = n_pos + n_neg;
    if total == 0 {
        return None;
    }
    let split_cost = branch_entropy(counts.iter().map(|c| c.0 + c.1), total);
    if split_cost <= MIN_CATEGORICAL_SPLIT_COST {
        return None;
    }
    let after: f64 = counts
        .iter()
        .filter(|c| c.0 + c.1 > 0)
        .map(|&(p, n)| (p + n) as f64 / total as f64 * entropy(p, n))
        .sum();
    let gain = entropy(n_pos, n_neg) - after;
    (gain > MIN_GAIN).then(|| gain / split_cost)
}

/// Gain of a binary split into `(in_pos, in_neg)` and `(out_pos, out_neg)`.
fn binary_gain(in_pos: usize, in_neg: usize, out_pos: usize, out_neg: usize) -> Option<f64> {
    let n_in = in_pos + in_neg;
    let n_out = out_pos + out_neg;
    if n_in == 0 || n_out == 0 {
        return None;
    }
    let total = (n_in + n_out) as f64;
    let before = entropy(in_pos + out_pos, in_neg + out_neg);
    let after = n_in as f64 / total * entropy(in_pos, in_neg)
        + n_out as f64 / total * entropy(out_pos, out_neg);
    let gain = before - after;
    (gain > MIN_GAIN).then(|| gain / entropy(n_in, n_out))
}

/// Best `value < threshold` split of positive and negative values.
///
/// Every boundary between two distinct consecutive sorted values is tried;
/// the threshold is the first value to the right of the boundary.
fn numeric_split(pos: &[f64], neg: &[f64]) -> Option<(f64, f64)> {
    let mut items: Vec<(f64, bool)> = pos
        .iter()
        .map(|&v| (v, true))
        .chain(neg.iter().map(|&v| (v, false)))
        .collect();
    items.sort_by(|a, b| a.0.total_cmp(&b.0));

    let (mut left_pos, mut left_neg) = (0, 0);
    let mut best: Option<(f64, f64)> = None;
    for n_left in 1..items.len() {
        if items[n_left - 1].1 {
            left_pos += 1;
        } else {
            left_neg += 1;
        }
        if items[n_left - 1].0 == items[n_left].0 {
            continue;
        }
        let Some(g) = binary_gain(left_pos, left_neg, pos.len() - left_pos, neg.len() - left_neg)
        else {
            continue;
        };
        if best.map_or(true, |(_, b)| g > b) {
            best = Some((items[n_left].0, g));
        }
    }
    best
}

/// Best `from <= v < to` split over a cycle with per-value `(pos, neg)` counts.
fn interval_split(counts: &[(usize, usize)]) -> Option<(usize, usize, f64)> {
    let n_pos: usize = counts.iter().map(|c| c.0).sum();
    let n_neg: usize = counts.iter().map(|c| c.1).sum();
    let mut best: Option<(usize, usize, f64)> = None;
    for from in 0..counts.len() {
        let (mut in_pos, mut in_neg) = (0, 0);
        for to in from + 1..=counts.len() {
            in_pos += counts[to - 1].0;
            in_neg += counts[to - 1].1;
            let Some(g) = binary_gain(in_pos, in_neg, n_pos - in_pos, n_neg - in_neg) else {
                continue;
            };
            if best.map_or(true, |(_, _, b)| g > b) {
                best = Some((from, to, g));
            }
        }
    }
    best
}
