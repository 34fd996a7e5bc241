//! Column-oriented storage for mixed-type, time-ordered datasets.
//!
//! A [`Dataset`] is a list of [`Column`]s of equal length; rows are implicit
//! indices `0..n_rows`. Every column carries one typed payload
//! ([`ColumnData`]) and a distance weight. Columns are filled once by the
//! [`DatasetBuilder`] and never mutated while a model is built, apart from
//! resolving default distance weights.

mod builder;
mod calendar;
mod keys;

pub use builder::{AttributeKind, AttributeSpec, DatasetBuilder, Value};
pub use calendar::{
    format_epoch_seconds, CalendarParts, CalendarUnit, DAYS_PER_WEEK, HOURS_PER_DAY,
    MONTHS_PER_YEAR,
};
pub use keys::KeyDictionary;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Logical subtype of a time attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimeKind {
    /// Wall-clock time, stored as seconds since the Unix epoch (UTC).
    Time,
    /// An integer sequence number.
    Int,
    /// A floating-point sequence value.
    Float,
}

/// Per-row sparse vectors of a text attribute.
///
/// Row `r` owns `entries[spans[r].0 .. spans[r].0 + spans[r].1]`, sorted by
/// vocabulary index.
#[derive(Debug, Clone, Default)]
pub struct SparseRows {
    vocabulary: KeyDictionary<String>,
    spans: Vec<(usize, usize)>,
    entries: Vec<(usize, f64)>,
}

impl SparseRows {
    /// Append a row given as (token, weight) pairs. Duplicate tokens are summed.
    pub fn push_row<I, S>(&mut self, tokens: I)
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut row: Vec<(usize, f64)> = tokens
            .into_iter()
            .map(|(token, weight)| (self.vocabulary.intern(token.into()), weight))
            .collect();
        row.sort_by_key(|&(key, _)| key);
        let mut merged: Vec<(usize, f64)> = Vec::with_capacity(row.len());
        for (key, weight) in row {
            match merged.last_mut() {
                Some(last) if last.0 == key => last.1 += weight,
                _ => merged.push((key, weight)),
            }
        }
        self.spans.push((self.entries.len(), merged.len()));
        self.entries.extend(merged);
    }

    /// Sorted (key, weight) entries of one row.
    pub fn row(&self, row: usize) -> &[(usize, f64)] {
        let (first, len) = self.spans[row];
        &self.entries[first..first + len]
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// True if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Token dictionary shared by all rows.
    pub fn vocabulary(&self) -> &KeyDictionary<String> {
        &self.vocabulary
    }
}

/// Typed payload of one column.
#[derive(Debug, Clone)]
pub enum ColumnData {
    /// Numeric attribute with floating-point values.
    Float(Vec<f64>),
    /// Numeric attribute with integer values.
    Int(Vec<i64>),
    /// Categorical attribute with integer keys; `values` holds key indices.
    CategoricalInt {
        keys: KeyDictionary<i64>,
        values: Vec<usize>,
    },
    /// Categorical attribute with string keys; `values` holds key indices.
    CategoricalStr {
        keys: KeyDictionary<String>,
        values: Vec<usize>,
    },
    /// Bag-of-tokens attribute.
    Text(SparseRows),
    /// Time attribute; `values` are seconds since the epoch for [`TimeKind::Time`].
    Time { kind: TimeKind, values: Vec<f64> },
}

/// Coarse attribute family, used wherever only the family matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ColumnKind {
    Numeric,
    Categorical,
    Text,
    Time,
}

/// One attribute's values for every row.
#[derive(Debug, Clone)]
pub struct Column {
    /// Internal, unique name.
    pub name: String,
    /// Name used in labels and exported output.
    pub label: String,
    /// Weight in the distance function; `None` until defaults are resolved.
    pub dist_weight: Option<f64>,
    /// strftime-style pattern for wall-clock time attributes.
    pub format: Option<String>,
    /// Typed values.
    pub data: ColumnData,
}

impl Column {
    /// Attribute family.
    pub fn kind(&self) -> ColumnKind {
        match &self.data {
            ColumnData::Float(_) | ColumnData::Int(_) => ColumnKind::Numeric,
            ColumnData::CategoricalInt { .. } | ColumnData::CategoricalStr { .. } => {
                ColumnKind::Categorical
            }
            ColumnData::Text(_) => ColumnKind::Text,
            ColumnData::Time { .. } => ColumnKind::Time,
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        match &self.data {
            ColumnData::Float(v) => v.len(),
            ColumnData::Int(v) => v.len(),
            ColumnData::CategoricalInt { values, .. } | ColumnData::CategoricalStr { values, .. } => {
                values.len()
            }
            ColumnData::Text(rows) => rows.len(),
            ColumnData::Time { values, .. } => values.len(),
        }
    }

    /// True if the column holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Distance weight, 1 if not yet resolved.
    pub fn weight(&self) -> f64 {
        self.dist_weight.unwrap_or(1.0)
    }

    /// True if this column contributes to distances.
    ///
    /// Time columns never do, whatever their weight.
    pub fn in_distance(&self) -> bool {
        self.kind() != ColumnKind::Time && self.weight() > 0.0
    }

    /// Scalar value of a numeric or time column.
    pub fn scalar(&self, row: usize) -> Option<f64> {
        match &self.data {
            ColumnData::Float(v) => Some(v[row]),
            ColumnData::Int(v) => Some(v[row] as f64),
            ColumnData::Time { values, .. } => Some(values[row]),
            _ => None,
        }
    }

    /// Key index of a categorical column.
    pub fn category(&self, row: usize) -> Option<usize> {
        match &self.data {
            ColumnData::CategoricalInt { values, .. } | ColumnData::CategoricalStr { values, .. } => {
                Some(values[row])
            }
            _ => None,
        }
    }

    /// Number of distinct keys (categorical) or tokens (text); 0 otherwise.
    pub fn n_keys(&self) -> usize {
        match &self.data {
            ColumnData::CategoricalInt { keys, .. } => keys.len(),
            ColumnData::CategoricalStr { keys, .. } => keys.len(),
            ColumnData::Text(rows) => rows.vocabulary().len(),
            _ => 0,
        }
    }

    /// Display form of key `idx` of a categorical or text column.
    pub fn key_name(&self, idx: usize) -> String {
        match &self.data {
            ColumnData::CategoricalInt { keys, .. } => keys.key(idx).to_string(),
            ColumnData::CategoricalStr { keys, .. } => keys.key(idx).clone(),
            ColumnData::Text(rows) => rows.vocabulary().key(idx).clone(),
            _ => idx.to_string(),
        }
    }

    /// Sparse entries of a text column.
    pub fn text_row(&self, row: usize) -> Option<&[(usize, f64)]> {
        match &self.data {
            ColumnData::Text(rows) => Some(rows.row(row)),
            _ => None,
        }
    }

    /// True for time columns holding wall-clock timestamps.
    pub fn is_wall_clock(&self) -> bool {
        matches!(
            self.data,
            ColumnData::Time {
                kind: TimeKind::Time,
                ..
            }
        )
    }

    /// Hour, weekday and month of a wall-clock time column.
    pub fn calendar(&self, row: usize) -> Option<CalendarParts> {
        match &self.data {
            ColumnData::Time {
                kind: TimeKind::Time,
                values,
            } => Some(CalendarParts::from_epoch_seconds(values[row])),
            _ => None,
        }
    }

    /// Render a time value the way it was given: formatted wall-clock time or a number.
    pub fn format_time(&self, value: f64) -> String {
        match &self.data {
            ColumnData::Time {
                kind: TimeKind::Time,
                ..
            } => format_epoch_seconds(value, self.format.as_deref().unwrap_or(DEFAULT_TIME_FORMAT)),
            ColumnData::Time {
                kind: TimeKind::Int,
                ..
            } => format!("{}", value.round() as i64),
            _ => format!("{}", value),
        }
    }
}

/// Pattern used to parse and print wall-clock times when none is configured.
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A fully populated, typed dataset.
#[derive(Debug, Clone)]
pub struct Dataset {
    n_rows: usize,
    columns: Vec<Column>,
}

impl Dataset {
    /// Assemble a dataset from equal-length columns.
    pub(crate) fn from_columns(n_rows: usize, columns: Vec<Column>) -> Self {
        debug_assert!(columns.iter().all(|c| c.len() == n_rows));
        Self { n_rows, columns }
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of columns.
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// All columns, in attribute order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column `idx`.
    pub fn column(&self, idx: usize) -> &Column {
        &self.columns[idx]
    }

    /// Index of the column named `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Index of the first time column, if any.
    pub fn first_time_column(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.kind() == ColumnKind::Time)
    }

    /// Fill in distance weights that were left unspecified.
    ///
    /// Numeric columns get `1 / variance`, computed after dropping `outliers`
    /// (a share in `[0, 1)`) of the extreme values, half at each end.
    /// Near-constant numeric columns and all other kinds get weight 1.
    pub fn resolve_default_weights(&mut self, outliers: f64) {
        for col in &mut self.columns {
            if col.dist_weight.is_some() {
                continue;
            }
            let weight = match &col.data {
                ColumnData::Float(v) => trimmed_inverse_variance(v.clone(), outliers),
                ColumnData::Int(v) => {
                    trimmed_inverse_variance(v.iter().map(|&x| x as f64).collect(), outliers)
                }
                _ => 1.0,
            };
            debug!(attribute = %col.name, weight, "default distance weight");
            col.dist_weight = Some(weight);
        }
    }
}

fn trimmed_inverse_variance(mut values: Vec<f64>, outliers: f64) -> f64 {
    let n = values.len();
    let n_ignore = ((n as f64) * outliers).floor() as usize;
    let lo = n_ignore / 2;
    let hi = n - (n_ignore - lo);
    if hi <= lo {
        return 1.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let kept = &values[lo..hi];
    let mean = kept.iter().sum::<f64>() / kept.len() as f64;
    let variance = kept.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / kept.len() as f64;
    if variance < 1e-6 {
        1.0
    } else {
        1.0 / variance
    }
}
