//! Row-by-row ingestion into typed columns.
//!
//! Every conversion problem is recorded with its row and attribute rather
//! than aborting on the first one. With `ignore_conversion_errors` set, the
//! offending rows are dropped and the problems become warnings; otherwise
//! [`DatasetBuilder::build`] fails with the full list.

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use tracing::{info, warn};

use super::{
    Column, ColumnData, Dataset, KeyDictionary, SparseRows, TimeKind, DEFAULT_TIME_FORMAT,
};
use crate::error::{Error, Result};
use crate::hierarchy::{Severity, ValidationIssue, ValidationReport};

const MAX_ERRORS_TO_REPORT: usize = 100;

/// Declared type of an input attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttributeKind {
    NumericInt,
    NumericFloat,
    CategoricalInt,
    CategoricalString,
    Text,
    Time(TimeKind),
}

/// Declaration of one input attribute.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeSpec {
    /// Internal name; also the key looked up in JSON rows.
    pub name: String,
    /// Name shown in labels; defaults to `name`.
    #[serde(default)]
    pub label: Option<String>,
    pub kind: AttributeKind,
    /// Distance weight; resolved from the data when absent.
    #[serde(default)]
    pub dist_weight: Option<f64>,
    /// strftime-style pattern for time values given as strings.
    #[serde(default)]
    pub format: Option<String>,
}

impl AttributeSpec {
    /// Declare an attribute.
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            label: None,
            kind,
            dist_weight: None,
            format: None,
        }
    }

    /// Set the display label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set an explicit distance weight.
    pub fn with_dist_weight(mut self, weight: f64) -> Self {
        self.dist_weight = Some(weight);
        self
    }

    /// Set the time format pattern.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

/// One input cell before conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
    /// (token, weight) pairs for text attributes.
    Tokens(Vec<(String, f64)>),
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(v: &serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match v {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Int(i64::from(*b)),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map_or(Value::Null, Value::Float),
            },
            Json::String(s) => Value::Str(s.clone()),
            Json::Array(items) => Value::Tokens(
                items
                    .iter()
                    .filter_map(|item| match item {
                        Json::String(s) => Some((s.clone(), 1.0)),
                        Json::Array(pair) if pair.len() == 2 => {
                            Some((pair[0].as_str()?.to_string(), pair[1].as_f64()?))
                        }
                        _ => None,
                    })
                    .collect(),
            ),
            Json::Object(map) => Value::Tokens(
                map.iter()
                    .filter_map(|(k, w)| Some((k.clone(), w.as_f64()?)))
                    .collect(),
            ),
        }
    }
}

enum Cell {
    Float(f64),
    Int(i64),
    Category(CategoryKey),
    Tokens(Vec<(String, f64)>),
    Time(f64),
}

enum CategoryKey {
    Int(i64),
    Str(String),
}

/// Accumulates rows into typed columns.
#[derive(Debug)]
pub struct DatasetBuilder {
    specs: Vec<AttributeSpec>,
    data: Vec<ColumnData>,
    n_rows: usize,
    n_rows_seen: usize,
    n_rows_ignored: usize,
    n_errors_suppressed: usize,
    ignore_conversion_errors: bool,
    report: ValidationReport,
}

impl DatasetBuilder {
    /// Start a dataset with the given attributes.
    ///
    /// Fails with every problem in the declarations: duplicate or empty names,
    /// negative weights, and unusable time formats.
    pub fn new(specs: Vec<AttributeSpec>) -> Result<Self> {
        if specs.is_empty() {
            return Err(Error::EmptyInput);
        }
        let mut report = ValidationReport::new();
        let mut names = HashSet::new();
        for spec in &specs {
            if spec.name.is_empty() {
                report.error("attribute with an empty name");
            } else if !names.insert(spec.name.as_str()) {
                report.add(
                    ValidationIssue::new(Severity::Error, "duplicate attribute name")
                        .with_attribute(&spec.name),
                );
            }
            if let Some(w) = spec.dist_weight {
                if !(w >= 0.0 && w.is_finite()) {
                    report.add(
                        ValidationIssue::new(
                            Severity::Error,
                            format!("distance weight must be a non-negative number, got {w}"),
                        )
                        .with_attribute(&spec.name),
                    );
                }
            }
            if spec.format.is_some() && !matches!(spec.kind, AttributeKind::Time(_)) {
                report.add(
                    ValidationIssue::new(Severity::Warning, "format is ignored for non-time attributes")
                        .with_attribute(&spec.name),
                );
            }
        }
        if !report.is_healthy() {
            return Err(Error::Validation(report));
        }

        let data = specs
            .iter()
            .map(|spec| match spec.kind {
                AttributeKind::NumericInt => ColumnData::Int(Vec::new()),
                AttributeKind::NumericFloat => ColumnData::Float(Vec::new()),
                AttributeKind::CategoricalInt => ColumnData::CategoricalInt {
                    keys: KeyDictionary::new(),
                    values: Vec::new(),
                },
                AttributeKind::CategoricalString => ColumnData::CategoricalStr {
                    keys: KeyDictionary::new(),
                    values: Vec::new(),
                },
                AttributeKind::Text => ColumnData::Text(SparseRows::default()),
                AttributeKind::Time(kind) => ColumnData::Time {
                    kind,
                    values: Vec::new(),
                },
            })
            .collect();

        Ok(Self {
            specs,
            data,
            n_rows: 0,
            n_rows_seen: 0,
            n_rows_ignored: 0,
            n_errors_suppressed: 0,
            ignore_conversion_errors: false,
            report,
        })
    }

    /// Drop unconvertible rows (reported as warnings) instead of failing the build.
    pub fn with_ignore_conversion_errors(mut self, ignore: bool) -> Self {
        self.ignore_conversion_errors = ignore;
        self
    }

    /// Rows accepted so far.
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Problems recorded so far.
    pub fn report(&self) -> &ValidationReport {
        &self.report
    }

    /// Append one row, values in attribute order.
    ///
    /// Returns whether the row was accepted. A rejected row leaves every
    /// column untouched.
    pub fn push_row(&mut self, values: &[Value]) -> bool {
        let row = self.n_rows_seen;
        self.n_rows_seen += 1;

        if values.len() != self.specs.len() {
            let issue = ValidationIssue::new(
                self.conversion_severity(),
                format!("expected {} values, got {}", self.specs.len(), values.len()),
            )
            .with_row(row);
            self.record(issue);
            self.n_rows_ignored += 1;
            return false;
        }

        let converted: std::result::Result<Vec<Cell>, ValidationIssue> = self
            .specs
            .iter()
            .zip(values)
            .map(|(spec, value)| {
                convert(spec, value).map_err(|message| {
                    ValidationIssue::new(self.conversion_severity(), message)
                        .with_row(row)
                        .with_attribute(&spec.name)
                })
            })
            .collect();
        let cells = match converted {
            Ok(cells) => cells,
            Err(issue) => {
                self.record(issue);
                self.n_rows_ignored += 1;
                return false;
            }
        };

        for (data, cell) in self.data.iter_mut().zip(cells) {
            store(data, cell);
        }
        self.n_rows += 1;
        true
    }

    /// Append one row given as a JSON object keyed by attribute name.
    pub fn push_json_row(&mut self, row: &serde_json::Value) -> bool {
        let Some(obj) = row.as_object() else {
            let issue = ValidationIssue::new(self.conversion_severity(), "row must be a JSON object")
                .with_row(self.n_rows_seen);
            self.record(issue);
            self.n_rows_seen += 1;
            self.n_rows_ignored += 1;
            return false;
        };
        let values: Vec<Value> = self
            .specs
            .iter()
            .map(|spec| obj.get(&spec.name).map_or(Value::Null, Value::from))
            .collect();
        self.push_row(&values)
    }

    /// Append every element of a JSON array of row objects.
    pub fn push_json_rows(&mut self, rows: &serde_json::Value) -> Result<usize> {
        let items = rows.as_array().ok_or_else(|| Error::InvalidParameter {
            name: "data",
            message: "expected an array of row objects".to_string(),
        })?;
        Ok(items.iter().filter(|row| self.push_json_row(row)).count())
    }

    /// Finish ingestion.
    pub fn build(mut self) -> Result<Dataset> {
        let severity = self.conversion_severity();
        if self.n_errors_suppressed > 0 {
            self.report.add(ValidationIssue::new(
                severity,
                format!(
                    "{} more conversion errors were encountered but not reported here",
                    self.n_errors_suppressed
                ),
            ));
        }
        if self.n_rows_ignored > 0 {
            warn!(
                ignored = self.n_rows_ignored,
                "input rows ignored due to conversion errors or missing values"
            );
            self.report.add(ValidationIssue::new(
                severity,
                format!(
                    "a total of {} input rows were ignored due to conversion errors or missing values",
                    self.n_rows_ignored
                ),
            ));
        }
        if !self.report.is_healthy() {
            return Err(Error::Validation(self.report));
        }
        if self.n_rows == 0 {
            return Err(Error::EmptyInput);
        }

        info!(
            rows = self.n_rows,
            columns = self.specs.len(),
            "dataset ingested"
        );
        let columns = self
            .specs
            .into_iter()
            .zip(self.data)
            .map(|(spec, data)| Column {
                label: spec.label.unwrap_or_else(|| spec.name.clone()),
                name: spec.name,
                dist_weight: spec.dist_weight,
                format: spec.format,
                data,
            })
            .collect();
        Ok(Dataset::from_columns(self.n_rows, columns))
    }

    fn conversion_severity(&self) -> Severity {
        if self.ignore_conversion_errors {
            Severity::Warning
        } else {
            Severity::Error
        }
    }

    fn record(&mut self, issue: ValidationIssue) {
        if self.report.issues.len() >= MAX_ERRORS_TO_REPORT {
            self.n_errors_suppressed += 1;
        } else {
            self.report.add(issue);
        }
    }
}

fn convert(spec: &AttributeSpec, value: &Value) -> std::result::Result<Cell, String> {
    if *value == Value::Null {
        return Err("value is missing".to_string());
    }
    match spec.kind {
        AttributeKind::NumericFloat => match value {
            Value::Float(x) => Ok(Cell::Float(*x)),
            Value::Int(i) => Ok(Cell::Float(*i as f64)),
            Value::Str(s) => s
                .trim()
                .parse::<f64>()
                .map(Cell::Float)
                .map_err(|_| format!("\"{s}\" is not a number")),
            _ => Err("value is not a number".to_string()),
        },
        AttributeKind::NumericInt => as_integer(value).map(Cell::Int),
        AttributeKind::CategoricalInt => {
            as_integer(value).map(|k| Cell::Category(CategoryKey::Int(k)))
        }
        AttributeKind::CategoricalString => match value {
            Value::Str(s) => Ok(Cell::Category(CategoryKey::Str(s.clone()))),
            _ => Err("value is not a string".to_string()),
        },
        AttributeKind::Text => match value {
            Value::Tokens(tokens) => Ok(Cell::Tokens(tokens.clone())),
            Value::Str(s) => Ok(Cell::Tokens(
                s.split_whitespace().map(|t| (t.to_string(), 1.0)).collect(),
            )),
            _ => Err("value is not text".to_string()),
        },
        AttributeKind::Time(kind) => {
            let secs = match value {
                Value::Str(s) => {
                    let format = spec.format.as_deref().unwrap_or(DEFAULT_TIME_FORMAT);
                    parse_time(s, format).ok_or_else(|| {
                        format!("cannot parse \"{s}\" as a datetime value with the format \"{format}\"")
                    })?
                }
                Value::Int(i) => *i as f64,
                Value::Float(x) => *x,
                _ => return Err("value is not a time".to_string()),
            };
            Ok(Cell::Time(match kind {
                TimeKind::Int => secs.floor(),
                TimeKind::Time | TimeKind::Float => secs,
            }))
        }
    }
}

fn as_integer(value: &Value) -> std::result::Result<i64, String> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::Float(x) if x.fract() == 0.0 && x.is_finite() => Ok(*x as i64),
        Value::Float(x) => Err(format!("{x} is not an integer")),
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("\"{s}\" is not an integer")),
        _ => Err("value is not a number".to_string()),
    }
}

fn parse_time(s: &str, format: &str) -> Option<f64> {
    let dt = NaiveDateTime::parse_from_str(s.trim(), format)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s.trim(), format)
                .ok()?
                .and_hms_opt(0, 0, 0)
        })?
        .and_utc();
    Some(dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_nanos()) / 1e9)
}

fn store(data: &mut ColumnData, cell: Cell) {
    match (data, cell) {
        (ColumnData::Float(v), Cell::Float(x)) => v.push(x),
        (ColumnData::Int(v), Cell::Int(x)) => v.push(x),
        (ColumnData::CategoricalInt { keys, values }, Cell::Category(CategoryKey::Int(k))) => {
            values.push(keys.intern(k))
        }
        (ColumnData::CategoricalStr { keys, values }, Cell::Category(CategoryKey::Str(k))) => {
            values.push(keys.intern(k))
        }
        (ColumnData::Text(rows), Cell::Tokens(tokens)) => rows.push_row(tokens),
        (ColumnData::Time { values, .. }, Cell::Time(t)) => values.push(t),
        _ => debug_assert!(false, "cell kind does not match column kind"),
    }
}
