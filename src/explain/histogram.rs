//! Per-attribute frequency histograms.
//!
//! Numeric attributes get equal-width buckets spanning the whole column's
//! range (so a state's histogram and the population's line up bucket for
//! bucket), categorical attributes one bucket per key, and wall-clock time
//! attributes three cyclic histograms. Text and epoch-number time attributes
//! have no histogram.

use crate::dataset::{CalendarUnit, Column, ColumnData, Dataset, TimeKind};

/// Bucket counts of one attribute over a set of rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// Number of rows counted.
    pub freq_sum: usize,
    /// Buckets, shaped by the attribute kind.
    pub bins: Bins,
}

/// The bucket layout of a [`Histogram`].
#[derive(Debug, Clone, PartialEq)]
pub enum Bins {
    /// `bounds` has one more entry than `freqs`; bucket `i` spans `bounds[i]..bounds[i + 1]`.
    Numeric { bounds: Vec<f64>, freqs: Vec<usize> },
    /// One bucket per key, indexed like the column's key dictionary.
    Categorical { freqs: Vec<usize> },
    /// Hour of day, day of week and month counts.
    Calendar {
        hour: Vec<usize>,
        day_of_week: Vec<usize>,
        month: Vec<usize>,
    },
    /// Attribute kinds without a histogram.
    None,
}

impl Histogram {
    /// Histogram of `column` restricted to `rows`.
    ///
    /// `n_buckets` only affects numeric attributes.
    pub fn of_rows(column: &Column, n_buckets: usize, rows: &[usize]) -> Self {
        Self::build(column, n_buckets, rows.iter().copied())
    }

    /// Histogram of every row of `column`.
    pub fn of_column(column: &Column, n_buckets: usize) -> Self {
        Self::build(column, n_buckets, 0..column.len())
    }

    fn build(column: &Column, n_buckets: usize, rows: impl Iterator<Item = usize>) -> Self {
        let mut freq_sum = 0;
        let bins = match &column.data {
            ColumnData::Float(values) => {
                let (lo, hi) = min_max(values.iter().copied());
                let mut freqs = vec![0; n_buckets];
                for row in rows {
                    freqs[float_bucket(values[row], lo, hi, n_buckets)] += 1;
                    freq_sum += 1;
                }
                Bins::Numeric {
                    bounds: equal_width_bounds(lo, hi, n_buckets),
                    freqs,
                }
            }
            ColumnData::Int(values) => {
                let lo = values.iter().copied().min().unwrap_or(0);
                let hi = values.iter().copied().max().unwrap_or(0);
                let mut freqs = vec![0; n_buckets];
                for row in rows {
                    freqs[int_bucket(values[row], lo, hi, n_buckets)] += 1;
                    freq_sum += 1;
                }
                Bins::Numeric {
                    bounds: equal_width_bounds(lo as f64, hi as f64, n_buckets),
                    freqs,
                }
            }
            ColumnData::CategoricalInt { .. } | ColumnData::CategoricalStr { .. } => {
                let mut freqs = vec![0; column.n_keys()];
                for row in rows {
                    if let Some(key) = column.category(row) {
                        freqs[key] += 1;
                        freq_sum += 1;
                    }
                }
                Bins::Categorical { freqs }
            }
            ColumnData::Time {
                kind: TimeKind::Time,
                ..
            } => {
                let mut hour = vec![0; CalendarUnit::Hour.period()];
                let mut day_of_week = vec![0; CalendarUnit::DayOfWeek.period()];
                let mut month = vec![0; CalendarUnit::Month.period()];
                for row in rows {
                    if let Some(parts) = column.calendar(row) {
                        hour[parts.hour] += 1;
                        day_of_week[parts.day_of_week] += 1;
                        month[parts.month] += 1;
                        freq_sum += 1;
                    }
                }
                Bins::Calendar {
                    hour,
                    day_of_week,
                    month,
                }
            }
            ColumnData::Time { .. } | ColumnData::Text(_) => Bins::None,
        };
        Self { freq_sum, bins }
    }

    /// Bucket counts of a numeric or categorical histogram; empty otherwise.
    pub fn freqs(&self) -> &[usize] {
        match &self.bins {
            Bins::Numeric { freqs, .. } | Bins::Categorical { freqs } => freqs,
            _ => &[],
        }
    }

    /// Bucket boundaries of a numeric histogram; empty otherwise.
    pub fn bounds(&self) -> &[f64] {
        match &self.bins {
            Bins::Numeric { bounds, .. } => bounds,
            _ => &[],
        }
    }

    /// Cyclic counts of a calendar histogram; empty otherwise.
    pub fn calendar_freqs(&self, unit: CalendarUnit) -> &[usize] {
        match (&self.bins, unit) {
            (Bins::Calendar { hour, .. }, CalendarUnit::Hour) => hour,
            (Bins::Calendar { day_of_week, .. }, CalendarUnit::DayOfWeek) => day_of_week,
            (Bins::Calendar { month, .. }, CalendarUnit::Month) => month,
            _ => &[],
        }
    }

    /// Number of primary buckets (cyclic buckets are not counted).
    pub fn n_buckets(&self) -> usize {
        self.freqs().len()
    }
}

/// One histogram per column of `dataset`, over `rows`.
pub fn column_histograms(dataset: &Dataset, rows: &[usize], n_buckets: usize) -> Vec<Histogram> {
    dataset
        .columns()
        .iter()
        .map(|col| Histogram::of_rows(col, n_buckets, rows))
        .collect()
}

/// One histogram per column of `dataset`, over all rows.
pub fn population_histograms(dataset: &Dataset, n_buckets: usize) -> Vec<Histogram> {
    dataset
        .columns()
        .iter()
        .map(|col| Histogram::of_column(col, n_buckets))
        .collect()
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let mut out: Option<(f64, f64)> = None;
    for v in values {
        out = Some(match out {
            None => (v, v),
            Some((lo, hi)) => (lo.min(v), hi.max(v)),
        });
    }
    out.unwrap_or((0.0, 0.0))
}

fn equal_width_bounds(lo: f64, hi: f64, n_buckets: usize) -> Vec<f64> {
    let denom = n_buckets.max(1) as f64;
    (0..=n_buckets)
        .map(|i| lo + (hi - lo) * i as f64 / denom)
        .collect()
}

fn float_bucket(v: f64, lo: f64, hi: f64, n_buckets: usize) -> usize {
    if v <= lo {
        0
    } else if v >= hi {
        n_buckets - 1
    } else {
        (((v - lo) * n_buckets as f64 / (hi - lo)).floor() as usize).min(n_buckets - 1)
    }
}

fn int_bucket(v: i64, lo: i64, hi: i64, n_buckets: usize) -> usize {
    if v <= lo {
        0
    } else if v >= hi {
        n_buckets - 1
    } else {
        let offset = i128::from(v) - i128::from(lo);
        let span = i128::from(hi) - i128::from(lo);
        ((offset * n_buckets as i128 / span) as usize).min(n_buckets - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{AttributeKind, AttributeSpec, DatasetBuilder, Value};

    fn dataset() -> Dataset {
        let mut builder = DatasetBuilder::new(vec![
            AttributeSpec::new("x", AttributeKind::NumericFloat),
            AttributeSpec::new("n", AttributeKind::NumericInt),
            AttributeSpec::new("mode", AttributeKind::CategoricalString),
            AttributeSpec::new("t", AttributeKind::Time(TimeKind::Time)),
            AttributeSpec::new("words", AttributeKind::Text),
        ])
        .unwrap();
        let rows = [
            (0.0, 0, "a", "2024-01-07 09:00:00"),
            (2.5, 3, "b", "2024-01-08 10:30:00"),
            (5.0, 5, "a", "2024-02-07 09:15:00"),
            (7.5, 7, "c", "2024-03-09 23:59:59"),
            (10.0, 10, "a", "2024-03-10 00:00:00"),
        ];
        for (x, n, mode, t) in rows {
            builder.push_row(&[x.into(), Value::Int(n), mode.into(), t.into(), "w".into()]);
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_numeric_buckets_span_whole_column() {
        let ds = dataset();
        let h = Histogram::of_column(ds.column(0), 4);
        assert_eq!(h.bounds(), &[0.0, 2.5, 5.0, 7.5, 10.0]);
        // Maximum clamps into the last bucket.
        assert_eq!(h.freqs(), &[1, 1, 1, 2]);
        assert_eq!(h.freq_sum, 5);

        // A subset still uses the full column range.
        let sub = Histogram::of_rows(ds.column(0), 4, &[3, 4]);
        assert_eq!(sub.bounds(), h.bounds());
        assert_eq!(sub.freqs(), &[0, 0, 0, 2]);
        assert_eq!(sub.freq_sum, 2);
    }

    #[test]
    fn test_int_buckets() {
        let ds = dataset();
        let h = Histogram::of_column(ds.column(1), 5);
        // Width 2: 0 | 3 | 5 | 7 | 10
        assert_eq!(h.freqs(), &[1, 1, 1, 1, 1]);
        assert_eq!(h.bounds().len(), 6);
    }

    #[test]
    fn test_categorical_one_bucket_per_key() {
        let ds = dataset();
        let h = Histogram::of_column(ds.column(2), 99);
        assert_eq!(h.freqs(), &[3, 1, 1]);
        assert!(h.bounds().is_empty());
        assert_eq!(h.freq_sum, 5);
    }

    #[test]
    fn test_calendar_histograms() {
        let ds = dataset();
        let h = Histogram::of_column(ds.column(3), 10);
        assert!(h.freqs().is_empty());
        let hours = h.calendar_freqs(CalendarUnit::Hour);
        assert_eq!(hours.len(), 24);
        assert_eq!(hours[9], 2);
        assert_eq!(hours[0], 1);
        // 2024-01-07 and 2024-03-10 are Sundays.
        assert_eq!(h.calendar_freqs(CalendarUnit::DayOfWeek)[0], 2);
        assert_eq!(h.calendar_freqs(CalendarUnit::Month), &[2, 1, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(h.freq_sum, 5);
    }

    #[test]
    fn test_text_has_no_histogram() {
        let ds = dataset();
        let h = Histogram::of_column(ds.column(4), 10);
        assert_eq!(h.bins, Bins::None);
        assert_eq!(h.freq_sum, 0);
    }

    #[test]
    fn test_constant_column_goes_to_first_bucket() {
        let mut builder =
            DatasetBuilder::new(vec![AttributeSpec::new("x", AttributeKind::NumericFloat)]).unwrap();
        for _ in 0..3 {
            builder.push_row(&[1.0.into()]);
        }
        let ds = builder.build().unwrap();
        let h = Histogram::of_column(ds.column(0), 3);
        assert_eq!(h.freqs(), &[3, 0, 0]);
    }
}
