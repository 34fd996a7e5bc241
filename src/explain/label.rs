//! Suggested state labels.
//!
//! Every bucket of every attribute is a candidate description of a state
//! ("Temperature HIGH", "Mode = idle", "HOUR(Time) = 14"). A candidate is
//! scored by the smoothed log-odds ratio of a row being covered by the bucket
//! inside versus outside the state, and the best-scoring one wins.

use crate::dataset::{CalendarUnit, ColumnKind, Dataset};

use super::histogram::{population_histograms, Histogram};

/// Bucket count used for label histograms.
pub const LABEL_BUCKETS: usize = 5;

const LEVEL_NAMES: [&str; LABEL_BUCKETS] = ["LOWEST", "LOW", "MEDIUM", "HIGH", "HIGHEST"];

const SMOOTHING: f64 = 0.1;

/// A human-readable description of a state and the evidence for it.
#[derive(Debug, Clone, PartialEq)]
pub struct StateLabel {
    pub label: String,
    /// State members covered by the chosen bucket.
    pub n_covered_in_state: usize,
    /// Non-members covered by the chosen bucket.
    pub n_covered_outside_state: usize,
    pub n_not_covered_in_state: usize,
    pub n_not_covered_outside_state: usize,
    /// `None` while no candidate has been accepted.
    pub log_odds_ratio: Option<f64>,
}

impl StateLabel {
    /// A label with the given fallback text and no evidence.
    pub fn fallback(text: impl Into<String>) -> Self {
        Self {
            label: text.into(),
            n_covered_in_state: 0,
            n_covered_outside_state: 0,
            n_not_covered_in_state: 0,
            n_not_covered_outside_state: 0,
            log_odds_ratio: None,
        }
    }

    /// Take the candidate if it beats the current one.
    ///
    /// Candidates covering fewer members than an even spread over
    /// `n_buckets` would (`covered_in_state * n_buckets < state_size`) are
    /// rejected outright. Returns whether the candidate was taken; the caller
    /// then sets the text.
    pub fn consider(
        &mut self,
        covered_in_state: usize,
        state_size: usize,
        covered_total: usize,
        n_rows: usize,
        n_buckets: usize,
    ) -> bool {
        if covered_in_state * n_buckets < state_size {
            return false;
        }
        let not_covered_in_state = state_size - covered_in_state;
        let covered_outside = covered_total.saturating_sub(covered_in_state);
        let not_covered_outside = (n_rows - state_size).saturating_sub(covered_outside);
        let odds = |a: usize, b: usize| (a as f64 + SMOOTHING).ln() - (b as f64 + SMOOTHING).ln();
        let candidate = odds(covered_in_state, not_covered_in_state)
            - odds(covered_outside, not_covered_outside);
        if self.log_odds_ratio.map_or(true, |best| candidate > best) {
            self.log_odds_ratio = Some(candidate);
            self.n_covered_in_state = covered_in_state;
            self.n_not_covered_in_state = not_covered_in_state;
            self.n_covered_outside_state = covered_outside;
            self.n_not_covered_outside_state = not_covered_outside;
            true
        } else {
            false
        }
    }
}

/// Population histograms in the shape [`suggest_label`] expects.
pub fn label_population(dataset: &Dataset) -> Vec<Histogram> {
    population_histograms(dataset, LABEL_BUCKETS)
}

/// Pick the best label for the state made of `members`.
///
/// `population` must come from [`label_population`]. `fallback` is used when
/// no bucket qualifies.
pub fn suggest_label(
    dataset: &Dataset,
    members: &[usize],
    population: &[Histogram],
    fallback: impl Into<String>,
) -> StateLabel {
    let mut best = StateLabel::fallback(fallback);
    let state_size = members.len();
    let n_rows = dataset.n_rows();

    for (col, total) in dataset.columns().iter().zip(population) {
        let own = Histogram::of_rows(col, LABEL_BUCKETS, members);
        debug_assert_eq!(own.n_buckets(), total.n_buckets());
        match col.kind() {
            ColumnKind::Numeric => {
                for (bucket, (&c_in, &c_total)) in own.freqs().iter().zip(total.freqs()).enumerate()
                {
                    if best.consider(c_in, state_size, c_total, n_rows, own.n_buckets()) {
                        best.label = format!("{} {}", col.label, LEVEL_NAMES[bucket]);
                    }
                }
            }
            ColumnKind::Categorical => {
                for (key, (&c_in, &c_total)) in own.freqs().iter().zip(total.freqs()).enumerate() {
                    if best.consider(c_in, state_size, c_total, n_rows, own.n_buckets()) {
                        best.label = format!("{} = {}", col.label, col.key_name(key));
                    }
                }
            }
            ColumnKind::Time if col.is_wall_clock() => {
                for unit in [CalendarUnit::Hour, CalendarUnit::Month, CalendarUnit::DayOfWeek] {
                    let own_freqs = own.calendar_freqs(unit);
                    let total_freqs = total.calendar_freqs(unit);
                    for (value, (&c_in, &c_total)) in own_freqs.iter().zip(total_freqs).enumerate() {
                        if best.consider(c_in, state_size, c_total, n_rows, own_freqs.len()) {
                            best.label = match unit {
                                CalendarUnit::Hour => format!("HOUR({}) = {}", col.label, value),
                                _ => format!("{} = {}", col.label, unit.value_name(value)),
                            };
                        }
                    }
                }
            }
            ColumnKind::Time | ColumnKind::Text => {}
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{AttributeKind, AttributeSpec, DatasetBuilder, TimeKind};

    fn dataset() -> Dataset {
        let mut builder = DatasetBuilder::new(vec![
            AttributeSpec::new("temp", AttributeKind::NumericFloat).with_label("Temperature"),
            AttributeSpec::new("mode", AttributeKind::CategoricalString).with_label("Mode"),
        ])
        .unwrap();
        let rows = [
            (0.0, "idle"),
            (1.0, "idle"),
            (2.0, "busy"),
            (3.0, "busy"),
            (8.0, "busy"),
            (9.0, "busy"),
            (10.0, "idle"),
            (10.0, "busy"),
        ];
        for (t, m) in rows {
            builder.push_row(&[t.into(), m.into()]);
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_consider_rejects_thin_coverage() {
        let mut label = StateLabel::fallback("0");
        // 1 of 10 members with 5 buckets is below an even share.
        assert!(!label.consider(1, 10, 5, 100, 5));
        assert_eq!(label.log_odds_ratio, None);
        assert!(label.consider(2, 10, 5, 100, 5));
        assert_eq!(label.n_covered_in_state, 2);
        assert_eq!(label.n_not_covered_in_state, 8);
        assert_eq!(label.n_covered_outside_state, 3);
        assert_eq!(label.n_not_covered_outside_state, 87);
    }

    #[test]
    fn test_consider_keeps_strictly_better() {
        let mut label = StateLabel::fallback("0");
        assert!(label.consider(5, 10, 50, 100, 5));
        let first = label.log_odds_ratio.unwrap();
        // Same evidence does not replace the incumbent.
        assert!(!label.consider(5, 10, 50, 100, 5));
        assert!(label.consider(10, 10, 10, 100, 5));
        assert!(label.log_odds_ratio.unwrap() > first);
    }

    #[test]
    fn test_log_odds_formula() {
        let mut label = StateLabel::fallback("0");
        label.consider(3, 4, 3, 10, 2);
        let expected = ((3.1f64).ln() - (1.1f64).ln()) - ((0.1f64).ln() - (6.1f64).ln());
        assert!((label.log_odds_ratio.unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_high_values_get_highest_label() {
        let ds = dataset();
        let population = label_population(&ds);
        let label = suggest_label(&ds, &[4, 5, 6, 7], &population, "1");
        assert_eq!(label.label, "Temperature HIGHEST");
        assert_eq!(label.n_covered_in_state, 4);
        assert_eq!(label.n_covered_outside_state, 0);
    }

    #[test]
    fn test_categorical_label() {
        let ds = dataset();
        let population = label_population(&ds);
        // Rows 0, 1, 6: idle everywhere, values spread over LOWEST and HIGHEST.
        let label = suggest_label(&ds, &[0, 1, 6], &population, "2");
        assert_eq!(label.label, "Mode = idle");
    }

    #[test]
    fn test_label_is_idempotent() {
        let ds = dataset();
        let population = label_population(&ds);
        let a = suggest_label(&ds, &[2, 3], &population, "0");
        let b = suggest_label(&ds, &[2, 3], &population, "0");
        assert_eq!(a, b);
    }

    #[test]
    fn test_hour_label() {
        let mut builder = DatasetBuilder::new(vec![AttributeSpec::new(
            "t",
            AttributeKind::Time(TimeKind::Time),
        )
        .with_label("Time")])
        .unwrap();
        for hour in 0..24 {
            builder.push_row(&[format!("2024-01-01 {hour:02}:30:00").into()]);
        }
        builder.push_row(&["2024-01-02 14:10:00".into()]);
        let ds = builder.build().unwrap();
        let population = label_population(&ds);
        let label = suggest_label(&ds, &[14, 24], &population, "0");
        assert_eq!(label.label, "HOUR(Time) = 14");
    }
}
