//! Validation reports and structural checks.
//!
//! Ingestion and configuration collect every problem they find into a
//! [`ValidationReport`] instead of stopping at the first one. The same report
//! type is produced by [`check_partition_chain`], which verifies the
//! structural invariants of a built model:
//! - every partition covers each row exactly once
//! - each partition has one state fewer than its predecessor
//! - every coarser state is one or two states of the finer partition
//! - transition rows sum to 1, or to 0 when the state has no outgoing mass

use std::collections::{HashMap, HashSet};

use super::{Partition, State};

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Informational, not a problem.
    Info,
    /// Something unusual but not necessarily wrong.
    Warning,
    /// A problem that prevents building a model.
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARN"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// A single problem found during validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    /// Severity of the issue.
    pub severity: Severity,
    /// Human-readable description.
    pub message: String,
    /// Input row involved, if any.
    pub row: Option<usize>,
    /// Attribute (or config field) involved, if any.
    pub attribute: Option<String>,
}

impl ValidationIssue {
    /// Create a new validation issue.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            row: None,
            attribute: None,
        }
    }

    /// Attach the offending row.
    pub fn with_row(mut self, row: usize) -> Self {
        self.row = Some(row);
        self
    }

    /// Attach the offending attribute or field name.
    pub fn with_attribute(mut self, name: impl Into<String>) -> Self {
        self.attribute = Some(name.into());
        self
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)?;
        if let Some(row) = self.row {
            write!(f, " (row {})", row)?;
        }
        if let Some(attr) = &self.attribute {
            write!(f, " - {}", attr)?;
        }
        Ok(())
    }
}

/// Every issue found by one validation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    /// All issues found.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Create an empty report.
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    /// Add an issue to the report.
    pub fn add(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    /// Add an info-level issue.
    pub fn info(&mut self, message: impl Into<String>) {
        self.add(ValidationIssue::new(Severity::Info, message));
    }

    /// Add a warning-level issue.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.add(ValidationIssue::new(Severity::Warning, message));
    }

    /// Add an error-level issue.
    pub fn error(&mut self, message: impl Into<String>) {
        self.add(ValidationIssue::new(Severity::Error, message));
    }

    /// Check if the report contains no errors.
    pub fn is_healthy(&self) -> bool {
        !self.issues.iter().any(|i| i.severity >= Severity::Error)
    }

    /// Check if there are any issues at all.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Get issues of a specific severity or higher.
    pub fn issues_at_level(&self, min_severity: Severity) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity >= min_severity)
            .collect()
    }

    /// Count issues by severity.
    pub fn counts(&self) -> HashMap<Severity, usize> {
        let mut counts = HashMap::new();
        for issue in &self.issues {
            *counts.entry(issue.severity).or_default() += 1;
        }
        counts
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_clean() {
            return write!(f, "Validation passed: no issues found");
        }

        let counts = self.counts();
        write!(f, "Validation report: ")?;

        let parts: Vec<String> = [
            (Severity::Error, "errors"),
            (Severity::Warning, "warnings"),
            (Severity::Info, "info"),
        ]
        .iter()
        .filter_map(|(sev, name)| counts.get(sev).map(|c| format!("{} {}", c, name)))
        .collect();

        writeln!(f, "{}", parts.join(", "))?;

        for issue in &self.issues {
            writeln!(f, "  {}", issue)?;
        }

        Ok(())
    }
}

/// Check the structural invariants of an aggregation chain.
///
/// `states` is the arena the partitions index into. Row sums are compared
/// with a tolerance of `1e-6`.
pub fn check_partition_chain(
    n_rows: usize,
    states: &[State],
    chain: &[Partition],
) -> ValidationReport {
    let mut report = ValidationReport::new();

    for (scale, partition) in chain.iter().enumerate() {
        let mut seen = vec![false; n_rows];
        for &id in &partition.states {
            for &row in &states[id].members {
                if row >= n_rows {
                    report.add(
                        ValidationIssue::new(Severity::Error, format!("scale {scale}: row out of range"))
                            .with_row(row),
                    );
                } else if seen[row] {
                    report.add(
                        ValidationIssue::new(
                            Severity::Error,
                            format!("scale {scale}: row belongs to two states"),
                        )
                        .with_row(row),
                    );
                } else {
                    seen[row] = true;
                }
            }
        }
        if let Some(missing) = seen.iter().position(|s| !s) {
            report.add(
                ValidationIssue::new(Severity::Error, format!("scale {scale}: row not covered"))
                    .with_row(missing),
            );
        }

        // A state seen only on the last row has no outgoing mass; its row stays zero.
        for (i, row) in partition.transitions.rows().into_iter().enumerate() {
            let row_sum = row.sum();
            if (row_sum - 1.0).abs() > 1e-6 && row_sum.abs() > 1e-6 {
                report.error(format!("scale {scale}: transition row {i} sums to {row_sum}"));
            }
        }
    }

    for (scale, pair) in chain.windows(2).enumerate() {
        let (finer, coarser) = (&pair[0], &pair[1]);
        if coarser.states.len() + 1 != finer.states.len() {
            report.error(format!(
                "scale {}: {} states follow {} states",
                scale + 1,
                coarser.states.len(),
                finer.states.len()
            ));
        }
        let finer_ids: HashSet<usize> = finer.states.iter().copied().collect();
        for &id in &coarser.states {
            if finer_ids.contains(&id) {
                continue;
            }
            let parts: HashSet<usize> = states[id]
                .initial_states
                .iter()
                .map(|&init| finer.initial_to_state[init])
                .collect();
            if parts.len() > 2 {
                report.error(format!(
                    "scale {}: state {id} merges {} finer states",
                    scale + 1,
                    parts.len()
                ));
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
    }

    #[test]
    fn test_validation_report_healthy() {
        let mut report = ValidationReport::new();
        report.info("Just some info");
        report.warn("A warning");

        assert!(report.is_healthy());

        report.error("An error");
        assert!(!report.is_healthy());
        assert_eq!(report.issues_at_level(Severity::Warning).len(), 2);
    }

    #[test]
    fn test_validation_issue_display() {
        let issue = ValidationIssue::new(Severity::Error, "cannot parse value")
            .with_row(42)
            .with_attribute("Temperature");

        let s = format!("{}", issue);
        assert!(s.contains("ERROR"));
        assert!(s.contains("cannot parse value"));
        assert!(s.contains("row 42"));
        assert!(s.contains("Temperature"));
    }

    #[test]
    fn test_report_display_counts() {
        let mut report = ValidationReport::new();
        report.error("a");
        report.error("b");
        report.warn("c");
        let s = report.to_string();
        assert!(s.starts_with("Validation report: 2 errors, 1 warnings"));
    }
}
