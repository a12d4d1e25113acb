//! Structured validation findings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How serious a finding is. Only `Error` fails a report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Warning,
    Error,
}

/// Which invariant or degradation a finding is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    NegativeValue,
    NonFinite,
    ShareOutOfBounds,
    SumMismatch,
    ExcessiveGrowth,
    StockFlowBroken,
    /// Logistic fit skipped or failed; seeded parameters used.
    FitFallback,
    /// Cost CAGR clamped before extrapolation.
    CagrClamped,
    /// Market growth clamped to the configured cap.
    GrowthClamped,
    /// Cost curves never cross within the horizon.
    NoTippingPoint,
    /// Bottom-up segments alone exceed the total.
    BottomUpExceedsTotal,
    /// Low-confidence segments were rescaled to restore consistency.
    Rescaled,
    InsufficientData,
}

/// One finding, with enough detail to recalibrate without a re-run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub kind: IssueKind,
    /// Segment, series or stage the finding refers to.
    pub segment: String,
    pub year: Option<i32>,
    /// Size of the violation in the units of the checked quantity.
    pub magnitude: f64,
    pub message: String,
}

impl ValidationIssue {
    pub fn error(kind: IssueKind, segment: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            segment: segment.into(),
            year: None,
            magnitude: 0.0,
            message: message.into(),
        }
    }

    pub fn warning(
        kind: IssueKind,
        segment: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(kind, segment, message)
        }
    }

    pub fn at(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn magnitude(mut self, magnitude: f64) -> Self {
        self.magnitude = magnitude;
        self
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.severity, self.segment)?;
        if let Some(y) = self.year {
            write!(f, " @{y}")?;
        }
        write!(f, ": {} (magnitude {:.6})", self.message, self.magnitude)
    }
}

/// Pass/fail report. Warnings never fail it; any `Error` does.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub passed: bool,
    pub issues: Vec<ValidationIssue>,
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            passed: true,
            issues: Vec::new(),
        }
    }

    pub fn push(&mut self, issue: ValidationIssue) {
        if issue.severity == Severity::Error {
            self.passed = false;
        }
        self.issues.push(issue);
    }

    pub fn extend(&mut self, issues: impl IntoIterator<Item = ValidationIssue>) {
        for i in issues {
            self.push(i);
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    /// True if any finding of `kind` is present.
    pub fn has(&self, kind: IssueKind) -> bool {
        self.issues.iter().any(|i| i.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_do_not_fail() {
        let mut r = ValidationReport::new();
        r.push(ValidationIssue::warning(IssueKind::ExcessiveGrowth, "ev", "fast").at(2030));
        assert!(r.passed);
        r.push(ValidationIssue::error(IssueKind::NegativeValue, "ice", "below zero").magnitude(-3.0));
        assert!(!r.passed);
        assert_eq!(r.errors().count(), 1);
        assert_eq!(r.warnings().count(), 1);
        assert!(r.has(IssueKind::NegativeValue));
    }

    #[test]
    fn display_names_segment_and_year() {
        let i = ValidationIssue::error(IssueKind::SumMismatch, "total", "off").at(2031);
        let s = i.to_string();
        assert!(s.contains("total"));
        assert!(s.contains("@2031"));
    }
}
