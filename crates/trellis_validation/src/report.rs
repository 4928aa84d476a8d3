//! Validation findings and their aggregate.

use serde::{Deserialize, Serialize};
use trellis_events::event::{FindingSummary, ValidationEventData};

/// How serious a finding is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational; never blocks.
    Info,
    /// Blocks only in strict mode.
    Warning,
    /// Always blocks.
    #[default]
    Error,
}

/// One failed check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    /// Id of the rule that failed.
    pub rule: String,
    /// Machine code, e.g. `"DANGLING_CONNECTION"` or the rule id.
    pub code: String,
    /// Offending field (`"sourceId"`, `"data.message"`) or entity id.
    pub field: String,
    /// Human-readable message.
    pub message: String,
    /// Severity.
    pub severity: Severity,
    /// Entity the finding is about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl ValidationIssue {
    /// Creates an error-severity finding.
    #[must_use]
    pub fn new(
        rule: impl Into<String>,
        code: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule: rule.into(),
            code: code.into(),
            field: field.into(),
            message: message.into(),
            severity: Severity::Error,
            target: None,
        }
    }

    /// Sets the severity.
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Sets the target entity.
    #[must_use]
    pub fn on(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    fn summary(&self) -> FindingSummary {
        FindingSummary {
            field: self.field.clone(),
            message: self.message.clone(),
        }
    }
}

/// Outcome of a validation run.
///
/// `valid` is true iff `errors` is empty. Warnings and infos never affect it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// Whether no error-severity finding was produced.
    pub valid: bool,
    /// Error-severity findings.
    pub errors: Vec<ValidationIssue>,
    /// Warning- and info-severity findings.
    pub warnings: Vec<ValidationIssue>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationResult {
    /// An empty, valid result.
    #[must_use]
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Files a finding under errors or warnings by severity.
    pub fn push(&mut self, issue: ValidationIssue) {
        if issue.severity == Severity::Error {
            self.errors.push(issue);
            self.valid = false;
        } else {
            self.warnings.push(issue);
        }
    }

    /// Moves all findings of `other` into `self`.
    pub fn merge(&mut self, other: ValidationResult) {
        for issue in other.errors.into_iter().chain(other.warnings) {
            self.push(issue);
        }
    }

    /// Returns true if the findings should stop a commit.
    ///
    /// Errors always block. In strict mode warning-severity findings block
    /// too; info findings never do.
    #[must_use]
    pub fn is_blocking(&self, strict: bool) -> bool {
        !self.errors.is_empty()
            || (strict && self.warnings.iter().any(|w| w.severity == Severity::Warning))
    }

    /// The findings that block a commit, in report order.
    #[must_use]
    pub fn blocking(&self, strict: bool) -> Vec<&ValidationIssue> {
        self.errors
            .iter()
            .chain(
                self.warnings
                    .iter()
                    .filter(|w| strict && w.severity == Severity::Warning),
            )
            .collect()
    }

    /// Total number of findings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len() + self.warnings.len()
    }

    /// Returns true if there are no findings at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flattens the result for an event payload.
    #[must_use]
    pub fn to_event_data(&self, target_type: &str, target: Option<&str>) -> ValidationEventData {
        ValidationEventData {
            target: target.map(str::to_owned),
            target_type: target_type.to_owned(),
            errors: self.errors.iter().map(ValidationIssue::summary).collect(),
            warnings: self.warnings.iter().map(ValidationIssue::summary).collect(),
            is_valid: self.valid,
        }
    }
}

impl Extend<ValidationIssue> for ValidationResult {
    fn extend<I: IntoIterator<Item = ValidationIssue>>(&mut self, iter: I) {
        for issue in iter {
            self.push(issue);
        }
    }
}

impl FromIterator<ValidationIssue> for ValidationResult {
    fn from_iter<I: IntoIterator<Item = ValidationIssue>>(iter: I) -> Self {
        let mut result = Self::new();
        result.extend(iter);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_do_not_affect_validity() {
        let result: ValidationResult = [
            ValidationIssue::new("r1", "r1", "label", "short label").with_severity(Severity::Warning),
            ValidationIssue::new("r2", "r2", "id", "fyi").with_severity(Severity::Info),
        ]
        .into_iter()
        .collect();
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 2);
        assert!(!result.is_blocking(false));
        assert!(result.is_blocking(true));
        assert_eq!(result.blocking(true).len(), 1);
    }

    #[test]
    fn errors_invalidate_and_block() {
        let mut result = ValidationResult::new();
        result.push(ValidationIssue::new("r", "r", "sourceId", "missing"));
        assert!(!result.valid);
        assert!(result.is_blocking(false));
    }

    #[test]
    fn merge_recomputes_validity() {
        let mut left = ValidationResult::new();
        let mut right = ValidationResult::new();
        right.push(ValidationIssue::new("r", "r", "x", "bad"));
        left.merge(right);
        assert!(!left.valid);
        assert_eq!(left.len(), 1);
    }
}
