//! Validation findings collected while checking a CRAC against its network.
//!
//! Validation never stops at the first problem: every dangling reference,
//! duplicated id or inconsistent state is recorded so that a user fixing an
//! input file sees the whole list at once. Errors make the CRAC unusable for
//! optimization; warnings only flag suspicious but workable data.
//!
//! # Example
//!
//! ```
//! use rao_core::diagnostics::{Diagnostics, Severity};
//!
//! let mut diag = Diagnostics::new();
//! diag.add_warning("usage-rule", "network action has no usage rule");
//! diag.add_error_with_entity("reference", "unknown network element", "cnec-1");
//!
//! assert_eq!(diag.warning_count(), 1);
//! assert_eq!(diag.error_count(), 1);
//! assert!(diag.clone().into_result().is_err());
//! ```

use crate::error::{RaoError, RaoResult};
use serde::Serialize;

/// Severity level for diagnostic issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Suspicious input that the optimizer can still work with
    Warning,
    /// Inconsistent input that aborts the run
    Error,
}

/// A single finding
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    /// Grouping key ("reference", "duplicate", "state", "range", ...)
    pub category: String,
    pub message: String,
    /// Id of the CRAC object or network element concerned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl DiagnosticIssue {
    pub fn new(
        severity: Severity,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category: category.into(),
            message: message.into(),
            entity: None,
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }
}

impl std::fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };

        write!(f, "[{}:{}] {}", severity, self.category, self.message)?;

        if let Some(entity) = &self.entity {
            write!(f, " ({})", entity)?;
        }

        Ok(())
    }
}

/// Collection of validation findings.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issue: DiagnosticIssue) {
        self.issues.push(issue);
    }

    pub fn add_warning(&mut self, category: &str, message: &str) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Warning, category, message));
    }

    pub fn add_warning_with_entity(&mut self, category: &str, message: &str, entity: &str) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Warning, category, message).with_entity(entity));
    }

    pub fn add_error(&mut self, category: &str, message: &str) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Error, category, message));
    }

    pub fn add_error_with_entity(&mut self, category: &str, message: &str, entity: &str) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Error, category, message).with_entity(entity));
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
    }

    pub fn issues_by_category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a DiagnosticIssue> {
        self.issues.iter().filter(move |i| i.category == category)
    }

    pub fn merge(&mut self, other: Diagnostics) {
        self.issues.extend(other.issues);
    }

    pub fn summary(&self) -> String {
        let plural = |n: usize| if n == 1 { "" } else { "s" };
        match (self.warning_count(), self.error_count()) {
            (0, 0) => "No issues".to_string(),
            (w, 0) => format!("{} warning{}", w, plural(w)),
            (0, e) => format!("{} error{}", e, plural(e)),
            (w, e) => format!("{} warning{}, {} error{}", w, plural(w), e, plural(e)),
        }
    }

    /// Turn the collected errors into a single configuration error.
    ///
    /// Warnings are dropped; callers that care log them before converting.
    pub fn into_result(self) -> RaoResult<()> {
        if !self.has_errors() {
            return Ok(());
        }
        let details = self
            .errors()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Err(RaoError::Config(format!(
            "CRAC is inconsistent ({}): {}",
            self.summary(),
            details
        )))
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Diagnostics: {}", self.summary())?;
        for issue in &self.issues {
            writeln!(f, "  {}", issue)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_diagnostics() {
        let diag = Diagnostics::new();
        assert_eq!(diag.summary(), "No issues");
        assert!(diag.into_result().is_ok());
    }

    #[test]
    fn test_warnings_do_not_fail() {
        let mut diag = Diagnostics::new();
        diag.add_warning("usage-rule", "no usage rule");
        diag.add_warning_with_entity("range", "empty range", "pst-1");
        assert_eq!(diag.summary(), "2 warnings");
        assert!(diag.into_result().is_ok());
    }

    #[test]
    fn test_errors_become_config_error() {
        let mut diag = Diagnostics::new();
        diag.add_error_with_entity("reference", "unknown contingency", "cnec-7");
        diag.add_warning("usage-rule", "no usage rule");

        let err = diag.into_result().unwrap_err();
        assert!(matches!(err, RaoError::Config(_)));
        let text = err.to_string();
        assert!(text.contains("1 warning, 1 error"));
        assert!(text.contains("cnec-7"));
    }

    #[test]
    fn test_issue_display() {
        let issue = DiagnosticIssue::new(Severity::Error, "duplicate", "id used twice")
            .with_entity("na-1");
        assert_eq!(issue.to_string(), "[error:duplicate] id used twice (na-1)");
    }

    #[test]
    fn test_filter_by_category() {
        let mut diag = Diagnostics::new();
        diag.add_error("reference", "a");
        diag.add_error("duplicate", "b");
        diag.add_warning("reference", "c");
        assert_eq!(diag.issues_by_category("reference").count(), 2);
    }
}
