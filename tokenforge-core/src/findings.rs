use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a deployment validation finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    /// Blocking findings stop a deployment unless explicitly overridden
    pub fn is_blocking(&self) -> bool {
        matches!(self, Severity::Critical | Severity::High)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        };
        f.write_str(s)
    }
}

/// A single problem reported by the deployment validation gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFinding {
    pub severity: Severity,
    pub description: String,
    /// Form path of the offending field, e.g. `feeRecipient`
    pub field: String,
}

impl ValidationFinding {
    pub fn new(severity: Severity, field: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            severity,
            description: description.into(),
            field: field.into(),
        }
    }
}

impl fmt::Display for ValidationFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.field, self.description)
    }
}

/// Outcome of one validation run. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SecurityValidationResult {
    /// True if any finding has blocking severity
    pub has_issues: bool,
    /// Findings in the order the checks produced them
    pub findings: Vec<ValidationFinding>,
}

impl SecurityValidationResult {
    pub fn from_findings(findings: Vec<ValidationFinding>) -> Self {
        let has_issues = findings.iter().any(|f| f.severity.is_blocking());
        Self { has_issues, findings }
    }

    pub fn blocking(&self) -> impl Iterator<Item = &ValidationFinding> {
        self.findings.iter().filter(|f| f.severity.is_blocking())
    }

    pub fn findings_for<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a ValidationFinding> {
        self.findings.iter().filter(move |f| f.field == field)
    }

    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}
