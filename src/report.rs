//! Run results and the compliance verdict built from them.

use std::path::Path;

use serde::Serialize;

use crate::error::{Result, ValidationError};
use crate::rules::{Outcome, RuleId};

pub const PROFILE_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleResult {
    pub rule: RuleId,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Ordered `(rule, outcome)` pairs of one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationReport {
    results: Vec<RuleResult>,
}

impl ValidationReport {
    pub fn push(&mut self, rule: RuleId, outcome: Outcome) {
        self.results.push(RuleResult { rule, outcome });
    }

    pub fn results(&self) -> &[RuleResult] {
        &self.results
    }

    pub fn outcome(&self, rule: &str) -> Option<&Outcome> {
        self.results
            .iter()
            .find(|r| r.rule.as_str() == rule)
            .map(|r| &r.outcome)
    }

    /// No rule produced a violation or a fatal outcome
    pub fn is_compliant(&self) -> bool {
        !self
            .results
            .iter()
            .any(|r| matches!(r.outcome, Outcome::Violation(_) | Outcome::Fatal(_)))
    }

    pub fn fatal(&self) -> Option<&RuleResult> {
        self.results
            .iter()
            .find(|r| matches!(r.outcome, Outcome::Fatal(_)))
    }

    /// Every violation message with the rule that produced it, in report order
    pub fn violations(&self) -> impl Iterator<Item = (&RuleId, &str)> {
        self.results.iter().flat_map(|r| {
            let messages: &[String] = match &r.outcome {
                Outcome::Violation(messages) => messages,
                _ => &[],
            };
            messages.iter().map(move |m| (&r.rule, m.as_str()))
        })
    }

    pub fn skipped(&self) -> impl Iterator<Item = (&RuleId, &RuleId)> {
        self.results.iter().filter_map(|r| match &r.outcome {
            Outcome::Skipped(dependency) => Some((&r.rule, dependency)),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Label carried into the verdict; rule selection does not depend on it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InformationPackageType {
    #[default]
    Deposit,
    Migration,
}

impl std::fmt::Display for InformationPackageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InformationPackageType::Deposit => f.write_str("DEPOSIT"),
            InformationPackageType::Migration => f.write_str("MIGRATION"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleViolation {
    pub rule: String,
    pub violation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceVerdict {
    pub bag_location: String,
    pub name: String,
    pub profile_version: String,
    pub information_package_type: InformationPackageType,
    pub is_compliant: bool,
    pub rule_violations: Vec<RuleViolation>,
    pub results: ValidationReport,
}

/// Turns a finished run into the verdict handed to callers
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    bag_location: String,
    name: String,
    package_type: InformationPackageType,
}

impl ReportBuilder {
    pub fn new(bag_location: &Path, name: impl Into<String>) -> Self {
        Self {
            bag_location: bag_location.display().to_string(),
            name: name.into(),
            package_type: InformationPackageType::default(),
        }
    }

    pub fn package_type(mut self, package_type: InformationPackageType) -> Self {
        self.package_type = package_type;
        self
    }

    /// Fails with [`ValidationError::RunAborted`] when the run ended on a fatal outcome
    pub fn build(&self, report: ValidationReport) -> Result<ComplianceVerdict> {
        if let Some(fatal) = report.fatal() {
            let diagnostic = match &fatal.outcome {
                Outcome::Fatal(diagnostic) => diagnostic.clone(),
                _ => String::new(),
            };
            return Err(ValidationError::RunAborted {
                rule: fatal.rule.to_string(),
                diagnostic,
                report: Box::new(report),
            });
        }

        let rule_violations = report
            .violations()
            .map(|(rule, message)| RuleViolation {
                rule: rule.to_string(),
                violation: message.to_string(),
            })
            .collect();

        Ok(ComplianceVerdict {
            bag_location: self.bag_location.clone(),
            name: self.name.clone(),
            profile_version: PROFILE_VERSION.to_string(),
            information_package_type: self.package_type,
            is_compliant: report.is_compliant(),
            rule_violations,
            results: report,
        })
    }
}
