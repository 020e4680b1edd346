//! Verdict rendering.
//!
//! Human text mirrors the fields of [`ComplianceVerdict`]; JSON is the verdict serialized as is.

use crate::cli::{OutputFormat, VerbosityLevel};
use crate::error::ValidationError;
use crate::report::{ComplianceVerdict, ValidationReport};
use crate::rules::Outcome;

pub struct Output {
    format: OutputFormat,
    verbosity: VerbosityLevel,
    show_colors: bool,
}

impl Output {
    pub fn new(format: OutputFormat, verbosity: VerbosityLevel) -> Self {
        Self {
            format,
            verbosity,
            show_colors: atty::is(atty::Stream::Stdout),
        }
    }

    /// Plain output regardless of the terminal
    pub fn without_colors(mut self) -> Self {
        self.show_colors = false;
        self
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    pub fn format_verdict(&self, verdict: &ComplianceVerdict) -> Result<String, ValidationError> {
        match self.format {
            OutputFormat::Json => to_json(verdict),
            OutputFormat::Human => Ok(self.format_human(verdict)),
        }
    }

    fn format_human(&self, verdict: &ComplianceVerdict) -> String {
        let compliant = if verdict.is_compliant {
            self.colorize("true", "32")
        } else {
            self.colorize("false", "31")
        };

        if self.verbosity == VerbosityLevel::Quiet {
            return format!("Is compliant: {}\n", compliant);
        }

        let mut output = String::new();
        output.push_str(&format!("Bag location: {}\n", verdict.bag_location));
        output.push_str(&format!("Name: {}\n", verdict.name));
        output.push_str(&format!("Profile version: {}\n", verdict.profile_version));
        output.push_str(&format!(
            "Information package type: {}\n",
            verdict.information_package_type
        ));
        output.push_str(&format!("Is compliant: {}\n", compliant));
        output.push_str("Rule violations:\n");
        for violation in &verdict.rule_violations {
            output.push_str(&format!("  - [{}] {}\n", violation.rule, violation.violation));
        }

        if self.verbosity >= VerbosityLevel::Verbose {
            output.push_str("Rule results:\n");
            output.push_str(&self.format_results(&verdict.results));
        }

        output
    }

    fn format_results(&self, report: &ValidationReport) -> String {
        report
            .results()
            .iter()
            .map(|result| {
                let status = match &result.outcome {
                    Outcome::Success => self.colorize("SUCCESS", "32"),
                    Outcome::Violation(_) => self.colorize("VIOLATION", "31"),
                    Outcome::Skipped(dependency) => {
                        format!("{} (needs {})", self.colorize("SKIPPED", "36"), dependency)
                    }
                    Outcome::Fatal(_) => self.colorize("FATAL", "33"),
                };
                format!("  {} {}\n", result.rule, status)
            })
            .collect()
    }

    /// Message for a run that ended on a fatal outcome
    pub fn format_error(&self, error: &ValidationError) -> String {
        match error {
            ValidationError::RunAborted {
                rule,
                diagnostic,
                report,
            } => {
                let mut output = format!(
                    "{} rule {} could not be evaluated: {}\n",
                    self.colorize("Validation aborted:", "33"),
                    rule,
                    diagnostic
                );
                if self.verbosity >= VerbosityLevel::Verbose {
                    output.push_str("Rule results before the abort:\n");
                    output.push_str(&self.format_results(report));
                }
                output
            }
            other => format!("{} {}\n", self.colorize("Error:", "31"), other),
        }
    }
}

fn to_json(verdict: &ComplianceVerdict) -> Result<String, ValidationError> {
    serde_json::to_string_pretty(verdict)
        .map_err(|e| ValidationError::Config(format!("Could not serialize verdict: {}", e)))
}
