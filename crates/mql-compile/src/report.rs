//! Failure summaries and the CI reporting seam.
//!
//! The pipeline hands results to a [`CiReporter`]: run outputs, a comment
//! payload when compilation fails, and the final failure status.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::classify::LogReport;

/// Headline of every failure message.
pub const FAILURE_HEADLINE: &str = "Compilation failed!";

/// Diagnostics gathered up to and including the first failing file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FailureSummary {
    /// File whose log failed the run.
    pub failed_file: Option<PathBuf>,

    /// Error lines across processed files, in order.
    pub errors: Vec<String>,

    /// Warning lines across processed files, in order.
    pub warnings: Vec<String>,

    /// Warnings were configured not to fail the run.
    pub warnings_ignored: bool,
}

impl FailureSummary {
    pub fn new(warnings_ignored: bool) -> Self {
        Self {
            warnings_ignored,
            ..Self::default()
        }
    }

    /// Append the diagnostics of one processed file.
    pub fn absorb(&mut self, report: &LogReport) {
        self.errors.extend(report.errors.iter().cloned());
        self.warnings.extend(report.warnings.iter().cloned());
    }

    fn warnings_heading(&self) -> &'static str {
        if self.warnings_ignored {
            "(Ignored) warnings found:"
        } else {
            "Warnings found:"
        }
    }

    /// Plain message for the CI failure status.
    pub fn render_message(&self) -> String {
        let mut text = FAILURE_HEADLINE.to_string();

        if !self.errors.is_empty() {
            text.push_str("\n\nErrors found:\n");
            for line in &self.errors {
                text.push_str(&format!("\n* {}", line));
            }
        }

        if !self.warnings.is_empty() {
            text.push_str(&format!("\n\n{}\n", self.warnings_heading()));
            for line in &self.warnings {
                text.push_str(&format!("\n* {}", line));
            }
        }

        text
    }

    /// Markdown body for a pull-request comment.
    pub fn render_markdown(&self) -> String {
        let mut md = String::from("## MQL compilation failed\n");

        if let Some(file) = &self.failed_file {
            md.push_str(&format!("\nFirst failing file: `{}`\n", file.display()));
        }

        if !self.errors.is_empty() {
            md.push_str(&format!("\n### Errors ({})\n\n", self.errors.len()));
            for line in &self.errors {
                md.push_str(&format!("- `{}`\n", line.trim()));
            }
        }

        if !self.warnings.is_empty() {
            let heading = if self.warnings_ignored {
                "Warnings, ignored"
            } else {
                "Warnings"
            };
            md.push_str(&format!("\n### {} ({})\n\n", heading, self.warnings.len()));
            for line in &self.warnings {
                md.push_str(&format!("- `{}`\n", line.trim()));
            }
        }

        md
    }
}

/// CI platform collaborator.
#[async_trait]
pub trait CiReporter: Send + Sync {
    /// Publish a machine-readable run output.
    async fn set_output(&self, name: &str, value: &str);

    /// Publish the structured failure comment.
    async fn post_comment(&self, summary: &FailureSummary);

    /// Mark the CI job failed with a human-readable message.
    async fn set_failed(&self, message: &str);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::LogClassifier;

    fn summary(ignored: bool) -> FailureSummary {
        let mut summary = FailureSummary::new(ignored);
        summary.failed_file = Some(PathBuf::from("b.mq5"));
        summary.errors.push("b.mq5 : error 201: undeclared identifier".to_string());
        summary.warnings.push("a.mq5 : warning 43: possible loss of data".to_string());
        summary
    }

    #[test]
    fn test_render_message_lists_errors_then_warnings() {
        let text = summary(false).render_message();
        assert_eq!(
            text,
            "Compilation failed!\n\nErrors found:\n\n* b.mq5 : error 201: undeclared identifier\
             \n\nWarnings found:\n\n* a.mq5 : warning 43: possible loss of data"
        );
    }

    #[test]
    fn test_render_message_marks_ignored_warnings() {
        let text = summary(true).render_message();
        assert!(text.contains("(Ignored) warnings found:"));
    }

    #[test]
    fn test_render_message_headline_only_when_empty() {
        assert_eq!(FailureSummary::new(false).render_message(), FAILURE_HEADLINE);
    }

    #[test]
    fn test_render_markdown_sections() {
        let md = summary(true).render_markdown();
        assert!(md.contains("First failing file: `b.mq5`"));
        assert!(md.contains("### Errors (1)"));
        assert!(md.contains("### Warnings, ignored (1)"));
        assert!(md.contains("- `b.mq5 : error 201: undeclared identifier`"));
    }

    #[test]
    fn test_absorb_appends_in_order() {
        let classifier = LogClassifier::new(true);
        let first = classifier.classify_text("x : warning 1: one\n".to_string());
        let second = classifier.classify_text("y : error 2: two\ny : warning 3: three\n".to_string());

        let mut summary = FailureSummary::new(true);
        summary.absorb(&first);
        summary.absorb(&second);

        assert_eq!(summary.errors, vec!["y : error 2: two"]);
        assert_eq!(summary.warnings, vec!["x : warning 1: one", "y : warning 3: three"]);
    }

    #[test]
    fn test_summary_serializes_as_comment_payload() {
        let json = serde_json::to_value(summary(false)).unwrap();
        assert_eq!(json["errors"][0], "b.mq5 : error 201: undeclared identifier");
        assert_eq!(json["warnings_ignored"], false);
    }
}
