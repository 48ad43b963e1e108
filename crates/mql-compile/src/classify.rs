//! Compile log classification.
//!
//! MetaEditor writes its log as UTF-16LE. The log is decoded, scanned for
//! `error <code>:` and `warning <code>:` lines, and reduced to a verdict.
//! The log is the authoritative pass/fail signal for a compile.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::error::ClassifyError;

/// Outcome of one compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
}

/// Classified compile log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogReport {
    /// Decoded log text.
    pub text: String,

    /// Lines matching the error pattern, in log order.
    pub errors: Vec<String>,

    /// Lines matching the warning pattern, in log order.
    pub warnings: Vec<String>,

    pub verdict: Verdict,

    /// The log references the toolchain's bundled MQL libraries.
    pub uses_platform_libraries: bool,
}

impl LogReport {
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }
}

fn error_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^\r\n]*error [0-9]+:[^\r\n]*").expect("valid regex"))
}

fn warning_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^\r\n]*warning [0-9]+:[^\r\n]*").expect("valid regex"))
}

/// Decode UTF-16LE bytes, dropping a leading byte-order mark.
pub fn decode_utf16le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|pair| match pair {
            [lo, hi] => u16::from_le_bytes([*lo, *hi]),
            _ => 0xFFFD,
        })
        .collect();
    let text = String::from_utf16_lossy(&units);
    match text.strip_prefix('\u{FEFF}') {
        Some(rest) => rest.to_string(),
        None => text,
    }
}

/// Classifies MetaEditor logs.
#[derive(Debug, Clone, Default)]
pub struct LogClassifier {
    /// Warnings do not fail the verdict.
    pub ignore_warnings: bool,

    /// Toolchain directory name; log references to its `MQL` folder raise
    /// an advisory about platform initialization.
    pub toolchain_dir_name: Option<String>,
}

impl LogClassifier {
    pub fn new(ignore_warnings: bool) -> Self {
        Self {
            ignore_warnings,
            toolchain_dir_name: None,
        }
    }

    pub fn with_toolchain_dir_name(mut self, name: impl Into<String>) -> Self {
        self.toolchain_dir_name = Some(name.into());
        self
    }

    /// Read, decode and classify the log at `log_path`.
    pub fn classify(&self, log_path: &Path) -> Result<LogReport, ClassifyError> {
        let bytes = std::fs::read(log_path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ClassifyError::Missing(log_path.to_path_buf())
            } else {
                ClassifyError::Unreadable {
                    path: log_path.to_path_buf(),
                    source,
                }
            }
        })?;

        let text = decode_utf16le(&bytes);
        debug!(log = %log_path.display(), "Log output:\n{}", text);

        let report = self.classify_text(text);
        if report.uses_platform_libraries {
            warn!(
                "The compiled code appears to use the platform's built-in libraries; \
                 enable platform initialization if compilation fails"
            );
        }
        Ok(report)
    }

    /// Classify already-decoded log text.
    pub fn classify_text(&self, text: String) -> LogReport {
        let errors: Vec<String> = error_pattern()
            .find_iter(&text)
            .map(|m| m.as_str().to_string())
            .collect();
        let warnings: Vec<String> = warning_pattern()
            .find_iter(&text)
            .map(|m| m.as_str().to_string())
            .collect();

        let failed = !errors.is_empty() || (!warnings.is_empty() && !self.ignore_warnings);
        let verdict = if failed { Verdict::Fail } else { Verdict::Pass };

        let uses_platform_libraries = self.toolchain_dir_name.as_deref().is_some_and(|name| {
            text.contains(&format!("{name}\\MQL")) || text.contains(&format!("{name}/MQL"))
        });

        LogReport {
            text,
            errors,
            warnings,
            verdict,
            uses_platform_libraries,
        }
    }
}
