//! Pipeline configuration and compile-target resolution.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

use crate::error::ConfigError;
use crate::spec::DEFAULT_DOWNLOAD_BASE_URL;

/// Default MetaEditor log path.
pub const DEFAULT_LOG_FILE: &str = "MetaEditor.log";

/// Everything a pipeline run needs to know.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Source file path or glob pattern (`*` triggers expansion).
    pub compile_path: String,

    /// Pass the syntax-check-only switch.
    pub syntax_only: bool,

    /// Warnings do not fail the run.
    pub ignore_warnings: bool,

    /// Include directory; defaults to `<toolchain>/MQL<major>`.
    pub include_path: Option<PathBuf>,

    /// Where MetaEditor writes its log.
    pub log_file: PathBuf,

    /// Remove downloaded and extracted artifacts after a passing run.
    pub cleanup: bool,

    /// Toolchain version, e.g. "5.0.0.2361".
    pub toolchain_version: String,

    /// Run the one-time terminal initialization before compiling.
    pub init_platform: bool,

    /// Root for the archive, scratch and toolchain directories.
    pub work_dir: PathBuf,

    /// Host the toolchain archives are downloaded from.
    pub download_base_url: String,
}

impl PipelineConfig {
    /// Configuration with defaults for everything but the target and version.
    pub fn new(compile_path: impl Into<String>, toolchain_version: impl Into<String>) -> Self {
        Self {
            compile_path: compile_path.into(),
            syntax_only: false,
            ignore_warnings: false,
            include_path: None,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            cleanup: false,
            toolchain_version: toolchain_version.into(),
            init_platform: false,
            work_dir: PathBuf::from("."),
            download_base_url: DEFAULT_DOWNLOAD_BASE_URL.to_string(),
        }
    }
}

/// Expand the compile path into an ordered list of files.
///
/// Patterns containing `*` are globbed (glob order); anything else is a
/// single literal path whose existence is left for the compiler to judge.
pub fn resolve_compile_targets(pattern: &str) -> Result<Vec<PathBuf>, ConfigError> {
    if pattern.trim().is_empty() {
        return Err(ConfigError::EmptyPath);
    }

    if !pattern.contains('*') {
        return Ok(vec![PathBuf::from(pattern)]);
    }

    let entries = glob::glob(pattern).map_err(|e| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) => files.push(path),
            Err(e) => warn!(error = %e, "Skipping unreadable path while expanding pattern"),
        }
    }
    Ok(files)
}
