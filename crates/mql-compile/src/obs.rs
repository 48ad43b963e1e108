//! Structured lifecycle events for a pipeline run.
//!
//! Every event carries an `event` field so log pipelines can filter on it.

use std::path::Path;

use tracing::info;

use crate::classify::LogReport;

/// Span tagging all events of a run with its `run_id`.
///
/// Attach it to the run's future with [`tracing::Instrument::instrument`].
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("mql_compile.run", run_id = %run_id)
}

/// Pipeline moved to a new state.
pub fn emit_state(state: &str) {
    info!(event = "pipeline.state", state = %state);
}

/// A file's log was classified.
pub fn emit_file_classified(file: &Path, report: &LogReport) {
    info!(
        event = "file.classified",
        file = %file.display(),
        verdict = ?report.verdict,
        errors = report.errors.len(),
        warnings = report.warnings.len(),
    );
}

/// Run reached a terminal state.
pub fn emit_run_finished(state: &str, files: usize, duration_ms: u64) {
    info!(
        event = "run.finished",
        state = %state,
        files = files,
        duration_ms = duration_ms,
    );
}
