//! Fetch, materialize, compile and classify orchestration.
//!
//! A run moves through `Init -> Fetched -> Materialized -> Compiling(i)*`
//! and ends in `Cleaned` or `Failed`. Files compile one at a time because
//! MetaEditor writes every log to the same path; the first failing file
//! stops the run.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn, Instrument};

use crate::classify::{LogClassifier, LogReport};
use crate::cleanup;
use crate::config::{resolve_compile_targets, PipelineConfig};
use crate::error::{InvokeError, PipelineError, Result};
use crate::fetch::ArtifactFetcher;
use crate::invocation::{CompileTask, Invocation, INIT_CONFIG, INIT_CONFIG_FILE};
use crate::obs;
use crate::report::{CiReporter, FailureSummary};
use crate::runner::{ProcessResult, ToolRunner};
use crate::spec::{toolchain_dir_name, RunIdentity, ToolchainSpec, Workspace};
use crate::workspace::materialize;

/// Name of the run output exposing the toolchain directory.
pub const PLATFORM_FOLDER_OUTPUT: &str = "platform_folder";

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Init,
    Fetched,
    Materialized,
    Compiling { index: usize },
    Cleaned,
    Failed,
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Init => "init",
            PipelineState::Fetched => "fetched",
            PipelineState::Materialized => "materialized",
            PipelineState::Compiling { .. } => "compiling",
            PipelineState::Cleaned => "cleaned",
            PipelineState::Failed => "failed",
        }
    }
}

/// Both verdict sources for one compiled file.
#[derive(Debug, Clone, Serialize)]
pub struct FileResult {
    pub file: PathBuf,

    /// Process outcome, advisory only.
    pub process: Option<ProcessResult>,

    /// Launch error, advisory only.
    pub invoke_error: Option<String>,

    /// Classified log, authoritative.
    pub report: LogReport,
}

/// Result of a run that reached a terminal state.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub run_id: String,

    /// `Cleaned` or `Failed`.
    pub state: PipelineState,

    /// Absolute toolchain directory.
    pub toolchain_dir: PathBuf,

    /// Files compiled, in order.
    pub files: Vec<FileResult>,

    /// Present when a file failed.
    pub failure: Option<FailureSummary>,

    pub duration_ms: u64,
}

impl PipelineOutcome {
    pub fn passed(&self) -> bool {
        self.state == PipelineState::Cleaned
    }
}

/// Pipeline orchestrator for one run.
pub struct CompilePipeline {
    config: PipelineConfig,
    run_id: RunIdentity,
    fetcher: ArtifactFetcher,
    runner: Arc<dyn ToolRunner>,
    reporter: Arc<dyn CiReporter>,
}

impl CompilePipeline {
    pub fn new(
        config: PipelineConfig,
        run_id: RunIdentity,
        fetcher: ArtifactFetcher,
        runner: Arc<dyn ToolRunner>,
        reporter: Arc<dyn CiReporter>,
    ) -> Self {
        Self {
            config,
            run_id,
            fetcher,
            runner,
            reporter,
        }
    }

    /// Execute the run.
    ///
    /// Compile failures come back as an `Ok` outcome in the `Failed` state,
    /// already reported. Any other error aborts the run; it is reported as
    /// the failure status and returned.
    pub async fn run(&self) -> Result<PipelineOutcome> {
        let span = obs::run_span(self.run_id.as_str());
        async {
            let result = self.execute().await;
            if let Err(e) = &result {
                error!(error = %e, "Pipeline aborted");
                obs::emit_state(PipelineState::Failed.name());
                self.reporter.set_failed(&e.to_string()).await;
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn execute(&self) -> Result<PipelineOutcome> {
        let start = Instant::now();

        // Init
        obs::emit_state(PipelineState::Init.name());
        let toolchain = ToolchainSpec::new(
            &self.config.toolchain_version,
            &self.config.download_base_url,
        )?;
        let root = std::path::absolute(&self.config.work_dir)?;
        let workspace = Workspace::new(&root, &self.run_id, &toolchain);

        self.reporter
            .set_output(
                PLATFORM_FOLDER_OUTPUT,
                &workspace.toolchain_dir.display().to_string(),
            )
            .await;

        cleanup::remove_dir(&workspace.toolchain_dir)
            .log("stale toolchain directory", &workspace.toolchain_dir);
        cleanup::remove_file(&self.config.log_file).log("stale log file", &self.config.log_file);

        // Fetched
        info!(
            url = %toolchain.download_url,
            dest = %workspace.archive_path.display(),
            "Downloading toolchain"
        );
        self.fetcher
            .fetch(&toolchain.download_url, &workspace.archive_path)
            .await?;
        obs::emit_state(PipelineState::Fetched.name());

        // Materialized
        let toolchain_dir = {
            let archive = workspace.archive_path.clone();
            let root = root.clone();
            let run_id = self.run_id.clone();
            let major = toolchain.major_version.clone();
            run_blocking("materialize", move || {
                Ok(materialize(&archive, &root, &run_id, &major)?)
            })
            .await?
        };
        obs::emit_state(PipelineState::Materialized.name());

        if self.config.init_platform {
            self.initialize_platform(&toolchain, &toolchain_dir).await;
        }

        let files = resolve_compile_targets(&self.config.compile_path)?;
        if files.is_empty() {
            warn!(pattern = %self.config.compile_path, "No files matched the compile path");
        }
        info!(count = files.len(), "Files to compile: {:?}", files);

        let include_path = self
            .config
            .include_path
            .clone()
            .unwrap_or_else(|| toolchain_dir.join(toolchain.include_folder()));
        let classifier = LogClassifier::new(self.config.ignore_warnings)
            .with_toolchain_dir_name(toolchain_dir_name(&self.run_id));

        let mut results = Vec::new();
        let mut summary = FailureSummary::new(self.config.ignore_warnings);

        for (index, file) in files.iter().enumerate() {
            obs::emit_state(PipelineState::Compiling { index }.name());
            let task = CompileTask {
                target: file.clone(),
                include_path: include_path.clone(),
                syntax_only: self.config.syntax_only,
                log_path: self.config.log_file.clone(),
            };
            let result = self.compile_file(&toolchain, &toolchain_dir, &task, &classifier).await?;

            summary.absorb(&result.report);
            let passed = result.report.passed();
            results.push(result);

            if !passed {
                info!(file = %file.display(), "Warnings/errors occurred, failing the run");
                summary.failed_file = Some(file.clone());
                self.reporter.post_comment(&summary).await;
                self.reporter.set_failed(&summary.render_message()).await;

                return Ok(self.finish(
                    PipelineState::Failed,
                    toolchain_dir,
                    results,
                    Some(summary),
                    start,
                ));
            }
        }

        if self.config.cleanup {
            info!("Cleaning up");
            cleanup::remove_file(&workspace.archive_path)
                .log("downloaded archive", &workspace.archive_path);
            cleanup::remove_dir(&toolchain_dir).log("toolchain directory", &toolchain_dir);
            cleanup::remove_dir(&workspace.scratch_root)
                .log("extraction root", &workspace.scratch_root);
        }

        Ok(self.finish(PipelineState::Cleaned, toolchain_dir, results, None, start))
    }

    /// Start the terminal once so it performs first-run setup.
    ///
    /// Errors are logged only; first-run quirks must not fail the run.
    async fn initialize_platform(&self, toolchain: &ToolchainSpec, toolchain_dir: &Path) {
        let config_path = toolchain_dir.join(INIT_CONFIG_FILE);
        if let Err(source) = std::fs::write(&config_path, INIT_CONFIG) {
            let e = InvokeError::Config {
                path: config_path,
                source,
            };
            warn!(error = %e, "Skipping platform initialization");
            return;
        }

        let invocation = Invocation::initialize(toolchain, toolchain_dir, &config_path);
        info!(command = %invocation.command_line(), "Initializing platform");
        match self.runner.run(&invocation).await {
            Ok(process) if !process.exited_cleanly() => {
                warn!(exit_code = process.exit_code, "Platform initialization exited non-zero")
            }
            Ok(_) => debug!("Platform initialization finished"),
            Err(e) => warn!(error = %e, "Platform initialization failed"),
        }
    }

    async fn compile_file(
        &self,
        toolchain: &ToolchainSpec,
        toolchain_dir: &Path,
        task: &CompileTask,
        classifier: &LogClassifier,
    ) -> Result<FileResult> {
        // A log left by the previous file must not be read as this file's.
        cleanup::remove_file(&task.log_path).log("previous log file", &task.log_path);

        let invocation = Invocation::compile(toolchain, toolchain_dir, task);
        info!(file = %task.target.display(), "Compiling");

        let (process, invoke_error) = match self.runner.run(&invocation).await {
            Ok(process) => {
                if !process.exited_cleanly() {
                    debug!(
                        exit_code = process.exit_code,
                        "Compiler exited non-zero; the log decides"
                    );
                }
                (Some(process), None)
            }
            Err(e) => {
                warn!(error = %e, "Compiler invocation failed; the log decides");
                (None, Some(e.to_string()))
            }
        };

        let report = {
            let classifier = classifier.clone();
            let log_path = task.log_path.clone();
            run_blocking("classify", move || Ok(classifier.classify(&log_path)?)).await?
        };
        obs::emit_file_classified(&task.target, &report);

        Ok(FileResult {
            file: task.target.clone(),
            process,
            invoke_error,
            report,
        })
    }

    fn finish(
        &self,
        state: PipelineState,
        toolchain_dir: PathBuf,
        files: Vec<FileResult>,
        failure: Option<FailureSummary>,
        start: Instant,
    ) -> PipelineOutcome {
        let duration_ms = start.elapsed().as_millis() as u64;
        obs::emit_run_finished(state.name(), files.len(), duration_ms);

        PipelineOutcome {
            run_id: self.run_id.to_string(),
            state,
            toolchain_dir,
            files,
            failure,
            duration_ms,
        }
    }
}

/// Run filesystem-heavy work off the async runtime, inside the caller's span.
async fn run_blocking<T, F>(task: &'static str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let span = tracing::Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(f))
        .await
        .map_err(|e| PipelineError::Fatal(format!("{task} task did not complete: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Verdict;

    fn report(verdict: Verdict) -> LogReport {
        LogReport {
            text: String::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            verdict,
            uses_platform_libraries: false,
        }
    }

    #[tokio::test]
    async fn test_run_blocking_returns_value() {
        let value = run_blocking("sum", || Ok(2 + 2)).await.unwrap();
        assert_eq!(value, 4);
    }

    #[tokio::test]
    async fn test_run_blocking_panic_is_fatal() {
        let err = run_blocking::<(), _>("extract", || panic!("zip reader crashed"))
            .await
            .unwrap_err();

        match err {
            PipelineError::Fatal(message) => assert!(message.starts_with("extract task")),
            other => panic!("expected Fatal, got {other:?}"),
        }
    }

    #[test]
    fn test_state_names() {
        assert_eq!(PipelineState::Init.name(), "init");
        assert_eq!(PipelineState::Compiling { index: 3 }.name(), "compiling");
        assert_eq!(PipelineState::Cleaned.name(), "cleaned");
        assert_eq!(PipelineState::Failed.name(), "failed");
    }

    #[test]
    fn test_outcome_passed_only_when_cleaned() {
        let mut outcome = PipelineOutcome {
            run_id: "run123".to_string(),
            state: PipelineState::Cleaned,
            toolchain_dir: PathBuf::from("/work/MetaTrader_run123"),
            files: vec![FileResult {
                file: PathBuf::from("a.mq5"),
                process: None,
                invoke_error: Some("failed to launch 'wine'".to_string()),
                report: report(Verdict::Pass),
            }],
            failure: None,
            duration_ms: 300,
        };
        assert!(outcome.passed());

        outcome.state = PipelineState::Failed;
        assert!(!outcome.passed());
    }

    #[test]
    fn test_outcome_serializes_state() {
        let outcome = PipelineOutcome {
            run_id: "run123".to_string(),
            state: PipelineState::Failed,
            toolchain_dir: PathBuf::from("/work/MetaTrader_run123"),
            files: Vec::new(),
            failure: Some(FailureSummary::new(false)),
            duration_ms: 1,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["run_id"], "run123");
    }
}
