//! MQL Compile - MetaTrader compile checks for CI
//!
//! The `mql-compile` command downloads a MetaTrader toolchain, compiles the
//! given MQL sources with MetaEditor and fails the job on compiler errors
//! (and warnings, unless ignored).
//!
//! Every option can also be given through the `INPUT_*` environment
//! variables a GitHub Actions runner sets for action inputs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{ArgAction, Parser};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

use mql_compile::runner::DEFAULT_WRAPPER;
use mql_compile::spec::DEFAULT_DOWNLOAD_BASE_URL;
use mql_compile::{
    init_tracing, ArtifactFetcher, CiReporter, CompilePipeline, ExecutionEnvironment,
    FailureSummary, PipelineConfig, ProcessRunner, RunIdentity, DEFAULT_LOG_FILE,
};

const DEFAULT_TOOLCHAIN_VERSION: &str = "5.0.0.2361";

#[derive(Parser, Debug)]
#[command(name = "mql-compile")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compile MQL sources against a downloaded MetaTrader toolchain", long_about = None)]
struct Cli {
    /// Source file or glob pattern to compile
    #[arg(long, env = "INPUT_PATH")]
    path: String,

    /// Check syntax only
    #[arg(
        long,
        env = "INPUT_SYNTAX-ONLY",
        value_parser = parse_action_bool,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true"
    )]
    syntax_only: bool,

    /// Do not fail on compiler warnings
    #[arg(
        long,
        env = "INPUT_IGNORE-WARNINGS",
        value_parser = parse_action_bool,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true"
    )]
    ignore_warnings: bool,

    /// Include directory (default: <toolchain>/MQL<major>)
    #[arg(long, env = "INPUT_INCLUDE")]
    include: Option<String>,

    /// Path MetaEditor writes its log to
    #[arg(long, env = "INPUT_LOG-FILE", default_value = DEFAULT_LOG_FILE)]
    log_file: PathBuf,

    /// Remove the downloaded toolchain after a passing run
    #[arg(
        long,
        env = "INPUT_MT-CLEANUP",
        value_parser = parse_action_bool,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true"
    )]
    mt_cleanup: bool,

    /// MetaTrader toolchain version
    #[arg(long, env = "INPUT_MT-VERSION", default_value = DEFAULT_TOOLCHAIN_VERSION)]
    mt_version: String,

    /// Enable verbose output
    #[arg(
        short,
        long,
        env = "INPUT_VERBOSE",
        value_parser = parse_action_bool,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true"
    )]
    verbose: bool,

    /// Start the terminal once before compiling
    #[arg(
        long,
        env = "INPUT_INIT-PLATFORM",
        value_parser = parse_action_bool,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true"
    )]
    init_platform: bool,

    /// Directory for the archive, scratch and toolchain folders
    #[arg(long, default_value = ".")]
    work_dir: PathBuf,

    /// Base URL the toolchain archives are downloaded from
    #[arg(long, default_value = DEFAULT_DOWNLOAD_BASE_URL)]
    download_base_url: String,

    /// Compatibility layer used to run Windows binaries on POSIX hosts
    #[arg(long, env = "MQL_COMPILE_WINE", default_value = DEFAULT_WRAPPER)]
    wine: String,

    /// Write the failure comment payload to this file as JSON
    #[arg(long)]
    report_json: Option<PathBuf>,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::new(&self.path, &self.mt_version);
        config.syntax_only = self.syntax_only;
        config.ignore_warnings = self.ignore_warnings;
        config.include_path = self
            .include
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        config.log_file = self.log_file.clone();
        config.cleanup = self.mt_cleanup;
        config.init_platform = self.init_platform;
        config.work_dir = self.work_dir.clone();
        config.download_base_url = self.download_base_url.clone();
        config
    }
}

/// Action inputs are true only when they read "true", in any case.
fn parse_action_bool(value: &str) -> Result<bool, String> {
    Ok(value.trim().eq_ignore_ascii_case("true"))
}

/// Escape a workflow command message.
fn escape_command_data(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Reports through GitHub Actions workflow commands and files.
struct ActionsReporter {
    github_output: Option<PathBuf>,
    report_json: Option<PathBuf>,
}

impl ActionsReporter {
    fn from_env(report_json: Option<PathBuf>) -> Self {
        Self {
            github_output: std::env::var_os("GITHUB_OUTPUT")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            report_json,
        }
    }

    async fn append_output(path: &Path, name: &str, value: &str) -> std::io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(format!("{name}={value}\n").as_bytes()).await?;
        file.flush().await
    }

    async fn write_report(path: &Path, summary: &FailureSummary) -> Result<()> {
        let json = serde_json::to_string_pretty(summary)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write report to {}", path.display()))
    }
}

#[async_trait]
impl CiReporter for ActionsReporter {
    async fn set_output(&self, name: &str, value: &str) {
        if let Some(path) = &self.github_output {
            match Self::append_output(path, name, value).await {
                Ok(()) => return,
                Err(e) => warn!(error = %e, "Cannot write to GITHUB_OUTPUT, using workflow command"),
            }
        }
        println!("::set-output name={}::{}", name, escape_command_data(value));
    }

    async fn post_comment(&self, summary: &FailureSummary) {
        println!("{}", summary.render_markdown());

        if let Some(path) = &self.report_json {
            match Self::write_report(path, summary).await {
                Ok(()) => info!(path = %path.display(), "Failure report written"),
                Err(e) => warn!(error = %e, "Cannot write failure report"),
            }
        }
    }

    async fn set_failed(&self, message: &str) {
        println!("::error::{}", escape_command_data(message));
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    init_tracing(cli.json, cli.verbose);

    let run_id = RunIdentity::generate();
    let runner = ProcessRunner::new(ExecutionEnvironment::detect(), cli.wine.clone());
    info!(run_id = %run_id, environment = ?runner.environment(), "Starting compile run");

    let fetcher = ArtifactFetcher::new().context("Failed to create HTTP client")?;
    let runner = Arc::new(runner);
    let reporter = Arc::new(ActionsReporter::from_env(cli.report_json.clone()));

    let pipeline = CompilePipeline::new(cli.pipeline_config(), run_id, fetcher, runner, reporter);

    match pipeline.run().await {
        Ok(outcome) if outcome.passed() => {
            info!(files = outcome.files.len(), duration_ms = outcome.duration_ms, "Compilation passed");
            Ok(ExitCode::SUCCESS)
        }
        Ok(outcome) => {
            error!(files = outcome.files.len(), "Compilation failed");
            Ok(ExitCode::FAILURE)
        }
        // Already reported as the job's failure status.
        Err(_) => Ok(ExitCode::FAILURE),
    }
}
