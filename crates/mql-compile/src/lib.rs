//! MQL Compile - MetaTrader toolchain compile checks for CI
//!
//! Provides a pipeline that:
//! - Downloads a versioned MetaTrader toolchain archive
//! - Extracts it into a run-scoped toolchain directory
//! - Compiles MQL sources one at a time with MetaEditor
//! - Classifies each UTF-16LE compile log and fails fast on errors/warnings

pub mod classify;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod fetch;
pub mod invocation;
pub mod obs;
pub mod pipeline;
pub mod report;
pub mod runner;
pub mod spec;
pub mod telemetry;
pub mod workspace;

// Re-export key types
pub use classify::{decode_utf16le, LogClassifier, LogReport, Verdict};
pub use cleanup::Cleanup;
pub use config::{resolve_compile_targets, PipelineConfig, DEFAULT_LOG_FILE};
pub use error::{
    ClassifyError, ConfigError, FetchError, InvokeError, MaterializeError, PipelineError, Result,
};
pub use fetch::{ArtifactFetcher, FetchOutcome};
pub use invocation::{CompileTask, Invocation, InvocationArg, InvocationKind};
pub use pipeline::{CompilePipeline, FileResult, PipelineOutcome, PipelineState};
pub use report::{CiReporter, FailureSummary};
pub use runner::{ExecutionEnvironment, ProcessResult, ProcessRunner, ToolRunner};
pub use spec::{RunIdentity, ToolchainSpec, Workspace};
pub use telemetry::init_tracing;
pub use workspace::materialize;
