//! Toolchain process execution.
//!
//! The exit status reported here is advisory: MetaEditor is known to return
//! inconsistent codes, so callers decide pass/fail from the compile log.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::debug;

use crate::error::InvokeError;
use crate::invocation::{Invocation, InvocationArg};

/// Default compatibility layer for running Windows binaries elsewhere.
pub const DEFAULT_WRAPPER: &str = "wine";

/// Host the toolchain runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionEnvironment {
    /// Native Windows host.
    Windows,

    /// Windows Subsystem for Linux; Windows binaries run through interop.
    Wsl,

    /// Any other host; binaries run through the wrapper.
    Posix,
}

impl ExecutionEnvironment {
    /// Detect the current host.
    pub fn detect() -> Self {
        if cfg!(windows) {
            ExecutionEnvironment::Windows
        } else if is_wsl() {
            ExecutionEnvironment::Wsl
        } else {
            ExecutionEnvironment::Posix
        }
    }

    /// Whether Windows binaries can be started directly.
    pub fn runs_natively(&self) -> bool {
        matches!(self, ExecutionEnvironment::Windows | ExecutionEnvironment::Wsl)
    }
}

fn is_wsl() -> bool {
    if !cfg!(target_os = "linux") {
        return false;
    }
    if std::env::var_os("WSL_DISTRO_NAME").is_some() {
        return true;
    }
    ["/proc/sys/kernel/osrelease", "/proc/version"]
        .iter()
        .filter_map(|p| std::fs::read_to_string(p).ok())
        .any(|s| s.to_ascii_lowercase().contains("microsoft"))
}

/// Result of one toolchain process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResult {
    /// Exit code (-1 when terminated by a signal).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether the process reported success.
    pub success: bool,
}

impl ProcessResult {
    /// Whether the process exited with code 0.
    pub fn exited_cleanly(&self) -> bool {
        self.success && self.exit_code == 0
    }
}

/// Something that can execute a toolchain [`Invocation`].
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessResult, InvokeError>;
}

/// Runs invocations as real child processes.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    environment: ExecutionEnvironment,
    wrapper: String,
}

impl ProcessRunner {
    pub fn new(environment: ExecutionEnvironment, wrapper: impl Into<String>) -> Self {
        Self {
            environment,
            wrapper: wrapper.into(),
        }
    }

    /// Runner for the detected host using the default wrapper.
    pub fn detect() -> Self {
        Self::new(ExecutionEnvironment::detect(), DEFAULT_WRAPPER)
    }

    pub fn environment(&self) -> ExecutionEnvironment {
        self.environment
    }

    fn command(&self, invocation: &Invocation) -> Command {
        if self.environment.runs_natively() {
            let mut cmd = Command::new(&invocation.executable);
            #[cfg(windows)]
            for arg in &invocation.args {
                cmd.raw_arg(arg.quoted());
            }
            #[cfg(not(windows))]
            cmd.args(invocation.args.iter().map(InvocationArg::plain));
            cmd
        } else {
            let mut cmd = Command::new(&self.wrapper);
            cmd.arg(&invocation.executable)
                .args(invocation.args.iter().map(InvocationArg::plain));
            cmd
        }
    }

    fn program(&self, invocation: &Invocation) -> String {
        if self.environment.runs_natively() {
            invocation.executable.display().to_string()
        } else {
            self.wrapper.clone()
        }
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessResult, InvokeError> {
        let start = Instant::now();

        if self.environment.runs_natively() {
            debug!(task = %invocation.label(), command = %invocation.command_line(), "Executing");
        } else {
            debug!(
                task = %invocation.label(),
                command = %format!("{} {}", self.wrapper, invocation.command_line()),
                "Executing"
            );
        }

        let output = self
            .command(invocation)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| InvokeError::Spawn {
                program: self.program(invocation),
                source,
            })?;

        Ok(ProcessResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
            success: output.status.success(),
        })
    }
}
