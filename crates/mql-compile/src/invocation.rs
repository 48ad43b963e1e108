//! Toolchain command lines.
//!
//! MetaEditor and the terminal take Windows-style `/flag:value` arguments.
//! Path values are quoted in the rendered command line so embedded spaces
//! survive; when the command goes through a wrapper the same arguments are
//! handed over as plain argv entries instead.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::spec::ToolchainSpec;

/// Contents of the config that makes the terminal exit after first-run setup.
pub const INIT_CONFIG: &str = "[Tester]\r\nShutdownTerminal=1\r\n";

/// File name of the initialization config inside the toolchain directory.
pub const INIT_CONFIG_FILE: &str = "tester.ini";

/// One command-line argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvocationArg {
    /// Bare switch, e.g. `/portable`.
    Switch(String),

    /// Switch with a path value, e.g. `/compile:"Experts/My EA.mq5"`.
    Path { switch: String, path: PathBuf },
}

impl InvocationArg {
    fn switch(name: &str) -> Self {
        InvocationArg::Switch(name.to_string())
    }

    fn path(switch: &str, path: &Path) -> Self {
        InvocationArg::Path {
            switch: switch.to_string(),
            path: path.to_path_buf(),
        }
    }

    /// Rendered with the path quoted.
    pub fn quoted(&self) -> String {
        match self {
            InvocationArg::Switch(s) => s.clone(),
            InvocationArg::Path { switch, path } => format!("{}:\"{}\"", switch, path.display()),
        }
    }

    /// Rendered as a single argv entry, without quotes.
    pub fn plain(&self) -> String {
        match self {
            InvocationArg::Switch(s) => s.clone(),
            InvocationArg::Path { switch, path } => format!("{}:{}", switch, path.display()),
        }
    }
}

/// What an invocation is for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationKind {
    /// One-time terminal start that performs first-run setup.
    Initialize,

    /// Compile of a single source file.
    Compile { target: PathBuf, log_path: PathBuf },
}

/// Per-file compile options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileTask {
    /// Source file to compile.
    pub target: PathBuf,

    /// Include directory handed to MetaEditor.
    pub include_path: PathBuf,

    /// Check syntax only, skip code generation.
    pub syntax_only: bool,

    /// Where MetaEditor writes its log.
    pub log_path: PathBuf,
}

/// A fully built toolchain command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub kind: InvocationKind,

    /// Toolchain executable.
    pub executable: PathBuf,

    pub args: Vec<InvocationArg>,
}

impl Invocation {
    /// Terminal start loading `config_path`.
    pub fn initialize(toolchain: &ToolchainSpec, toolchain_dir: &Path, config_path: &Path) -> Self {
        Self {
            kind: InvocationKind::Initialize,
            executable: toolchain_dir.join(toolchain.terminal_exe()),
            args: vec![
                InvocationArg::switch("/portable"),
                InvocationArg::path("/config", config_path),
            ],
        }
    }

    /// MetaEditor compile of one file.
    pub fn compile(toolchain: &ToolchainSpec, toolchain_dir: &Path, task: &CompileTask) -> Self {
        let mut args = vec![
            InvocationArg::switch("/portable"),
            InvocationArg::path("/inc", &task.include_path),
            InvocationArg::path("/compile", &task.target),
            InvocationArg::path("/log", &task.log_path),
        ];
        if task.syntax_only {
            args.push(InvocationArg::switch("/s"));
        }

        Self {
            kind: InvocationKind::Compile {
                target: task.target.clone(),
                log_path: task.log_path.clone(),
            },
            executable: toolchain_dir.join(toolchain.metaeditor_exe()),
            args,
        }
    }

    /// Quoted, human-readable command line.
    pub fn command_line(&self) -> String {
        let mut line = format!("\"{}\"", self.executable.display());
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.quoted());
        }
        line
    }

    /// Short label for logs.
    pub fn label(&self) -> String {
        match &self.kind {
            InvocationKind::Initialize => "initialize".to_string(),
            InvocationKind::Compile { target, .. } => format!("compile {}", target.display()),
        }
    }
}
