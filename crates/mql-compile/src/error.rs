//! Error taxonomy for the compile pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while retrieving the toolchain archive.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Server answered with a status that is neither 2xx nor a redirect.
    #[error("download failed: {status} {reason}")]
    Status { status: u16, reason: String },

    /// Redirect chain exceeded the hop limit.
    #[error("too many redirects (limit {limit}) while fetching {uri}")]
    TooManyRedirects { uri: String, limit: usize },

    /// Request URL or `Location` header could not be parsed.
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Body ended before the advertised length was received.
    #[error("download truncated: expected {expected} bytes, received {received}")]
    Truncated { expected: u64, received: u64 },

    /// Request, connection or body stream error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Writing the destination file failed.
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while unpacking the archive into the workspace.
#[derive(Error, Debug)]
pub enum MaterializeError {
    /// Archive could not be opened or extracted.
    #[error("cannot extract archive {path}: {reason}")]
    Archive { path: PathBuf, reason: String },

    /// Extracted contents lack the expected product folder.
    #[error("expected folder '{expected}' not found in archive (found: {found:?})")]
    MissingProductFolder { expected: String, found: Vec<String> },

    /// Copying the product folder into the toolchain directory failed.
    #[error("cannot copy {from} into {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while launching the toolchain. Advisory only.
#[derive(Error, Debug)]
pub enum InvokeError {
    /// Process could not be started.
    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Writing the initialization config failed.
    #[error("failed to write {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while reading the compile log.
#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("compile log not found at {0}")]
    Missing(PathBuf),

    #[error("cannot read compile log {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Invalid pipeline configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid toolchain version '{0}': expected a leading numeric major version")]
    InvalidVersion(String),

    #[error("invalid compile path pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("compile path must not be empty")]
    EmptyPath,
}

/// Any failure that aborts a pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Fatal(String),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
