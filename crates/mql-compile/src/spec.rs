//! Run identity, toolchain specification and workspace layout.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::ConfigError;

/// Default host the toolchain archives are published on.
pub const DEFAULT_DOWNLOAD_BASE_URL: &str =
    "https://github.com/EA31337/MT-Platforms/releases/download";

/// Product name used for the archive's root folder.
pub const PRODUCT_NAME: &str = "MetaTrader";

/// Run-scoped random token namespacing every filesystem artifact of one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunIdentity(String);

impl RunIdentity {
    /// Generate a fresh 128-bit identity.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Use a caller-provided token (tests, reruns).
    pub fn from_token(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Versioned toolchain to download and compile against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolchainSpec {
    /// Leading component of the version, e.g. "5".
    pub major_version: String,

    /// Full version string, e.g. "5.0.0.2361".
    pub version: String,

    /// Archive download URL.
    pub download_url: String,
}

impl ToolchainSpec {
    /// Derive the toolchain from a version string and the archive host.
    pub fn new(version: &str, base_url: &str) -> Result<Self, ConfigError> {
        let version = version.trim();
        let major = version.split('.').next().unwrap_or_default();
        if major.is_empty() || !major.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::InvalidVersion(version.to_string()));
        }

        Ok(Self {
            major_version: major.to_string(),
            version: version.to_string(),
            download_url: format!(
                "{}/{version}/mt-{version}.zip",
                base_url.trim_end_matches('/')
            ),
        })
    }

    fn is_64bit(&self) -> bool {
        self.major_version == "5"
    }

    /// Top-level folder expected inside the archive.
    pub fn product_folder(&self) -> String {
        format!("{} {}", PRODUCT_NAME, self.major_version)
    }

    /// Terminal binary used for first-run initialization.
    pub fn terminal_exe(&self) -> &'static str {
        if self.is_64bit() {
            "terminal64.exe"
        } else {
            "terminal.exe"
        }
    }

    /// Headless editor binary used to compile sources.
    pub fn metaeditor_exe(&self) -> &'static str {
        if self.is_64bit() {
            "metaeditor64.exe"
        } else {
            "metaeditor.exe"
        }
    }

    /// Include directory inside the toolchain, e.g. `MQL5`.
    pub fn include_folder(&self) -> String {
        format!("MQL{}", self.major_version)
    }
}

/// Filesystem layout owned by one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Workspace {
    /// Downloaded archive.
    pub archive_path: PathBuf,

    /// Root of all extraction scratch directories.
    pub scratch_root: PathBuf,

    /// Extraction directory for this run.
    pub scratch_path: PathBuf,

    /// Final toolchain directory.
    pub toolchain_dir: PathBuf,
}

impl Workspace {
    /// Derive all paths under `root` from the run identity and toolchain.
    pub fn new(root: &Path, run_id: &RunIdentity, toolchain: &ToolchainSpec) -> Self {
        Self {
            archive_path: root.join(format!(
                "metaeditor{}_{}.zip",
                toolchain.major_version, run_id
            )),
            scratch_root: root.join(SCRATCH_DIR),
            scratch_path: scratch_dir(root, run_id),
            toolchain_dir: toolchain_dir(root, run_id),
        }
    }
}

const SCRATCH_DIR: &str = "unpacked";

/// Name of the final toolchain directory for a run.
pub fn toolchain_dir_name(run_id: &RunIdentity) -> String {
    format!("{}_{}", PRODUCT_NAME, run_id)
}

/// Final toolchain directory for a run under `root`.
pub fn toolchain_dir(root: &Path, run_id: &RunIdentity) -> PathBuf {
    root.join(toolchain_dir_name(run_id))
}

/// Extraction scratch directory for a run under `root`.
pub fn scratch_dir(root: &Path, run_id: &RunIdentity) -> PathBuf {
    root.join(SCRATCH_DIR).join(run_id.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_identity_is_128_bit_hex() {
        let id = RunIdentity::generate();
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_run_identities_differ() {
        assert_ne!(RunIdentity::generate(), RunIdentity::generate());
    }

    #[test]
    fn test_toolchain_spec_mt5() {
        let spec = ToolchainSpec::new("5.0.0.2361", DEFAULT_DOWNLOAD_BASE_URL).unwrap();
        assert_eq!(spec.major_version, "5");
        assert_eq!(
            spec.download_url,
            "https://github.com/EA31337/MT-Platforms/releases/download/5.0.0.2361/mt-5.0.0.2361.zip"
        );
        assert_eq!(spec.product_folder(), "MetaTrader 5");
        assert_eq!(spec.terminal_exe(), "terminal64.exe");
        assert_eq!(spec.metaeditor_exe(), "metaeditor64.exe");
        assert_eq!(spec.include_folder(), "MQL5");
    }

    #[test]
    fn test_toolchain_spec_mt4() {
        let spec = ToolchainSpec::new("4.0.0.1349", "http://mirror.local/").unwrap();
        assert_eq!(spec.major_version, "4");
        assert_eq!(
            spec.download_url,
            "http://mirror.local/4.0.0.1349/mt-4.0.0.1349.zip"
        );
        assert_eq!(spec.terminal_exe(), "terminal.exe");
        assert_eq!(spec.metaeditor_exe(), "metaeditor.exe");
    }

    #[test]
    fn test_toolchain_spec_rejects_bad_version() {
        assert!(ToolchainSpec::new("", DEFAULT_DOWNLOAD_BASE_URL).is_err());
        assert!(ToolchainSpec::new("v5.0", DEFAULT_DOWNLOAD_BASE_URL).is_err());
    }

    #[test]
    fn test_workspace_paths_are_namespaced() {
        let id = RunIdentity::from_token("abc123");
        let spec = ToolchainSpec::new("5.0.0.2361", DEFAULT_DOWNLOAD_BASE_URL).unwrap();
        let ws = Workspace::new(Path::new("/work"), &id, &spec);

        assert_eq!(ws.archive_path, PathBuf::from("/work/metaeditor5_abc123.zip"));
        assert_eq!(ws.scratch_root, PathBuf::from("/work/unpacked"));
        assert_eq!(ws.scratch_path, PathBuf::from("/work/unpacked/abc123"));
        assert_eq!(ws.toolchain_dir, PathBuf::from("/work/MetaTrader_abc123"));
    }
}
