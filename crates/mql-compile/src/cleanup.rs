//! Best-effort filesystem hygiene.
//!
//! Removal of stale directories, old logs and finished artifacts must never
//! replace the real verdict of a run. These helpers return a [`Cleanup`]
//! value instead of an error; callers may log it or drop it.

use std::io;
use std::path::Path;

use tracing::debug;

/// Outcome of a best-effort removal.
#[derive(Debug)]
pub enum Cleanup {
    /// Target existed and was removed.
    Removed,

    /// Nothing to remove.
    Absent,

    /// Removal failed; the error is informational only.
    Failed(io::Error),
}

impl Cleanup {
    fn from_result(result: io::Result<()>) -> Self {
        match result {
            Ok(()) => Cleanup::Removed,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Cleanup::Absent,
            Err(e) => Cleanup::Failed(e),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Cleanup::Failed(_))
    }

    /// Log the outcome at debug level and discard it.
    pub fn log(self, what: &str, path: &Path) {
        match self {
            Cleanup::Removed => debug!(path = %path.display(), "Removed {}", what),
            Cleanup::Absent => {}
            Cleanup::Failed(e) => {
                debug!(path = %path.display(), error = %e, "Could not remove {}", what)
            }
        }
    }
}

/// Recursively remove a directory.
pub fn remove_dir(path: &Path) -> Cleanup {
    Cleanup::from_result(std::fs::remove_dir_all(path))
}

/// Remove a single file.
pub fn remove_file(path: &Path) -> Cleanup {
    Cleanup::from_result(std::fs::remove_file(path))
}
