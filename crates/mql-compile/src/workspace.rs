//! Archive extraction and relocation into the run's toolchain directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::ZipArchive;

use crate::cleanup;
use crate::error::MaterializeError;
use crate::spec::{self, RunIdentity, PRODUCT_NAME};

/// Extract `archive_path` and copy its `"MetaTrader <major>"` folder into the
/// run's toolchain directory under `root`. Returns the toolchain directory.
pub fn materialize(
    archive_path: &Path,
    root: &Path,
    run_id: &RunIdentity,
    major_version: &str,
) -> Result<PathBuf, MaterializeError> {
    let scratch = spec::scratch_dir(root, run_id);
    let target = spec::toolchain_dir(root, run_id);
    let product_folder = format!("{} {}", PRODUCT_NAME, major_version);

    info!(archive = %archive_path.display(), scratch = %scratch.display(), "Unzipping");
    extract_archive(archive_path, &scratch)?;

    let source = scratch.join(&product_folder);
    if !source.is_dir() {
        let found = list_entries(&scratch);
        cleanup::remove_dir(&scratch).log("extraction scratch", &scratch);
        return Err(MaterializeError::MissingProductFolder {
            expected: product_folder,
            found,
        });
    }

    cleanup::remove_dir(&target).log("stale toolchain directory", &target);

    info!(from = %source.display(), to = %target.display(), "Relocating toolchain folder");
    copy_dir_all(&source, &target).map_err(|e| MaterializeError::Copy {
        from: source.clone(),
        to: target.clone(),
        source: e,
    })?;

    cleanup::remove_dir(&scratch).log("extraction scratch", &scratch);
    Ok(target)
}

fn extract_archive(archive_path: &Path, dest: &Path) -> Result<(), MaterializeError> {
    let archive_error = |reason: String| MaterializeError::Archive {
        path: archive_path.to_path_buf(),
        reason,
    };

    let file = fs::File::open(archive_path).map_err(|e| archive_error(e.to_string()))?;
    let mut zip = ZipArchive::new(file).map_err(|e| archive_error(e.to_string()))?;
    fs::create_dir_all(dest).map_err(|e| archive_error(e.to_string()))?;

    debug!(entries = zip.len(), "Extracting archive");
    zip.extract(dest).map_err(|e| archive_error(e.to_string()))
}

fn list_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// Recursively copy the contents of `from` into `to`.
fn copy_dir_all(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let path = entry.path();
        let dest = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&path, &dest)?;
        } else {
            fs::copy(&path, &dest)?;
        }
    }
    Ok(())
}
