use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use crate::constants::store::{RECORD_FILE_EXTENSION, SKIP_UNREADABLE_MSG, TEMP_FILE_EXTENSION};
use crate::errors::TriageError;

/// Sorted list of record files directly under `root` (no recursion).
///
/// Symlinks are followed. Unreadable directory entries (dangling links
/// included) are logged and skipped; a missing or unreadable root is an error.
pub fn list_record_files(root: &Path) -> Result<Vec<PathBuf>, TriageError> {
    if !root.is_dir() {
        return Err(TriageError::Configuration(format!(
            "record directory '{}' does not exist",
            root.display()
        )));
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                return Err(TriageError::Configuration(format!(
                    "record directory '{}' is unreadable: {err}",
                    root.display()
                )));
            }
            Err(err) => {
                let path = err.path().unwrap_or(root).display().to_string();
                warn!(path = %path, error = %err, SKIP_UNREADABLE_MSG);
                continue;
            }
        };
        if entry.file_type().is_file() && is_record_file(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// True if the path has the record extension (case-insensitive).
pub fn is_record_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(RECORD_FILE_EXTENSION))
        .unwrap_or(false)
}

/// Write `bytes` to `target` through a sibling `.part` file and rename.
///
/// Readers never observe a half-written target.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> Result<(), TriageError> {
    let unwritable = |err: std::io::Error| TriageError::StoreUnwritable {
        path: target.display().to_string(),
        reason: err.to_string(),
    };
    let temp_target = temp_path_for(target);
    let mut file = fs::File::create(&temp_target).map_err(unwritable)?;
    file.write_all(bytes).map_err(unwritable)?;
    file.sync_all().map_err(unwritable)?;
    drop(file);
    fs::rename(&temp_target, target).map_err(|err| {
        let _ = fs::remove_file(&temp_target);
        unwritable(err)
    })
}

/// Create `dir` (and parents) or report it as unwritable.
pub fn ensure_dir(dir: &Path) -> Result<(), TriageError> {
    fs::create_dir_all(dir).map_err(|err| TriageError::StoreUnwritable {
        path: dir.display().to_string(),
        reason: err.to_string(),
    })
}

fn temp_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(TEMP_FILE_EXTENSION);
    target.with_file_name(name)
}
