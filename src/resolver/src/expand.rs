//! Expansion of dependency paths into concrete files.
//!
//! Directories are walked recursively and wildcard sources (`COPY *.go /src/`)
//! are matched against the filesystem.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use dfdeps_core::error::{DepsError, Result};

use crate::fs::{clean_path, FileKind, Filesystem};

/// Expand `paths` (absolute, or relative to `workspace`) into the set of
/// files they cover.
pub fn expand_paths<'a>(
    fs: &dyn Filesystem,
    workspace: &Path,
    paths: impl IntoIterator<Item = &'a PathBuf>,
) -> Result<BTreeSet<PathBuf>> {
    let mut files = BTreeSet::new();

    for path in paths {
        let path = clean_path(&workspace.join(path));
        match fs.metadata(&path) {
            Ok(kind) => collect(fs, &path, kind, &mut files)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                expand_pattern(fs, &path, &mut files)?;
            }
            Err(e) => {
                return Err(DepsError::PathExpansion(format!(
                    "Failed to stat {}: {}",
                    path.display(),
                    e
                )))
            }
        }
    }

    Ok(files)
}

fn expand_pattern(fs: &dyn Filesystem, pattern: &Path, files: &mut BTreeSet<PathBuf>) -> Result<()> {
    let matches = fs.glob(&pattern.to_string_lossy()).map_err(|e| {
        DepsError::PathExpansion(format!(
            "Invalid file pattern {}: {}",
            pattern.display(),
            e
        ))
    })?;

    if matches.is_empty() {
        return Err(DepsError::PathExpansion(format!(
            "File pattern must match at least one file: {}",
            pattern.display()
        )));
    }

    for path in matches {
        let kind = fs.metadata(&path).map_err(|e| {
            DepsError::PathExpansion(format!("Failed to stat {}: {}", path.display(), e))
        })?;
        collect(fs, &path, kind, files)?;
    }
    Ok(())
}

fn collect(
    fs: &dyn Filesystem,
    path: &Path,
    kind: FileKind,
    files: &mut BTreeSet<PathBuf>,
) -> Result<()> {
    match kind {
        FileKind::File => {
            files.insert(path.to_path_buf());
        }
        FileKind::Dir => {
            let entries = fs.read_dir(path).map_err(|e| {
                DepsError::PathExpansion(format!(
                    "Failed to read directory {}: {}",
                    path.display(),
                    e
                ))
            })?;
            for entry in entries {
                let kind = fs.metadata(&entry).map_err(|e| {
                    DepsError::PathExpansion(format!("Failed to stat {}: {}", entry.display(), e))
                })?;
                collect(fs, &entry, kind, files)?;
            }
        }
    }
    Ok(())
}
