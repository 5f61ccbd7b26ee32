//! Filesystem access used by the resolver.
//!
//! Everything that touches disk goes through [`Filesystem`] so tests can swap
//! in [`MemoryFilesystem`].

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Component, Path, PathBuf};

use glob::{MatchOptions, Pattern};

/// What a path points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Dir,
}

/// Read-only filesystem operations.
pub trait Filesystem: Send + Sync {
    /// Read a whole file.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Kind of the entry at `path`; `NotFound` if there is none.
    fn metadata(&self, path: &Path) -> io::Result<FileKind>;

    /// Immediate children of a directory, sorted.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Paths matching a glob pattern, sorted.
    fn glob(&self, pattern: &str) -> io::Result<Vec<PathBuf>>;
}

/// The host filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFilesystem;

impl Filesystem for OsFilesystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn metadata(&self, path: &Path) -> io::Result<FileKind> {
        let meta = std::fs::metadata(path)?;
        Ok(if meta.is_dir() {
            FileKind::Dir
        } else {
            FileKind::File
        })
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = std::fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<io::Result<Vec<_>>>()?;
        entries.sort();
        Ok(entries)
    }

    fn glob(&self, pattern: &str) -> io::Result<Vec<PathBuf>> {
        let paths = glob::glob_with(pattern, match_options())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        let mut matches = paths
            .map(|entry| entry.map_err(Into::into))
            .collect::<io::Result<Vec<_>>>()?;
        matches.sort();
        Ok(matches)
    }
}

/// In-memory filesystem. Directories are implied by the files below them.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilesystem {
    files: BTreeMap<PathBuf, Vec<u8>>,
}

impl MemoryFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file, builder style.
    pub fn with_file(mut self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Self {
        self.add_file(path, contents);
        self
    }

    pub fn add_file(&mut self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) {
        self.files
            .insert(clean_path(path.as_ref()), contents.as_ref().to_vec());
    }

    /// Every file and implied directory.
    fn entries(&self) -> BTreeMap<PathBuf, FileKind> {
        let mut entries = BTreeMap::new();
        for file in self.files.keys() {
            for ancestor in file.ancestors().skip(1) {
                if ancestor.as_os_str().is_empty() {
                    break;
                }
                entries.insert(ancestor.to_path_buf(), FileKind::Dir);
            }
            entries.insert(file.clone(), FileKind::File);
        }
        entries
    }
}

impl Filesystem for MemoryFilesystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let path = clean_path(path);
        self.files.get(&path).cloned().ok_or_else(|| not_found(&path))
    }

    fn metadata(&self, path: &Path) -> io::Result<FileKind> {
        let path = clean_path(path);
        self.entries()
            .get(&path)
            .copied()
            .ok_or_else(|| not_found(&path))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let path = clean_path(path);
        let entries = self.entries();
        match entries.get(&path) {
            Some(FileKind::Dir) => {}
            Some(FileKind::File) => {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("{} is not a directory", path.display()),
                ))
            }
            None => return Err(not_found(&path)),
        }
        let children: BTreeSet<PathBuf> = entries
            .keys()
            .filter(|p| p.parent() == Some(path.as_path()))
            .cloned()
            .collect();
        Ok(children.into_iter().collect())
    }

    fn glob(&self, pattern: &str) -> io::Result<Vec<PathBuf>> {
        let pattern = Pattern::new(pattern)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        Ok(self
            .entries()
            .into_keys()
            .filter(|p| pattern.matches_path_with(p, match_options()))
            .collect())
    }
}

fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} does not exist", path.display()),
    )
}

/// Lexically normalize a path: drop `.` components and resolve `..` against
/// preceding components. `..` never climbs above the root.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Join a build-file path argument onto the workspace root. A leading `/` in
/// `relative` does not escape the workspace.
pub fn join_workspace(workspace: &Path, relative: &str) -> PathBuf {
    clean_path(&workspace.join(relative.trim_start_matches('/')))
}

/// Make a path absolute against the current directory, then normalize it.
pub fn absolutize(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(clean_path(path))
    } else {
        Ok(clean_path(&std::env::current_dir()?.join(path)))
    }
}
