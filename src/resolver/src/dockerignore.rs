//! Ignore-file filtering of dependency paths.
//!
//! Patterns are anchored at the directory holding the ignore file and matched
//! with gitignore semantics: `!` negates, a trailing `/` only matches
//! directories, `*`, `?` and `**` glob, and a pattern that matches a parent
//! directory excludes everything below it. The last matching pattern wins.

use std::io;
use std::path::{Path, PathBuf};

use dfdeps_core::error::{DepsError, Result};
use glob::Pattern;
use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::fs::{absolutize, clean_path, Filesystem};

/// Read the patterns of an ignore file: blank lines and `#` comments are
/// dropped, surrounding whitespace and leading `/` are stripped.
pub fn read_patterns(content: &str) -> Result<Vec<String>> {
    let mut patterns = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (negated, body) = match line.strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, line),
        };
        if body.is_empty() {
            return Err(DepsError::Ignore {
                path: String::new(),
                message: format!("illegal exclusion pattern: \"{}\"", line),
            });
        }

        let body = body.trim_start_matches('/');
        let body = body.strip_prefix("./").unwrap_or(body);
        if body.is_empty() {
            continue;
        }

        patterns.push(if negated {
            format!("!{}", body)
        } else {
            body.to_string()
        });
    }

    Ok(patterns)
}

/// One pattern of an ignore file, compiled on its own so that matches on a
/// path and on its parents are weighed in file order.
#[derive(Debug, Clone)]
struct Rule {
    matcher: Gitignore,
    negated: bool,
}

/// Compiled exclusion patterns rooted at one directory.
#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    root: PathBuf,
    rules: Vec<Rule>,
}

impl IgnoreFilter {
    /// A filter that excludes nothing.
    pub fn empty(root: &Path) -> Self {
        Self {
            root: clean_path(root),
            rules: Vec::new(),
        }
    }

    /// Compile `patterns` (as returned by [`read_patterns`]) rooted at `root`.
    pub fn from_patterns(root: &Path, patterns: Vec<String>) -> Result<Self> {
        let root = absolutize(root)?;
        let invalid = |pattern: &str, message: String| DepsError::Ignore {
            path: root.display().to_string(),
            message: format!("invalid pattern '{}': {}", pattern, message),
        };

        let mut rules = Vec::with_capacity(patterns.len());
        for pattern in &patterns {
            let (negated, body) = match pattern.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, pattern.as_str()),
            };

            // The gitignore builder tolerates some malformed globs, such as an
            // unclosed class.
            Pattern::new(body).map_err(|e| invalid(pattern, e.to_string()))?;

            // Anchor every pattern at the root.
            let mut builder = GitignoreBuilder::new(&root);
            builder
                .add_line(None, &format!("/{}", body))
                .map_err(|e| invalid(pattern, e.to_string()))?;
            let matcher = builder
                .build()
                .map_err(|e| invalid(pattern, e.to_string()))?;

            rules.push(Rule { matcher, negated });
        }

        Ok(Self { root, rules })
    }

    /// Load the ignore file at `ignore_file`. A missing file yields an empty
    /// filter; otherwise the file's own name is excluded as well.
    pub fn load(fs: &dyn Filesystem, ignore_file: &Path) -> Result<Self> {
        let root = ignore_file.parent().unwrap_or_else(|| Path::new("."));
        let ignore_err = |message: String| DepsError::Ignore {
            path: ignore_file.display().to_string(),
            message,
        };

        match fs.metadata(ignore_file) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %ignore_file.display(), "No ignore file");
                return Ok(Self::empty(root));
            }
            Err(e) => return Err(ignore_err(e.to_string())),
        }

        let raw = fs
            .read(ignore_file)
            .map_err(|e| ignore_err(format!("Failed to read: {}", e)))?;
        let content =
            String::from_utf8(raw).map_err(|e| ignore_err(format!("not valid UTF-8: {}", e)))?;

        let mut patterns = read_patterns(&content).map_err(|e| match e {
            DepsError::Ignore { message, .. } => ignore_err(message),
            other => other,
        })?;
        if let Some(name) = ignore_file.file_name() {
            patterns.push(name.to_string_lossy().into_owned());
        }

        tracing::debug!(
            path = %ignore_file.display(),
            count = patterns.len(),
            "Loaded ignore patterns"
        );

        Self::from_patterns(root, patterns).map_err(|e| match e {
            DepsError::Ignore { message, .. } => ignore_err(message),
            other => other,
        })
    }

    /// Whether `path` is excluded. Paths outside the root never are.
    ///
    /// A pattern applies when it matches the path or one of its parent
    /// directories; the last pattern that applies decides.
    pub fn is_excluded(&self, path: &Path) -> Result<bool> {
        let path = absolutize(path)?;
        if !path.starts_with(&self.root) || path == self.root {
            return Ok(false);
        }

        let mut excluded = false;
        for rule in &self.rules {
            if rule
                .matcher
                .matched_path_or_any_parents(&path, false)
                .is_ignore()
            {
                excluded = !rule.negated;
            }
        }
        Ok(excluded)
    }

    /// Remove excluded paths and sort the rest lexicographically.
    pub fn filter(&self, paths: impl IntoIterator<Item = PathBuf>) -> Result<Vec<PathBuf>> {
        let mut kept = Vec::new();
        for path in paths {
            let path = absolutize(&path)?;
            if self.is_excluded(&path)? {
                tracing::debug!(path = %path.display(), "Excluded by ignore file");
            } else {
                kept.push(path);
            }
        }
        kept.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));
        kept.dedup();
        Ok(kept)
    }
}

/// Filter `paths` through the ignore file at `ignore_file`.
pub fn apply_ignore_file(
    fs: &dyn Filesystem,
    paths: impl IntoIterator<Item = PathBuf>,
    ignore_file: &Path,
) -> Result<Vec<PathBuf>> {
    IgnoreFilter::load(fs, ignore_file)?.filter(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFilesystem;

    fn paths(items: &[&str]) -> Vec<PathBuf> {
        items.iter().map(PathBuf::from).collect()
    }

    fn filter_with(ignore: &str, items: &[&str]) -> Vec<PathBuf> {
        let fs = MemoryFilesystem::new().with_file("/ws/.dockerignore", ignore);
        apply_ignore_file(&fs, paths(items), Path::new("/ws/.dockerignore")).unwrap()
    }

    // --- read_patterns ---

    #[test]
    fn test_read_patterns() {
        let content = "# comment\n\n  *.log  \n/build\n!keep.log\n./docs/\n";
        let patterns = read_patterns(content).unwrap();
        assert_eq!(patterns, vec!["*.log", "build", "!keep.log", "docs/"]);
    }

    #[test]
    fn test_read_patterns_bare_negation() {
        assert!(read_patterns("!\n").is_err());
    }

    // --- filtering ---

    #[test]
    fn test_missing_ignore_file() {
        let fs = MemoryFilesystem::new();
        let result = apply_ignore_file(
            &fs,
            paths(&["/ws/b", "/ws/a"]),
            Path::new("/ws/.dockerignore"),
        )
        .unwrap();
        assert_eq!(result, paths(&["/ws/a", "/ws/b"]));
    }

    #[test]
    fn test_simple_exclusion() {
        let result = filter_with("app.go", &["/ws/Dockerfile", "/ws/app.go"]);
        assert_eq!(result, paths(&["/ws/Dockerfile"]));
    }

    #[test]
    fn test_patterns_are_anchored_at_root() {
        let result = filter_with("app.go", &["/ws/app.go", "/ws/sub/app.go"]);
        assert_eq!(result, paths(&["/ws/sub/app.go"]));
    }

    #[test]
    fn test_globstar_matches_any_depth() {
        let result = filter_with("**/*.log", &["/ws/a.log", "/ws/x/y/b.log", "/ws/c.txt"]);
        assert_eq!(result, paths(&["/ws/c.txt"]));
    }

    #[test]
    fn test_parent_directory_excludes_children() {
        let result = filter_with("vendor", &["/ws/vendor/lib/a.go", "/ws/main.go"]);
        assert_eq!(result, paths(&["/ws/main.go"]));
    }

    #[test]
    fn test_directory_only_pattern() {
        let result = filter_with("out/", &["/ws/out/bin", "/ws/out"]);
        assert_eq!(result, paths(&["/ws/out"]));
    }

    #[test]
    fn test_negation_last_match_wins() {
        let result = filter_with(
            "*.md\n!README.md",
            &["/ws/README.md", "/ws/CHANGES.md", "/ws/main.go"],
        );
        assert_eq!(result, paths(&["/ws/README.md", "/ws/main.go"]));
    }

    #[test]
    fn test_ignore_file_excludes_itself() {
        let result = filter_with("", &["/ws/.dockerignore", "/ws/Dockerfile"]);
        assert_eq!(result, paths(&["/ws/Dockerfile"]));
    }

    #[test]
    fn test_dockerfile_not_exempt() {
        let result = filter_with("Dockerfile", &["/ws/Dockerfile", "/ws/app.go"]);
        assert_eq!(result, paths(&["/ws/app.go"]));
    }

    #[test]
    fn test_paths_outside_root_kept() {
        let result = filter_with("*", &["/other/file", "/ws/file"]);
        assert_eq!(result, paths(&["/other/file"]));
    }

    #[test]
    fn test_output_sorted_bytewise() {
        let fs = MemoryFilesystem::new();
        let result = apply_ignore_file(
            &fs,
            paths(&["/ws/a/b", "/ws/a-b", "/ws/Z"]),
            Path::new("/ws/.dockerignore"),
        )
        .unwrap();
        assert_eq!(result, paths(&["/ws/Z", "/ws/a-b", "/ws/a/b"]));
    }

    #[test]
    fn test_invalid_pattern_is_fatal() {
        let fs = MemoryFilesystem::new().with_file("/ws/.dockerignore", "[z-a");
        let err = apply_ignore_file(&fs, paths(&["/ws/a"]), Path::new("/ws/.dockerignore"))
            .unwrap_err();
        assert!(matches!(err, DepsError::Ignore { ref path, .. } if path == "/ws/.dockerignore"));
    }

    #[test]
    fn test_unclosed_class_is_fatal() {
        let fs = MemoryFilesystem::new().with_file("/ws/.dockerignore", "[\n");
        let err = apply_ignore_file(&fs, paths(&["/ws/a"]), Path::new("/ws/.dockerignore"))
            .unwrap_err();
        assert!(matches!(err, DepsError::Ignore { .. }));
        assert!(err.to_string().contains("'['"));
    }

    #[test]
    fn test_later_parent_match_overrides_negation() {
        let result = filter_with(
            "!vendor/keep.go\nvendor",
            &["/ws/vendor/keep.go", "/ws/vendor/drop.go", "/ws/main.go"],
        );
        assert_eq!(result, paths(&["/ws/main.go"]));
    }

    #[test]
    fn test_negation_after_parent_match_keeps_file() {
        let result = filter_with(
            "vendor\n!vendor/keep.go",
            &["/ws/vendor/keep.go", "/ws/vendor/drop.go"],
        );
        assert_eq!(result, paths(&["/ws/vendor/keep.go"]));
    }

    #[test]
    fn test_invalid_utf8_is_fatal() {
        let fs = MemoryFilesystem::new().with_file("/ws/.dockerignore", [0xffu8, 0xfe]);
        assert!(apply_ignore_file(&fs, paths(&["/ws/a"]), Path::new("/ws/.dockerignore")).is_err());
    }
}
