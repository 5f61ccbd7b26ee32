//! Local image inspection through the Docker CLI.

use std::path::PathBuf;
use std::process::Command;

use dfdeps_core::error::{DepsError, Result};

/// Source of raw image configuration JSON from a local image store.
pub trait LocalImageInspector: Send + Sync {
    /// Return the inspect output for `reference`, or an error if the image is
    /// not available locally.
    fn inspect_raw(&self, reference: &str) -> Result<Vec<u8>>;
}

/// Runs `docker image inspect --format '{{json .}}' <reference>`.
#[derive(Debug, Clone)]
pub struct DockerInspect {
    binary: PathBuf,
}

impl DockerInspect {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for DockerInspect {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl LocalImageInspector for DockerInspect {
    fn inspect_raw(&self, reference: &str) -> Result<Vec<u8>> {
        let lookup_err = |message: String| DepsError::ImageLookup {
            reference: reference.to_string(),
            message,
        };

        let output = Command::new(&self.binary)
            .args(["image", "inspect", "--format", "{{json .}}", reference])
            .output()
            .map_err(|e| {
                lookup_err(format!(
                    "Failed to run {}: {}",
                    self.binary.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(lookup_err(format!(
                "docker image inspect exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(output.stdout)
    }
}

/// Inspector used when local inspection is disabled: every lookup misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocalInspector;

impl LocalImageInspector for NoLocalInspector {
    fn inspect_raw(&self, reference: &str) -> Result<Vec<u8>> {
        Err(DepsError::ImageLookup {
            reference: reference.to_string(),
            message: "local inspection disabled".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_local_inspector_always_misses() {
        let err = NoLocalInspector.inspect_raw("alpine").unwrap_err();
        assert!(err.is_lookup());
        assert!(err.to_string().contains("alpine"));
    }

    #[test]
    fn test_missing_binary_is_lookup_error() {
        let inspector = DockerInspect::new("/nonexistent/dfdeps-docker");
        let err = inspector.inspect_raw("alpine").unwrap_err();
        assert!(matches!(err, DepsError::ImageLookup { ref reference, .. } if reference == "alpine"));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_lookup_error() {
        let inspector = DockerInspect::new("false");
        assert!(inspector.inspect_raw("alpine").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_stdout_is_returned() {
        // `echo` prints its arguments, standing in for the CLI
        let inspector = DockerInspect::new("echo");
        let raw = inspector.inspect_raw("alpine").unwrap();
        let text = String::from_utf8(raw).unwrap();
        assert_eq!(text.trim(), "image inspect --format {{json .}} alpine");
    }
}
