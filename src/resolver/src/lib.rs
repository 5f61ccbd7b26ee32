//! dfdeps - Dockerfile dependency and port resolution.
//!
//! Works out which workspace files a container image build reads, so a build
//! tool knows what to watch and when to rebuild, and which ports the built
//! image exposes. Base image metadata (ONBUILD triggers, exposed ports) comes
//! from the local Docker daemon or the image's registry and is cached for the
//! life of the process.

#![allow(clippy::result_large_err)]

pub mod dockerfile;
pub mod dockerignore;
pub mod expand;
pub mod fs;
pub mod image;
pub mod ports;
pub mod report;
pub mod shell;
pub mod walker;

use std::io::Read;
use std::path::{Path, PathBuf};

// Re-export common types
pub use dfdeps_core::config::{RegistryConfig, ResolverConfig};
pub use dfdeps_core::error::{DepsError, Result};
pub use dockerfile::{CopyArgs, Dockerfile, Instruction, InstructionKind};
pub use dockerignore::{apply_ignore_file, IgnoreFilter};
pub use fs::{Filesystem, MemoryFilesystem, OsFilesystem};
pub use image::{
    BaseImageResolver, DockerInspect, ImageConfigCache, ImageDescriptor, LocalImageInspector,
    RegistryAuth, RegistryConfigFetcher, RemoteConfigFetcher,
};
pub use ports::PortExtractor;
pub use report::{Report, Warning, WarningPhase};
pub use shell::{expand_word, Environment};
pub use walker::DependencyResolver;

/// dfdeps version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Resolve the dependencies of `dockerfile_path` (relative to `workspace`)
/// with the configuration from the environment.
pub fn dockerfile_dependencies(dockerfile_path: &Path, workspace: &Path) -> Result<Report<Vec<PathBuf>>> {
    DependencyResolver::new(ResolverConfig::from_env()?).resolve(dockerfile_path, workspace)
}

/// Extract the ports exposed by the Dockerfile read from `reader`, with the
/// configuration from the environment.
pub fn ports_from_dockerfile(reader: impl Read) -> Result<Report<Vec<String>>> {
    let config = ResolverConfig::from_env()?;
    PortExtractor::new(BaseImageResolver::from_config(&config)).extract(reader)
}
