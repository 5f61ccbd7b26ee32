//! Dependency resolution: which workspace files a Dockerfile build reads.
//!
//! Resolution runs in two passes over the parsed file. The first pass looks
//! up every base image and replays its ONBUILD triggers; the second pass
//! replays the file itself. Both passes share one environment table and one
//! dependency set, so triggers never see ENV values set later in the file.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dfdeps_core::config::ResolverConfig;
use dfdeps_core::error::{DepsError, Result};

use crate::dockerfile::{CopyArgs, Dockerfile, Instruction, InstructionKind, DEFAULT_ESCAPE};
use crate::dockerignore::IgnoreFilter;
use crate::expand::expand_paths;
use crate::fs::{absolutize, clean_path, join_workspace, Filesystem, OsFilesystem};
use crate::image::BaseImageResolver;
use crate::ports::PortExtractor;
use crate::report::{Report, Warning, WarningPhase};
use crate::shell::{expand_word, Environment};

/// Resolves build dependencies and exposed ports of Dockerfiles.
#[derive(Clone)]
pub struct DependencyResolver {
    fs: Arc<dyn Filesystem>,
    images: BaseImageResolver,
    config: ResolverConfig,
}

impl DependencyResolver {
    /// Resolver over the host filesystem with the process-wide image cache.
    pub fn new(config: ResolverConfig) -> Self {
        let images = BaseImageResolver::from_config(&config);
        Self::with_parts(Arc::new(OsFilesystem), images, config)
    }

    pub fn with_parts(
        fs: Arc<dyn Filesystem>,
        images: BaseImageResolver,
        config: ResolverConfig,
    ) -> Self {
        Self { fs, images, config }
    }

    pub fn images(&self) -> &BaseImageResolver {
        &self.images
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Files under `workspace` that the build of `dockerfile_path` (relative
    /// to `workspace`) depends on, sorted, with the Dockerfile itself
    /// included unless the ignore file excludes it.
    pub fn resolve(&self, dockerfile_path: &Path, workspace: &Path) -> Result<Report<Vec<PathBuf>>> {
        let workspace = absolutize(workspace)?;
        let path = clean_path(&workspace.join(dockerfile_path));
        let dockerfile = self.open(&path)?;

        tracing::debug!(
            dockerfile = %path.display(),
            workspace = %workspace.display(),
            "Resolving build dependencies"
        );

        let mut walk = Walk::new(&workspace);
        let mut warnings = Vec::new();

        // First pass: ONBUILD triggers of every base image
        let mut triggers = Vec::new();
        for image in dockerfile.base_images() {
            match self.images.resolve(image) {
                Ok(descriptor) => {
                    for trigger in &descriptor.on_build {
                        triggers.push((image.to_string(), trigger.clone()));
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        reference = %image,
                        error = %e,
                        "Failed to look up base image for ONBUILD triggers, dependencies may be incomplete"
                    );
                    warnings.push(Warning {
                        reference: image.to_string(),
                        phase: WarningPhase::OnbuildDiscovery,
                        message: e.to_string(),
                    });
                }
            }
        }

        for (image, trigger) in &triggers {
            let trigger_err = |e: DepsError| DepsError::Trigger {
                image: image.clone(),
                trigger: trigger.clone(),
                message: e.to_string(),
            };
            let instruction = Dockerfile::parse_fragment(trigger).map_err(trigger_err)?;
            tracing::debug!(
                reference = %image,
                trigger = %trigger,
                "Replaying ONBUILD trigger"
            );
            walk.dispatch(&instruction, DEFAULT_ESCAPE)
                .map_err(trigger_err)?;
        }

        // Second pass: the file itself
        for instruction in &dockerfile.instructions {
            walk.dispatch(instruction, dockerfile.escape)?;
        }

        let mut files = expand_paths(self.fs.as_ref(), &workspace, &walk.deps)?;
        files.insert(path);

        let ignore_file = workspace.join(&self.config.ignore_file_name);
        let filter = IgnoreFilter::load(self.fs.as_ref(), &ignore_file)?;
        let files = filter.filter(files)?;

        tracing::debug!(
            workspace = %workspace.display(),
            count = files.len(),
            warnings = warnings.len(),
            "Resolved build dependencies"
        );

        Ok(Report::with_warnings(files, warnings))
    }

    /// Ports exposed by the image built from `dockerfile_path`, including
    /// those inherited from its base images.
    pub fn ports(&self, dockerfile_path: &Path, workspace: &Path) -> Result<Report<Vec<String>>> {
        let workspace = absolutize(workspace)?;
        let dockerfile = self.open(&clean_path(&workspace.join(dockerfile_path)))?;
        Ok(PortExtractor::new(self.images.clone()).extract_from(&dockerfile))
    }

    fn open(&self, path: &Path) -> Result<Dockerfile> {
        let raw = self.fs.read(path).map_err(|source| DepsError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Dockerfile::from_reader(raw.as_slice())
    }
}

impl std::fmt::Debug for DependencyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyResolver")
            .field("images", &self.images)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Accumulators of one resolution call.
struct Walk<'a> {
    workspace: &'a Path,
    env: Environment,
    deps: BTreeSet<PathBuf>,
}

impl<'a> Walk<'a> {
    fn new(workspace: &'a Path) -> Self {
        Self {
            workspace,
            env: Environment::new(),
            deps: BTreeSet::new(),
        }
    }

    fn dispatch(&mut self, instruction: &Instruction, escape: char) -> Result<()> {
        match &instruction.kind {
            InstructionKind::Add(args) | InstructionKind::Copy(args) => {
                self.add_sources(instruction, args, escape)
            }
            InstructionKind::Env { pairs } => {
                // Every value sees the table as it was before this instruction
                let before = self.env.clone();
                for (key, raw) in pairs {
                    let value = expand_word(raw, &before, escape)?;
                    self.env.set(key.clone(), value);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn add_sources(&mut self, instruction: &Instruction, args: &CopyArgs, escape: char) -> Result<()> {
        if instruction.has_stage_source() {
            tracing::debug!(
                line = instruction.line,
                keyword = instruction.keyword(),
                "Skipping copy from another stage"
            );
            return Ok(());
        }

        for source in args.sources() {
            let expanded = expand_word(source, &self.env, escape)?;
            if expanded.starts_with("http://") || expanded.starts_with("https://") {
                tracing::debug!(source = %expanded, "Skipping remote source");
                continue;
            }
            self.deps.insert(join_workspace(self.workspace, &expanded));
        }
        Ok(())
    }
}
