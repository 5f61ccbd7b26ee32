use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{DepsError, Result};

/// Default ignore file name, looked up at the workspace root.
pub const DEFAULT_IGNORE_FILE: &str = ".dockerignore";

/// Default upper bound for a single registry config fetch.
pub const DEFAULT_REGISTRY_TIMEOUT_SECS: u64 = 20;

/// Resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Name of the ignore file inside the workspace root
    pub ignore_file_name: String,

    /// Remote registry settings
    pub registry: RegistryConfig,

    /// Ask the local Docker daemon before falling back to the registry
    pub local_inspect: bool,

    /// Docker CLI used for local image inspection
    pub docker_binary: PathBuf,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            ignore_file_name: DEFAULT_IGNORE_FILE.to_string(),
            registry: RegistryConfig::default(),
            local_inspect: true,
            docker_binary: PathBuf::from("docker"),
        }
    }
}

impl ResolverConfig {
    /// Build a configuration from the defaults overridden by environment
    /// variables.
    ///
    /// Reads `DFDEPS_REGISTRY_TIMEOUT` (seconds), `DFDEPS_INSECURE_REGISTRY`
    /// (`1`/`true`) and `DFDEPS_DOCKER_BIN`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("DFDEPS_REGISTRY_TIMEOUT") {
            config.registry.timeout_secs = raw.trim().parse().map_err(|e| {
                DepsError::ConfigError(format!(
                    "DFDEPS_REGISTRY_TIMEOUT must be a number of seconds, got '{}': {}",
                    raw, e
                ))
            })?;
        }
        if let Ok(raw) = std::env::var("DFDEPS_INSECURE_REGISTRY") {
            config.registry.insecure = matches!(raw.trim(), "1" | "true" | "TRUE" | "yes");
        }
        if let Ok(bin) = std::env::var("DFDEPS_DOCKER_BIN") {
            config.docker_binary = PathBuf::from(bin);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the resolver cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.ignore_file_name.trim().is_empty() {
            return Err(DepsError::ConfigError(
                "ignore_file_name must not be empty".to_string(),
            ));
        }
        if self.ignore_file_name.contains('/') {
            return Err(DepsError::ConfigError(format!(
                "ignore_file_name must be a bare file name, got '{}'",
                self.ignore_file_name
            )));
        }
        if self.registry.timeout_secs == 0 {
            return Err(DepsError::ConfigError(
                "registry timeout must be at least one second".to_string(),
            ));
        }
        Ok(())
    }
}

/// Remote registry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Upper bound for one config fetch (single attempt, no retry)
    pub timeout_secs: u64,

    /// Talk plain HTTP to the registry
    pub insecure: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_REGISTRY_TIMEOUT_SECS,
            insecure: false,
        }
    }
}

impl RegistryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
