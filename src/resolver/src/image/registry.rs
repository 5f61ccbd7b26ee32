//! Remote image configuration lookup over the registry API.
//!
//! Uses the `oci-distribution` crate to fetch an image's manifest and config
//! blob from its registry (Docker Hub, GHCR, etc.). Multi-arch indexes are
//! resolved to the linux image for the host architecture.

use std::future::Future;
use std::time::Duration;

use dfdeps_core::config::RegistryConfig;
use dfdeps_core::error::{DepsError, Result};
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::manifest::ImageIndexEntry;
use oci_distribution::secrets::RegistryAuth as OciRegistryAuth;
use oci_distribution::{Client, Reference};

use super::descriptor::ImageDescriptor;

/// Source of image descriptors from a remote registry.
pub trait RemoteConfigFetcher: Send + Sync {
    fn fetch_config(&self, reference: &str) -> Result<ImageDescriptor>;
}

/// Authentication credentials for a container registry.
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    username: Option<String>,
    password: Option<String>,
}

impl RegistryAuth {
    /// Create anonymous authentication (no credentials).
    pub fn anonymous() -> Self {
        Self {
            username: None,
            password: None,
        }
    }

    /// Create basic authentication with username and password.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// Create authentication from environment variables.
    ///
    /// Reads `REGISTRY_USERNAME` and `REGISTRY_PASSWORD`.
    /// Falls back to anonymous if either is missing.
    pub fn from_env() -> Self {
        let username = std::env::var("REGISTRY_USERNAME").ok();
        let password = std::env::var("REGISTRY_PASSWORD").ok();

        if username.is_some() && password.is_some() {
            Self { username, password }
        } else {
            Self::anonymous()
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.username.is_none() || self.password.is_none()
    }

    fn to_oci_auth(&self) -> OciRegistryAuth {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => OciRegistryAuth::Basic(u.clone(), p.clone()),
            _ => OciRegistryAuth::Anonymous,
        }
    }
}

/// Fetches image configurations from registries, one attempt per call.
#[derive(Debug, Clone)]
pub struct RegistryConfigFetcher {
    auth: RegistryAuth,
    timeout: Duration,
    insecure: bool,
}

impl RegistryConfigFetcher {
    /// Fetcher with credentials from the environment.
    pub fn new(config: &RegistryConfig) -> Self {
        Self::with_auth(config, RegistryAuth::from_env())
    }

    pub fn with_auth(config: &RegistryConfig, auth: RegistryAuth) -> Self {
        Self {
            auth,
            timeout: config.timeout(),
            insecure: config.insecure,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    // The client is built per call so its connection pool lives and dies
    // with the runtime that drives it.
    fn client(&self) -> Client {
        let protocol = if self.insecure {
            ClientProtocol::Http
        } else {
            ClientProtocol::Https
        };
        Client::new(ClientConfig {
            protocol,
            platform_resolver: Some(Box::new(linux_platform_resolver)),
            ..Default::default()
        })
    }

    async fn fetch(&self, reference: &Reference) -> Result<ImageDescriptor> {
        let client = self.client();
        let auth = self.auth.to_oci_auth();

        let (_manifest, digest, config) = client
            .pull_manifest_and_config(reference, &auth)
            .await
            .map_err(|e| lookup_error(reference.whole(), format!("Failed to pull config: {}", e)))?;

        tracing::debug!(
            reference = %reference,
            digest = %digest,
            "Fetched image config from registry"
        );

        ImageDescriptor::from_config_json(config.as_bytes()).map_err(|e| {
            lookup_error(reference.whole(), format!("Invalid image config: {}", e))
        })
    }
}

impl RemoteConfigFetcher for RegistryConfigFetcher {
    fn fetch_config(&self, reference: &str) -> Result<ImageDescriptor> {
        let oci_ref = to_oci_reference(reference)?;

        tracing::info!(
            reference = %reference,
            timeout_secs = self.timeout.as_secs(),
            "Fetching image config from registry"
        );

        let timeout = self.timeout;
        let outcome = block_on(|| tokio::time::timeout(timeout, self.fetch(&oci_ref)))
        .map_err(|message| lookup_error(reference, message))?;

        match outcome {
            Ok(result) => result,
            Err(_) => Err(lookup_error(
                reference,
                format!("registry did not answer within {:?}", timeout),
            )),
        }
    }
}

/// Build a future with `make` and drive it to completion on a private
/// current-thread runtime owned by a scoped thread. Works whether or not the
/// caller is itself inside a tokio runtime.
fn block_on<M, F>(make: M) -> std::result::Result<F::Output, String>
where
    M: FnOnce() -> F + Send,
    F: Future,
    F::Output: Send,
{
    std::thread::scope(|scope| {
        scope
            .spawn(|| -> std::result::Result<F::Output, String> {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| format!("Failed to start registry runtime: {}", e))?;
                Ok(runtime.block_on(async move { make().await }))
            })
            .join()
            .unwrap_or_else(|_| Err("registry lookup thread panicked".to_string()))
    })
}

fn to_oci_reference(reference: &str) -> Result<Reference> {
    reference
        .parse::<Reference>()
        .map_err(|e| lookup_error(reference, format!("Invalid OCI reference: {}", e)))
}

fn lookup_error(reference: impl Into<String>, message: String) -> DepsError {
    DepsError::ImageLookup {
        reference: reference.into(),
        message,
    }
}

/// Pick the linux manifest for the host architecture from a multi-arch index.
fn linux_platform_resolver(manifests: &[ImageIndexEntry]) -> Option<String> {
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    };

    manifests
        .iter()
        .find(|entry| {
            entry
                .platform
                .as_ref()
                .map_or(false, |p| p.os == "linux" && p.architecture == arch)
        })
        .map(|entry| entry.digest.clone())
}
