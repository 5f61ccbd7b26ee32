//! Base image lookup: cache first, then the local image store, then the
//! registry.

use std::sync::Arc;

use dfdeps_core::config::ResolverConfig;
use dfdeps_core::error::{DepsError, Result};

use super::cache::ImageConfigCache;
use super::descriptor::ImageDescriptor;
use super::local::{DockerInspect, LocalImageInspector, NoLocalInspector};
use super::registry::{RegistryConfigFetcher, RemoteConfigFetcher};

/// Whether `reference` names the empty base image.
pub fn is_scratch(reference: &str) -> bool {
    reference.eq_ignore_ascii_case("scratch")
}

/// Resolves image references to descriptors through a shared cache.
#[derive(Clone)]
pub struct BaseImageResolver {
    cache: Arc<ImageConfigCache>,
    local: Arc<dyn LocalImageInspector>,
    remote: Arc<dyn RemoteConfigFetcher>,
}

impl BaseImageResolver {
    pub fn new(
        cache: Arc<ImageConfigCache>,
        local: Arc<dyn LocalImageInspector>,
        remote: Arc<dyn RemoteConfigFetcher>,
    ) -> Self {
        Self {
            cache,
            local,
            remote,
        }
    }

    /// Resolver backed by the process-wide cache, the Docker CLI (unless
    /// disabled) and the registry.
    pub fn from_config(config: &ResolverConfig) -> Self {
        let local: Arc<dyn LocalImageInspector> = if config.local_inspect {
            Arc::new(DockerInspect::new(config.docker_binary.clone()))
        } else {
            Arc::new(NoLocalInspector)
        };
        Self::new(
            ImageConfigCache::shared(),
            local,
            Arc::new(RegistryConfigFetcher::new(&config.registry)),
        )
    }

    pub fn cache(&self) -> &Arc<ImageConfigCache> {
        &self.cache
    }

    /// Look up the descriptor of `reference`.
    ///
    /// `scratch` resolves to an empty descriptor without any lookup. A local
    /// inspect result that cannot be decoded is an error; it does not fall
    /// back to the registry.
    pub fn resolve(&self, reference: &str) -> Result<Arc<ImageDescriptor>> {
        if is_scratch(reference) {
            return Ok(Arc::new(ImageDescriptor::default()));
        }

        if let Some(hit) = self.cache.get(reference) {
            tracing::debug!(reference = %reference, "Image config cache hit");
            return Ok(hit);
        }

        let descriptor = match self.local.inspect_raw(reference) {
            Ok(raw) => {
                tracing::debug!(reference = %reference, "Found image in local store");
                ImageDescriptor::from_config_json(&raw).map_err(|e| DepsError::ImageLookup {
                    reference: reference.to_string(),
                    message: format!("Failed to decode local image config: {}", e),
                })?
            }
            Err(local_err) => {
                tracing::debug!(
                    reference = %reference,
                    error = %local_err,
                    "Image not available locally, asking registry"
                );
                self.remote.fetch_config(reference)?
            }
        };

        Ok(self.cache.insert_if_absent(reference, descriptor))
    }
}

impl std::fmt::Debug for BaseImageResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseImageResolver")
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubLocal {
        response: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl LocalImageInspector for StubLocal {
        fn inspect_raw(&self, reference: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response
                .map(|r| r.as_bytes().to_vec())
                .ok_or_else(|| DepsError::ImageLookup {
                    reference: reference.to_string(),
                    message: "no such image".to_string(),
                })
        }
    }

    struct StubRemote {
        ports: Vec<&'static str>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl RemoteConfigFetcher for StubRemote {
        fn fetch_config(&self, reference: &str) -> Result<ImageDescriptor> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DepsError::ImageLookup {
                    reference: reference.to_string(),
                    message: "registry unreachable".to_string(),
                });
            }
            Ok(ImageDescriptor {
                exposed_ports: self.ports.iter().map(|p| p.to_string()).collect(),
                on_build: Vec::new(),
            })
        }
    }

    fn setup(
        local: Option<&'static str>,
        remote_fails: bool,
    ) -> (BaseImageResolver, Arc<StubLocal>, Arc<StubRemote>) {
        let local = Arc::new(StubLocal {
            response: local,
            calls: AtomicUsize::new(0),
        });
        let remote = Arc::new(StubRemote {
            ports: vec!["9000/tcp"],
            fail: remote_fails,
            calls: AtomicUsize::new(0),
        });
        let resolver = BaseImageResolver::new(
            Arc::new(ImageConfigCache::new()),
            local.clone(),
            remote.clone(),
        );
        (resolver, local, remote)
    }

    #[test]
    fn test_is_scratch() {
        assert!(is_scratch("scratch"));
        assert!(is_scratch("SCRATCH"));
        assert!(!is_scratch("scratchy"));
    }

    #[test]
    fn test_scratch_needs_no_lookup() {
        let (resolver, local, remote) = setup(None, true);
        let desc = resolver.resolve("Scratch").unwrap();
        assert!(desc.is_empty());
        assert_eq!(local.calls.load(Ordering::SeqCst), 0);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
        assert!(resolver.cache().is_empty());
    }

    #[test]
    fn test_local_hit_skips_remote() {
        let (resolver, local, remote) =
            setup(Some(r#"{"Config":{"ExposedPorts":{"80/tcp":{}}}}"#), false);
        let desc = resolver.resolve("nginx").unwrap();
        assert!(desc.exposed_ports.contains("80/tcp"));
        assert_eq!(local.calls.load(Ordering::SeqCst), 1);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_local_miss_falls_back_to_remote() {
        let (resolver, _, remote) = setup(None, false);
        let desc = resolver.resolve("nginx").unwrap();
        assert!(desc.exposed_ports.contains("9000/tcp"));
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_both_fail_reports_remote_error() {
        let (resolver, _, _) = setup(None, true);
        let err = resolver.resolve("nginx").unwrap_err();
        assert!(err.to_string().contains("registry unreachable"));
        assert!(resolver.cache().is_empty());
    }

    #[test]
    fn test_undecodable_local_config_is_error() {
        let (resolver, _, remote) = setup(Some("not json"), false);
        let err = resolver.resolve("nginx").unwrap_err();
        assert!(err.is_lookup());
        assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_second_lookup_served_from_cache() {
        let (resolver, local, remote) = setup(None, false);
        let first = resolver.resolve("nginx").unwrap();
        let second = resolver.resolve("nginx").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(local.calls.load(Ordering::SeqCst), 1);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failures_are_not_cached() {
        let (resolver, _, remote) = setup(None, true);
        assert!(resolver.resolve("nginx").is_err());
        assert!(resolver.resolve("nginx").is_err());
        assert_eq!(remote.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_from_config_without_local_inspect() {
        let config = ResolverConfig {
            local_inspect: false,
            ..Default::default()
        };
        let resolver = BaseImageResolver::from_config(&config);
        assert!(Arc::ptr_eq(resolver.cache(), &ImageConfigCache::shared()));
    }
}
