//! Exposed port extraction.

use std::collections::BTreeSet;
use std::io::Read;

use dfdeps_core::error::Result;

use crate::dockerfile::{Dockerfile, InstructionKind};
use crate::image::{is_scratch, BaseImageResolver};
use crate::report::{Report, Warning, WarningPhase};

/// Collects the ports a Dockerfile exposes, including those its base images
/// expose.
#[derive(Debug, Clone)]
pub struct PortExtractor {
    images: BaseImageResolver,
}

impl PortExtractor {
    pub fn new(images: BaseImageResolver) -> Self {
        Self { images }
    }

    /// Parse a Dockerfile from `reader` and extract its ports.
    pub fn extract(&self, reader: impl Read) -> Result<Report<Vec<String>>> {
        let dockerfile = Dockerfile::from_reader(reader)?;
        Ok(self.extract_from(&dockerfile))
    }

    /// Ports of an already parsed Dockerfile, sorted as strings (`"443"`
    /// before `"80"`) without duplicates.
    ///
    /// Inherited ports keep the image's key form (`80/tcp`); `EXPOSE` tokens
    /// are taken literally.
    pub fn extract_from(&self, dockerfile: &Dockerfile) -> Report<Vec<String>> {
        let mut ports = BTreeSet::new();
        let mut warnings = Vec::new();

        for image in dockerfile.base_images() {
            if is_scratch(image) {
                tracing::debug!("Skipping port check in scratch base image");
                continue;
            }
            match self.images.resolve(image) {
                Ok(descriptor) => {
                    for port in &descriptor.exposed_ports {
                        tracing::debug!(reference = %image, port = %port, "Found port in base image");
                        ports.insert(port.clone());
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        reference = %image,
                        error = %e,
                        "Failed to check base image for ports"
                    );
                    warnings.push(Warning {
                        reference: image.to_string(),
                        phase: WarningPhase::PortInheritance,
                        message: e.to_string(),
                    });
                }
            }
        }

        for instruction in &dockerfile.instructions {
            if let InstructionKind::Expose { ports: exposed } = &instruction.kind {
                for port in exposed {
                    tracing::debug!(port = %port, line = instruction.line, "Found port in Dockerfile");
                    ports.insert(port.clone());
                }
            }
        }

        Report::with_warnings(ports.into_iter().collect(), warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{ImageConfigCache, ImageDescriptor, NoLocalInspector, RemoteConfigFetcher};
    use dfdeps_core::error::DepsError;
    use std::sync::Arc;

    struct StubRegistry;

    impl RemoteConfigFetcher for StubRegistry {
        fn fetch_config(&self, reference: &str) -> Result<ImageDescriptor> {
            match reference {
                "nginx" => Ok(ImageDescriptor {
                    exposed_ports: ["80/tcp".to_string()].into_iter().collect(),
                    on_build: Vec::new(),
                }),
                _ => Err(DepsError::ImageLookup {
                    reference: reference.to_string(),
                    message: "not found".to_string(),
                }),
            }
        }
    }

    fn extractor() -> PortExtractor {
        PortExtractor::new(BaseImageResolver::new(
            Arc::new(ImageConfigCache::new()),
            Arc::new(NoLocalInspector),
            Arc::new(StubRegistry),
        ))
    }

    fn extract(content: &str) -> Report<Vec<String>> {
        extractor().extract(content.as_bytes()).unwrap()
    }

    #[test]
    fn test_expose_sorted_as_strings() {
        let report = extract("FROM scratch\nEXPOSE 80 443\nEXPOSE 8080\n");
        assert_eq!(report.value, vec!["443", "80", "8080"]);
        assert!(report.is_complete());
    }

    #[test]
    fn test_ports_inherited_from_base() {
        let report = extract("FROM nginx\nEXPOSE 8443/tcp\n");
        assert_eq!(report.value, vec!["80/tcp", "8443/tcp"]);
    }

    #[test]
    fn test_duplicates_removed() {
        let report = extract("FROM nginx\nEXPOSE 80/tcp 80/tcp\nEXPOSE 9000\n");
        assert_eq!(report.value, vec!["80/tcp", "9000"]);
    }

    #[test]
    fn test_lookup_failure_is_warning() {
        let report = extract("FROM private/app:1\nEXPOSE 3000\n");
        assert_eq!(report.value, vec!["3000"]);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].phase, WarningPhase::PortInheritance);
    }

    #[test]
    fn test_no_ports() {
        let report = extract("FROM scratch\nCMD [\"app\"]\n");
        assert!(report.value.is_empty());
    }

    #[test]
    fn test_parse_error() {
        assert!(extractor().extract("EXPOSE\n".as_bytes()).is_err());
    }
}
