//! Image descriptor: the parts of an image configuration that dependency and
//! port resolution care about.

use std::collections::{BTreeSet, HashMap};

use dfdeps_core::error::Result;
use serde::Deserialize;

/// Exposed ports and ONBUILD triggers of one image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageDescriptor {
    /// Exposed port keys, e.g. `80/tcp`
    pub exposed_ports: BTreeSet<String>,
    /// Raw ONBUILD trigger instructions, in order
    pub on_build: Vec<String>,
}

/// Image configuration as stored in a registry config blob (`config`) or
/// returned by `docker image inspect` (`Config`).
#[derive(Debug, Default, Deserialize)]
struct RawImageConfig {
    #[serde(rename = "config", alias = "Config", default)]
    config: Option<RawContainerConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct RawContainerConfig {
    #[serde(rename = "ExposedPorts", default)]
    exposed_ports: Option<HashMap<String, serde_json::Value>>,
    #[serde(rename = "OnBuild", default)]
    on_build: Option<Vec<String>>,
}

impl ImageDescriptor {
    /// Decode an image configuration JSON document.
    pub fn from_config_json(raw: &[u8]) -> Result<Self> {
        let parsed: RawImageConfig = serde_json::from_slice(raw)?;
        let config = parsed.config.unwrap_or_default();

        Ok(Self {
            exposed_ports: config
                .exposed_ports
                .map(|ports| ports.into_keys().collect())
                .unwrap_or_default(),
            on_build: config.on_build.unwrap_or_default(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.exposed_ports.is_empty() && self.on_build.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_registry_config() {
        let raw = br#"{
            "architecture": "amd64",
            "os": "linux",
            "config": {
                "ExposedPorts": {"80/tcp": {}, "443/tcp": {}},
                "OnBuild": ["COPY . /app", "RUN make"]
            },
            "rootfs": {"type": "layers", "diff_ids": []}
        }"#;
        let desc = ImageDescriptor::from_config_json(raw).unwrap();
        assert_eq!(
            desc.exposed_ports.iter().cloned().collect::<Vec<_>>(),
            vec!["443/tcp", "80/tcp"]
        );
        assert_eq!(desc.on_build, vec!["COPY . /app", "RUN make"]);
    }

    #[test]
    fn test_decode_docker_inspect_output() {
        let raw = br#"{
            "Id": "sha256:abc",
            "RepoTags": ["base:1"],
            "Config": {"Env": ["PATH=/bin"], "ExposedPorts": {"8080/tcp": {}}, "OnBuild": null}
        }"#;
        let desc = ImageDescriptor::from_config_json(raw).unwrap();
        assert!(desc.exposed_ports.contains("8080/tcp"));
        assert!(desc.on_build.is_empty());
    }

    #[test]
    fn test_decode_without_config() {
        let desc = ImageDescriptor::from_config_json(br#"{"os": "linux"}"#).unwrap();
        assert!(desc.is_empty());
        let desc = ImageDescriptor::from_config_json(br#"{"config": null}"#).unwrap();
        assert!(desc.is_empty());
    }

    #[test]
    fn test_decode_invalid_json() {
        assert!(ImageDescriptor::from_config_json(b"not json").is_err());
    }
}
