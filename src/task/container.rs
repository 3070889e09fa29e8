// src/task/container.rs

//! Static description of a single container in a task graph.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::task::ContainerName;

/// Where a container's image comes from: a local build context or a
/// pullable reference. Exactly one applies to any container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Build { directory: PathBuf },
    Pull { image: String },
}

/// An environment variable value: either a literal, or a reference to a
/// variable on the host (written `$NAME` in the config file).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentValue {
    Literal(String),
    FromHost(String),
}

/// A volume mount, as `local:container[:options]` in the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub local_path: String,
    pub container_path: String,
    pub options: Option<String>,
}

/// A port mapping, as `local:container` in the config file. Both ends are
/// validated to lie in 1..=65535 during config validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub local_port: u16,
    pub container_port: u16,
}

/// Overrides for the health check declared by the container's image.
///
/// All fields are optional; anything unset falls back to what the image
/// defines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthCheckOptions {
    pub interval: Option<Duration>,
    pub retries: Option<u64>,
    pub start_period: Option<Duration>,
}

/// Static information about a container, derived from config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub name: ContainerName,
    pub image_source: ImageSource,
    pub command: Option<String>,
    pub environment: BTreeMap<String, EnvironmentValue>,
    pub working_directory: Option<String>,
    pub volume_mounts: Vec<VolumeMount>,
    pub port_mappings: Vec<PortMapping>,
    pub health_check: Option<HealthCheckOptions>,
    pub run_as_current_user: bool,
    /// Direct dependencies, in declaration order.
    pub dependencies: Vec<ContainerName>,
}

impl Container {
    /// Minimal container used by tests and builders: a pulled image with no
    /// command, dependencies or mounts.
    pub fn from_image(name: impl Into<ContainerName>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image_source: ImageSource::Pull {
                image: image.into(),
            },
            command: None,
            environment: BTreeMap::new(),
            working_directory: None,
            volume_mounts: Vec::new(),
            port_mappings: Vec::new(),
            health_check: None,
            run_as_current_user: false,
            dependencies: Vec::new(),
        }
    }

    pub fn has_health_check(&self) -> bool {
        self.health_check.is_some()
    }
}
