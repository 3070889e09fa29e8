// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::{Result, TaskdockError};
use crate::task::{
    Container, EnvironmentValue, HealthCheckOptions, ImageSource, PortMapping, VolumeMount,
};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [task.build]
/// container = "app"
///
/// [container.app]
/// build_directory = "docker/app"
/// command = "npm start"
/// dependencies = ["db"]
///
/// [container.db]
/// image = "postgres:13"
///
/// [container.db.health_check]
/// interval = "2s"
/// retries = 10
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Optional project name, used to prefix engine-side resource names.
    #[serde(default)]
    pub project_name: Option<String>,

    /// All tasks from `[task.<name>]`. Keys are the task names.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,

    /// All containers from `[container.<name>]`. Keys are the container names.
    #[serde(default)]
    pub container: BTreeMap<String, ContainerConfig>,
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// The main container this task runs.
    pub container: String,

    /// Tasks that must run before this one. Validated here; executed by a
    /// layer above the execution engine.
    #[serde(default)]
    pub prerequisites: Vec<String>,

    /// Default arguments appended to the main container's command.
    #[serde(default)]
    pub command_args: Vec<String>,

    #[serde(default)]
    pub description: Option<String>,
}

/// `[container.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerConfig {
    /// Pullable image reference. Exactly one of `image` and
    /// `build_directory` must be set.
    #[serde(default)]
    pub image: Option<String>,

    /// Build context directory, relative to the config file.
    #[serde(default)]
    pub build_directory: Option<String>,

    #[serde(default)]
    pub command: Option<String>,

    /// Environment variables. A value starting with `$` references a
    /// variable on the host, e.g. `HOME = "$HOME"`.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    #[serde(default)]
    pub working_directory: Option<String>,

    /// Volume mounts as `local:container[:options]`.
    #[serde(default)]
    pub volumes: Vec<String>,

    /// Port mappings as `local:container`.
    #[serde(default)]
    pub ports: Vec<String>,

    #[serde(default)]
    pub health_check: Option<HealthCheckConfig>,

    /// Run the container as the invoking user rather than the image default.
    #[serde(default)]
    pub run_as_current_user: bool,

    /// Containers that must be started (and healthy, where applicable)
    /// before this one is created.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// `[container.<name>.health_check]` section. Overrides for the health
/// check declared by the image; unset fields keep the image's values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default)]
    pub interval: Option<String>,

    #[serde(default)]
    pub retries: Option<u64>,

    #[serde(default)]
    pub start_period: Option<String>,
}

impl ContainerConfig {
    /// Convert this config section into the domain [`Container`], parsing
    /// volumes, ports, environment references and durations.
    pub fn to_container(&self, name: &str) -> Result<Container> {
        let image_source = match (&self.image, &self.build_directory) {
            (Some(image), None) => ImageSource::Pull {
                image: image.clone(),
            },
            (None, Some(dir)) => ImageSource::Build {
                directory: PathBuf::from(dir),
            },
            (Some(_), Some(_)) => {
                return Err(TaskdockError::ConfigError(format!(
                    "container '{name}' sets both `image` and `build_directory`; exactly one is required"
                )))
            }
            (None, None) => {
                return Err(TaskdockError::ConfigError(format!(
                    "container '{name}' must set either `image` or `build_directory`"
                )))
            }
        };

        let environment = self
            .environment
            .iter()
            .map(|(key, value)| {
                let value = match value.strip_prefix('$') {
                    Some(host_var) => EnvironmentValue::FromHost(host_var.to_string()),
                    None => EnvironmentValue::Literal(value.clone()),
                };
                (key.clone(), value)
            })
            .collect();

        let volume_mounts = self
            .volumes
            .iter()
            .map(|spec| parse_volume(name, spec))
            .collect::<Result<Vec<_>>>()?;

        let port_mappings = self
            .ports
            .iter()
            .map(|spec| parse_port_mapping(name, spec))
            .collect::<Result<Vec<_>>>()?;

        let health_check = match &self.health_check {
            Some(hc) => Some(HealthCheckOptions {
                interval: hc
                    .interval
                    .as_deref()
                    .map(|s| parse_duration(s).map_err(|e| bad_duration(name, "interval", e)))
                    .transpose()?,
                retries: hc.retries,
                start_period: hc
                    .start_period
                    .as_deref()
                    .map(|s| parse_duration(s).map_err(|e| bad_duration(name, "start_period", e)))
                    .transpose()?,
            }),
            None => None,
        };

        Ok(Container {
            name: name.to_string(),
            image_source,
            command: self.command.clone(),
            environment,
            working_directory: self.working_directory.clone(),
            volume_mounts,
            port_mappings,
            health_check,
            run_as_current_user: self.run_as_current_user,
            dependencies: self.dependencies.clone(),
        })
    }
}

/// Validated configuration. Construct via `ConfigFile::try_from(raw)`, which
/// lives in [`crate::config::validate`].
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub project_name: Option<String>,
    pub task: BTreeMap<String, TaskConfig>,
    pub container: BTreeMap<String, ContainerConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        project_name: Option<String>,
        task: BTreeMap<String, TaskConfig>,
        container: BTreeMap<String, ContainerConfig>,
    ) -> Self {
        Self {
            project_name,
            task,
            container,
        }
    }

    pub fn task(&self, name: &str) -> Option<&TaskConfig> {
        self.task.get(name)
    }

    /// All containers converted to their domain form.
    ///
    /// Validation has already run the same conversion, so this cannot fail
    /// for a validated config.
    pub fn containers(&self) -> Result<BTreeMap<String, Container>> {
        self.container
            .iter()
            .map(|(name, cfg)| Ok((name.clone(), cfg.to_container(name)?)))
            .collect()
    }
}

fn parse_volume(container: &str, spec: &str) -> Result<VolumeMount> {
    let parts: Vec<&str> = spec.split(':').collect();

    match parts.as_slice() {
        [local, remote] if !local.is_empty() && !remote.is_empty() => Ok(VolumeMount {
            local_path: local.to_string(),
            container_path: remote.to_string(),
            options: None,
        }),
        [local, remote, options] if !local.is_empty() && !remote.is_empty() => Ok(VolumeMount {
            local_path: local.to_string(),
            container_path: remote.to_string(),
            options: Some(options.to_string()),
        }),
        _ => Err(TaskdockError::ConfigError(format!(
            "container '{container}' has invalid volume '{spec}'; expected 'local:container' or 'local:container:options'"
        ))),
    }
}

fn parse_port_mapping(container: &str, spec: &str) -> Result<PortMapping> {
    let invalid = || {
        TaskdockError::ConfigError(format!(
            "container '{container}' has invalid port mapping '{spec}'; expected 'local:container' with both ports in 1..=65535"
        ))
    };

    let (local, remote) = spec.split_once(':').ok_or_else(invalid)?;
    let local_port: u16 = local.trim().parse().map_err(|_| invalid())?;
    let container_port: u16 = remote.trim().parse().map_err(|_| invalid())?;

    if local_port == 0 || container_port == 0 {
        return Err(invalid());
    }

    Ok(PortMapping {
        local_port,
        container_port,
    })
}

fn bad_duration(container: &str, field: &str, error: String) -> TaskdockError {
    TaskdockError::ConfigError(format!(
        "container '{container}' has invalid health_check.{field}: {error}"
    ))
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub(crate) fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{unit}'; expected ms, s, m, or h"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_durations() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert!(parse_duration("3 parsecs").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn parses_port_mappings() {
        let mapping = parse_port_mapping("app", "8080:80").unwrap();
        assert_eq!(mapping.local_port, 8080);
        assert_eq!(mapping.container_port, 80);

        assert!(parse_port_mapping("app", "0:80").is_err());
        assert!(parse_port_mapping("app", "8080").is_err());
        assert!(parse_port_mapping("app", "8080:99999").is_err());
    }

    #[test]
    fn environment_values_starting_with_dollar_reference_the_host() {
        let mut cfg = ContainerConfig {
            image: Some("app:latest".to_string()),
            build_directory: None,
            command: None,
            environment: BTreeMap::new(),
            working_directory: None,
            volumes: Vec::new(),
            ports: Vec::new(),
            health_check: None,
            run_as_current_user: false,
            dependencies: Vec::new(),
        };
        cfg.environment
            .insert("HOME".to_string(), "$HOME".to_string());
        cfg.environment
            .insert("MODE".to_string(), "test".to_string());

        let container = cfg.to_container("app").unwrap();

        assert_eq!(
            container.environment.get("HOME"),
            Some(&EnvironmentValue::FromHost("HOME".to_string()))
        );
        assert_eq!(
            container.environment.get("MODE"),
            Some(&EnvironmentValue::Literal("test".to_string()))
        );
    }
}
