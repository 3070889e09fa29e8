// src/engine/docker.rs

//! Docker implementation of [`EngineDriver`] on top of `bollard`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions, WaitContainerOptions,
};
use bollard::image::{BuildImageOptions, CreateImageOptions};
use bollard::network::CreateNetworkOptions;
use bollard::secret::{EndpointSettings, HealthConfig, HealthStatusEnum, HostConfig, PortBinding};
use bollard::Docker;
use futures_util::stream::StreamExt;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::engine::{BuildProgress, ContainerCreationRequest, DriverError, EngineDriver};
use crate::task::{Container, HealthCheckOptions, ImageSource};

/// How long the engine gives a container to stop before killing it.
const STOP_TIMEOUT_SECONDS: i64 = 10;

/// Polling defaults for containers whose health check does not override
/// them.
const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_HEALTH_RETRIES: u64 = 60;

/// Driver for the local Docker daemon.
///
/// The underlying client is cheap to clone and safe to share between
/// workers.
#[derive(Debug, Clone)]
pub struct DockerDriver {
    client: Docker,
}

impl DockerDriver {
    pub fn new() -> Result<Self, DriverError> {
        let client = Docker::connect_with_unix_defaults()
            .map_err(|e| DriverError::Connection(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl EngineDriver for DockerDriver {
    async fn build_image(
        &self,
        container: &Container,
        on_progress: &(dyn Fn(BuildProgress) + Send + Sync),
    ) -> Result<String, DriverError> {
        let directory = match &container.image_source {
            ImageSource::Build { directory } => directory,
            ImageSource::Pull { image } => {
                return Err(DriverError::Api(format!(
                    "container '{}' uses pulled image '{}' and cannot be built",
                    container.name, image
                )))
            }
        };

        let context = build_context_archive(directory).map_err(|e| {
            DriverError::Api(format!(
                "could not archive build context '{}': {}",
                directory.display(),
                e
            ))
        })?;

        let tag = format!("taskdock-{}", container.name);
        let options = BuildImageOptions::<String> {
            dockerfile: "Dockerfile".to_string(),
            t: tag.clone(),
            rm: true,
            ..Default::default()
        };

        let mut stream = self.client.build_image(options, None, Some(context.into()));

        let mut image_id: Option<String> = None;
        let mut total_steps = 0;

        while let Some(message) = stream.next().await {
            let info = message.map_err(|e| api_error("image build failed", e))?;

            if let Some(detail) = info.error {
                return Err(DriverError::Api(detail));
            }

            if let Some(line) = info.stream {
                if let Some((current, total, text)) = parse_build_step(&line) {
                    total_steps = total;
                    on_progress(BuildProgress {
                        current_step: current,
                        total_steps,
                        message: text,
                    });
                } else {
                    debug!(container = %container.name, "build output: {}", line.trim_end());
                }
            }

            if let Some(aux) = info.aux {
                if let Some(id) = aux.id {
                    image_id = Some(id);
                }
            }
        }

        Ok(image_id.unwrap_or(tag))
    }

    async fn pull_image(
        &self,
        image: &str,
        on_progress: &(dyn Fn(String) + Send + Sync),
    ) -> Result<(), DriverError> {
        let mut stream = self.client.create_image(
            Some(CreateImageOptions {
                from_image: image.to_string(),
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(message) = stream.next().await {
            let info = message.map_err(|e| api_error("image pull failed", e))?;

            if let Some(status) = info.status {
                on_progress(status);
            }
        }

        Ok(())
    }

    async fn create_network(&self, name: &str) -> Result<String, DriverError> {
        let response = self
            .client
            .create_network(CreateNetworkOptions {
                name: name.to_string(),
                driver: "bridge".to_string(),
                check_duplicate: true,
                ..Default::default()
            })
            .await
            .map_err(|e| api_error("network creation failed", e))?;

        if let Some(warning) = response.warning.filter(|w| !w.is_empty()) {
            warn!(network = name, "engine warning creating network: {}", warning);
        }

        Ok(response.id.unwrap_or_else(|| name.to_string()))
    }

    async fn create_container(
        &self,
        request: &ContainerCreationRequest,
    ) -> Result<String, DriverError> {
        let env = request
            .environment
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>();

        let binds = request
            .volume_mounts
            .iter()
            .map(|mount| match &mount.options {
                Some(options) => {
                    format!("{}:{}:{}", mount.local_path, mount.container_path, options)
                }
                None => format!("{}:{}", mount.local_path, mount.container_path),
            })
            .collect::<Vec<_>>();

        let mut exposed_ports = HashMap::new();
        let mut port_bindings = HashMap::new();

        for mapping in request.port_mappings.iter() {
            let key = format!("{}/tcp", mapping.container_port);
            exposed_ports.insert(key.clone(), HashMap::new());
            port_bindings.insert(
                key,
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: Some(mapping.local_port.to_string()),
                }]),
            );
        }

        let user = if request.run_as_current_user {
            current_user_spec()
        } else {
            None
        };

        let mut endpoints = HashMap::new();
        endpoints.insert(
            request.network_id.clone(),
            EndpointSettings {
                aliases: Some(vec![request.network_alias.clone()]),
                ..Default::default()
            },
        );

        let config = Config::<String> {
            image: Some(request.image.clone()),
            cmd: request.command.clone(),
            env: Some(env),
            working_dir: request.working_directory.clone(),
            user,
            exposed_ports: Some(exposed_ports),
            healthcheck: request.health_check.as_ref().map(health_config),
            host_config: Some(HostConfig {
                binds: Some(binds),
                port_bindings: Some(port_bindings),
                ..Default::default()
            }),
            networking_config: Some(bollard::container::NetworkingConfig {
                endpoints_config: endpoints,
            }),
            ..Default::default()
        };

        let response = self
            .client
            .create_container(
                Some(CreateContainerOptions {
                    name: request.name.clone(),
                    ..Default::default()
                }),
                config,
            )
            .await
            .map_err(|e| api_error("container creation failed", e))?;

        Ok(response.id)
    }

    async fn start_container(&self, container_id: &str) -> Result<(), DriverError> {
        self.client
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| api_error("container start failed", e))
    }

    async fn wait_for_healthy(
        &self,
        container_id: &str,
        check: &HealthCheckOptions,
    ) -> Result<(), DriverError> {
        let interval = check.interval.unwrap_or(DEFAULT_HEALTH_INTERVAL);
        let retries = check.retries.unwrap_or(DEFAULT_HEALTH_RETRIES);

        if let Some(start_period) = check.start_period {
            sleep(start_period).await;
        }

        for attempt in 1..=retries {
            let inspection = self
                .client
                .inspect_container(container_id, None::<InspectContainerOptions>)
                .await
                .map_err(|e| api_error("container inspection failed", e))?;

            let status = inspection
                .state
                .as_ref()
                .and_then(|state| state.health.as_ref())
                .and_then(|health| health.status);

            match status {
                Some(HealthStatusEnum::HEALTHY) => return Ok(()),
                Some(HealthStatusEnum::UNHEALTHY) => {
                    return Err(DriverError::Api(format!(
                        "container reported an unhealthy status after {attempt} checks"
                    )))
                }
                Some(HealthStatusEnum::STARTING) => sleep(interval).await,
                // The image defines no health check; there is nothing to
                // wait for.
                _ => return Ok(()),
            }
        }

        Err(DriverError::Api(format!(
            "container did not become healthy within {retries} checks"
        )))
    }

    async fn run_container(
        &self,
        container_id: &str,
        on_output: Arc<dyn for<'a> Fn(&'a str) + Send + Sync>,
    ) -> Result<i64, DriverError> {
        // Stream output while we wait for the container to exit. The logs
        // stream ends when the container does, so the pump drains on its
        // own in the normal case.
        let pump = {
            let client = self.client.clone();
            let id = container_id.to_string();
            let on_output = Arc::clone(&on_output);

            tokio::spawn(async move {
                let mut logs = client.logs(
                    &id,
                    Some(LogsOptions::<String> {
                        follow: true,
                        stdout: true,
                        stderr: true,
                        ..Default::default()
                    }),
                );

                while let Some(chunk) = logs.next().await {
                    match chunk {
                        Ok(output) => on_output(&output.to_string()),
                        Err(e) => {
                            debug!(container = %id, "log stream ended: {}", e);
                            break;
                        }
                    }
                }
            })
        };

        let mut waiter = self
            .client
            .wait_container(container_id, None::<WaitContainerOptions<String>>);

        let exit_code = match waiter.next().await {
            Some(Ok(response)) => response.status_code,
            // bollard reports a non-zero exit as a dedicated error variant.
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => code,
            Some(Err(e)) => {
                pump.abort();
                return Err(api_error("waiting for the container to exit failed", e));
            }
            None => {
                pump.abort();
                return Err(DriverError::Api(
                    "the engine closed the wait stream before the container exited".to_string(),
                ));
            }
        };

        let _ = pump.await;

        Ok(exit_code)
    }

    async fn stop_container(&self, container_id: &str) -> Result<(), DriverError> {
        self.client
            .stop_container(
                container_id,
                Some(StopContainerOptions {
                    t: STOP_TIMEOUT_SECONDS,
                }),
            )
            .await
            .map_err(|e| api_error("container stop failed", e))
    }

    async fn remove_container(&self, container_id: &str) -> Result<(), DriverError> {
        self.client
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| api_error("container removal failed", e))
    }

    async fn delete_network(&self, network_id: &str) -> Result<(), DriverError> {
        self.client
            .remove_network(network_id)
            .await
            .map_err(|e| api_error("network deletion failed", e))
    }
}

fn api_error(context: &str, error: bollard::errors::Error) -> DriverError {
    DriverError::Api(format!("{context}: {error}"))
}

/// Tar up a build context directory for the engine's build endpoint.
fn build_context_archive(directory: &std::path::Path) -> std::io::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    builder.append_dir_all(".", directory)?;
    builder.into_inner()
}

fn health_config(check: &HealthCheckOptions) -> HealthConfig {
    HealthConfig {
        // An empty test inherits the check command from the image; we only
        // override timing parameters.
        test: None,
        interval: check.interval.map(|d| d.as_nanos() as i64),
        retries: check.retries.map(|r| r as i64),
        start_period: check.start_period.map(|d| d.as_nanos() as i64),
        ..Default::default()
    }
}

/// Parse a classic-builder progress line like `Step 3/10 : RUN npm install`.
fn parse_build_step(line: &str) -> Option<(u64, u64, String)> {
    let rest = line.strip_prefix("Step ")?;
    let (current, rest) = rest.split_once('/')?;
    let (total, message) = rest.split_once(':')?;

    Some((
        current.trim().parse().ok()?,
        total.trim().parse().ok()?,
        message.trim().to_string(),
    ))
}

#[cfg(unix)]
fn current_user_spec() -> Option<String> {
    use std::os::unix::fs::MetadataExt;

    let metadata = std::fs::metadata("/proc/self").ok()?;
    Some(format!("{}:{}", metadata.uid(), metadata.gid()))
}

#[cfg(not(unix))]
fn current_user_spec() -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_classic_builder_step_lines() {
        let (current, total, message) =
            parse_build_step("Step 3/10 : RUN npm install").unwrap();

        assert_eq!(current, 3);
        assert_eq!(total, 10);
        assert_eq!(message, "RUN npm install");
    }

    #[test]
    fn ignores_non_step_lines() {
        assert!(parse_build_step(" ---> Using cache").is_none());
        assert!(parse_build_step("Successfully built abc123").is_none());
    }
}
