// src/exec/runner.rs

//! The step dispatcher: one exhaustive match from step variant to engine
//! operation.
//!
//! For each step the runner emits the `…Started` event where the event
//! family defines one, drives the operation (forwarding streaming progress
//! through the sink), and emits exactly one terminal event. No event
//! follows the terminal event for a step. Engine refusals become the
//! matching `…Failed` event; only failures with no event of their own (an
//! unknown container name, an error while waiting on the running main
//! container) propagate as errors for the worker to wrap as
//! `ExecutionFailed`.

use std::io::Write;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::debug;

use crate::engine::{ContainerCreationRequest, EngineDriver};
use crate::events::{Step, TaskEvent};
use crate::exec::{EventSink, RunOptions};
use crate::task::{Container, ContainerGraph, EnvironmentValue};

pub(crate) async fn run_step(
    step: &Step,
    sink: &EventSink,
    driver: &dyn EngineDriver,
    graph: &ContainerGraph,
    options: &RunOptions,
) -> Result<()> {
    debug!(step = %step, "dispatching step");

    match step {
        Step::CreateTaskNetwork => {
            let name = format!("taskdock-{}", options.task_name);

            match driver.create_network(&name).await {
                Ok(network_id) => sink.post(TaskEvent::TaskNetworkCreated { network_id }),
                Err(e) => sink.post(TaskEvent::TaskNetworkCreationFailed {
                    message: e.to_string(),
                }),
            }
        }

        Step::BuildImage { container } => {
            let spec = lookup(graph, container)?;

            sink.post(TaskEvent::ImageBuildStarted {
                container: container.clone(),
            });

            let progress_sink = sink.clone();
            let progress_container = container.clone();
            let on_progress = move |progress: crate::engine::BuildProgress| {
                progress_sink.post(TaskEvent::ImageBuildProgress {
                    container: progress_container.clone(),
                    current_step: progress.current_step,
                    total_steps: progress.total_steps,
                    message: progress.message,
                });
            };

            match driver.build_image(spec, &on_progress).await {
                Ok(image_id) => sink.post(TaskEvent::ImageBuildSucceeded {
                    container: container.clone(),
                    image_id,
                }),
                Err(e) => sink.post(TaskEvent::ImageBuildFailed {
                    container: container.clone(),
                    message: e.to_string(),
                }),
            }
        }

        Step::PullImage { image } => {
            sink.post(TaskEvent::ImagePullStarted {
                image: image.clone(),
            });

            let progress_sink = sink.clone();
            let progress_image = image.clone();
            let on_progress = move |message: String| {
                progress_sink.post(TaskEvent::ImagePullProgress {
                    image: progress_image.clone(),
                    message,
                });
            };

            match driver.pull_image(image, &on_progress).await {
                Ok(()) => sink.post(TaskEvent::ImagePullSucceeded {
                    image: image.clone(),
                }),
                Err(e) => sink.post(TaskEvent::ImagePullFailed {
                    image: image.clone(),
                    message: e.to_string(),
                }),
            }
        }

        Step::CreateContainer {
            container,
            image,
            network_id,
        } => {
            let spec = lookup(graph, container)?;

            let request = match creation_request(spec, image, network_id, graph, options) {
                Ok(request) => request,
                Err(message) => {
                    sink.post(TaskEvent::ContainerCreationFailed {
                        container: container.clone(),
                        message,
                    });
                    return Ok(());
                }
            };

            match driver.create_container(&request).await {
                Ok(container_id) => sink.post(TaskEvent::ContainerCreated {
                    container: container.clone(),
                    container_id,
                }),
                Err(e) => sink.post(TaskEvent::ContainerCreationFailed {
                    container: container.clone(),
                    message: e.to_string(),
                }),
            }
        }

        Step::StartContainer {
            container,
            container_id,
        } => match driver.start_container(container_id).await {
            Ok(()) => sink.post(TaskEvent::ContainerStarted {
                container: container.clone(),
            }),
            Err(e) => sink.post(TaskEvent::ContainerStartFailed {
                container: container.clone(),
                message: e.to_string(),
            }),
        },

        Step::WaitForContainerToBecomeHealthy {
            container,
            container_id,
        } => {
            let spec = lookup(graph, container)?;
            let check = spec
                .health_check
                .clone()
                .ok_or_else(|| anyhow!("container '{container}' has no health check to wait for"))?;

            match driver.wait_for_healthy(container_id, &check).await {
                Ok(()) => sink.post(TaskEvent::ContainerBecameHealthy {
                    container: container.clone(),
                }),
                Err(e) => sink.post(TaskEvent::ContainerDidNotBecomeHealthy {
                    container: container.clone(),
                    message: e.to_string(),
                }),
            }
        }

        Step::RunContainer {
            container,
            container_id,
        } => {
            let on_output: Arc<dyn Fn(&str) + Send + Sync> = Arc::new(|chunk: &str| {
                let mut stdout = std::io::stdout();
                let _ = stdout.write_all(chunk.as_bytes());
                let _ = stdout.flush();
            });

            let exit_code = driver
                .run_container(container_id, on_output)
                .await
                .with_context(|| format!("running container '{container}'"))?;

            sink.post(TaskEvent::RunningContainerExited {
                container: container.clone(),
                exit_code,
            });
        }

        Step::StopContainer {
            container,
            container_id,
        } => match driver.stop_container(container_id).await {
            Ok(()) => sink.post(TaskEvent::ContainerStopped {
                container: container.clone(),
            }),
            Err(e) => sink.post(TaskEvent::ContainerStopFailed {
                container: container.clone(),
                message: e.to_string(),
            }),
        },

        Step::RemoveContainer {
            container,
            container_id,
        } => match driver.remove_container(container_id).await {
            Ok(()) => sink.post(TaskEvent::ContainerRemoved {
                container: container.clone(),
            }),
            Err(e) => sink.post(TaskEvent::ContainerRemovalFailed {
                container: container.clone(),
                message: e.to_string(),
            }),
        },

        Step::DeleteTaskNetwork { network_id } => match driver.delete_network(network_id).await {
            Ok(()) => sink.post(TaskEvent::TaskNetworkDeleted),
            Err(e) => sink.post(TaskEvent::TaskNetworkDeletionFailed {
                message: e.to_string(),
            }),
        },
    }

    Ok(())
}

fn lookup<'a>(graph: &'a ContainerGraph, container: &str) -> Result<&'a Container> {
    graph
        .container(container)
        .ok_or_else(|| anyhow!("container '{container}' is not part of the task graph"))
}

/// Assemble the engine-side creation request: resolved environment, the
/// engine name, the network alias, and the command with any additional task
/// arguments appended for the main container.
fn creation_request(
    spec: &Container,
    image: &str,
    network_id: &str,
    graph: &ContainerGraph,
    options: &RunOptions,
) -> std::result::Result<ContainerCreationRequest, String> {
    let mut environment = Vec::with_capacity(spec.environment.len());

    for (key, value) in spec.environment.iter() {
        let resolved = match value {
            EnvironmentValue::Literal(value) => value.clone(),
            EnvironmentValue::FromHost(host_var) => std::env::var(host_var).map_err(|_| {
                format!(
                    "environment variable '{key}' references host variable '{host_var}', which is not set"
                )
            })?,
        };
        environment.push((key.clone(), resolved));
    }

    let is_main = spec.name == *graph.main_container_name();
    let extra_args = if is_main {
        options.additional_command_args.as_slice()
    } else {
        &[]
    };

    // Additional task arguments extend the configured command, or stand in
    // for it the way `docker run <image> <args>` does when none is set.
    let command = match &spec.command {
        Some(command) => {
            let mut parts: Vec<String> = command.split_whitespace().map(String::from).collect();
            parts.extend(extra_args.iter().cloned());
            Some(parts)
        }
        None if !extra_args.is_empty() => Some(extra_args.to_vec()),
        None => None,
    };

    Ok(ContainerCreationRequest {
        container_name: spec.name.clone(),
        name: format!("taskdock-{}-{}", options.task_name, spec.name),
        image: image.to_string(),
        network_id: network_id.to_string(),
        network_alias: spec.name.clone(),
        command,
        environment,
        working_directory: spec.working_directory.clone(),
        volume_mounts: spec.volume_mounts.clone(),
        port_mappings: spec.port_mappings.clone(),
        health_check: spec.health_check.clone(),
        run_as_current_user: spec.run_as_current_user,
    })
}
