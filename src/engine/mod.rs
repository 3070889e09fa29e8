// src/engine/mod.rs

//! Container engine abstraction.
//!
//! The execution engine talks to an [`EngineDriver`] instead of a concrete
//! engine client. This keeps the step runner testable (tests plug in a fake
//! driver that records operations) while the production implementation in
//! [`docker`] drives the local Docker daemon through `bollard`.
//!
//! Drivers must be safe to call from multiple workers concurrently; the
//! dispatcher treats them as such.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::task::{Container, HealthCheckOptions, PortMapping, VolumeMount};

pub mod docker;

pub use docker::DockerDriver;

/// A failure reported by the container engine for a specific operation.
/// Carries a human-readable message; the execution engine never retries.
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    #[error("{0}")]
    Api(String),

    #[error("could not connect to the container engine: {0}")]
    Connection(String),
}

/// Progress of a streaming image build.
#[derive(Debug, Clone)]
pub struct BuildProgress {
    pub current_step: u64,
    pub total_steps: u64,
    pub message: String,
}

/// Everything the engine needs to create one container. Built by the step
/// runner from the container's static description plus parameters resolved
/// from the event log.
#[derive(Debug, Clone)]
pub struct ContainerCreationRequest {
    /// The container's name within the task graph.
    pub container_name: String,
    /// The engine-side name for the created container.
    pub name: String,
    pub image: String,
    pub network_id: String,
    /// Network alias so dependent containers can reach this one by its
    /// graph name.
    pub network_alias: String,
    pub command: Option<Vec<String>>,
    /// Fully-resolved environment (host references already substituted).
    pub environment: Vec<(String, String)>,
    pub working_directory: Option<String>,
    pub volume_mounts: Vec<VolumeMount>,
    pub port_mappings: Vec<PortMapping>,
    pub health_check: Option<HealthCheckOptions>,
    pub run_as_current_user: bool,
}

/// The ten operations the execution engine consumes. Streaming operations
/// accept a progress callback; `run_container` blocks until the container
/// exits and returns its exit code.
#[async_trait]
pub trait EngineDriver: Send + Sync {
    /// Build the image for a container from its build directory, returning
    /// the built image id.
    async fn build_image(
        &self,
        container: &Container,
        on_progress: &(dyn Fn(BuildProgress) + Send + Sync),
    ) -> Result<String, DriverError>;

    async fn pull_image(
        &self,
        image: &str,
        on_progress: &(dyn Fn(String) + Send + Sync),
    ) -> Result<(), DriverError>;

    /// Create the task network, returning its id.
    async fn create_network(&self, name: &str) -> Result<String, DriverError>;

    /// Create a container, returning its id.
    async fn create_container(
        &self,
        request: &ContainerCreationRequest,
    ) -> Result<String, DriverError>;

    async fn start_container(&self, container_id: &str) -> Result<(), DriverError>;

    /// Wait until the container reports healthy. The error message describes
    /// why it did not (unhealthy status, or the retry budget ran out).
    async fn wait_for_healthy(
        &self,
        container_id: &str,
        check: &HealthCheckOptions,
    ) -> Result<(), DriverError>;

    /// Wait for a started container to exit, streaming its output, and
    /// return its exit code.
    async fn run_container(
        &self,
        container_id: &str,
        on_output: Arc<dyn for<'a> Fn(&'a str) + Send + Sync>,
    ) -> Result<i64, DriverError>;

    async fn stop_container(&self, container_id: &str) -> Result<(), DriverError>;

    /// Remove a container. Removal is forced, so it succeeds even when a
    /// preceding stop failed.
    async fn remove_container(&self, container_id: &str) -> Result<(), DriverError>;

    async fn delete_network(&self, network_id: &str) -> Result<(), DriverError>;
}
