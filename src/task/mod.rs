// src/task/mod.rs

//! The resolved view of a single task: the main container plus the
//! transitive closure of its dependencies.

/// Canonical container name type used throughout the engine.
pub type ContainerName = String;

pub mod container;
pub mod graph;

pub use container::{
    Container, EnvironmentValue, HealthCheckOptions, ImageSource, PortMapping, VolumeMount,
};
pub use graph::ContainerGraph;
