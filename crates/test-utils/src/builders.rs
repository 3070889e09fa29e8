//! Builders for containers and task graphs, so tests can construct
//! scenarios without going through TOML.

use std::path::PathBuf;
use std::time::Duration;

use taskdock::task::{
    Container, ContainerGraph, EnvironmentValue, HealthCheckOptions, ImageSource,
};

#[derive(Debug, Clone)]
pub struct ContainerBuilder {
    container: Container,
}

impl ContainerBuilder {
    /// A container that pulls `image`.
    pub fn new(name: &str, image: &str) -> Self {
        Self {
            container: Container::from_image(name, image),
        }
    }

    /// A container built from a local directory.
    pub fn built_from(name: &str, directory: &str) -> Self {
        let mut container = Container::from_image(name, "unused");
        container.image_source = ImageSource::Build {
            directory: PathBuf::from(directory),
        };
        Self { container }
    }

    pub fn command(mut self, command: &str) -> Self {
        self.container.command = Some(command.to_string());
        self
    }

    pub fn depends_on(mut self, dependency: &str) -> Self {
        self.container.dependencies.push(dependency.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: EnvironmentValue) -> Self {
        self.container.environment.insert(key.to_string(), value);
        self
    }

    /// Give the container a health check with default timing.
    pub fn with_health_check(mut self) -> Self {
        self.container.health_check = Some(HealthCheckOptions::default());
        self
    }

    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.container.health_check = Some(HealthCheckOptions {
            interval: Some(interval),
            ..Default::default()
        });
        self
    }

    pub fn build(self) -> Container {
        self.container
    }
}

#[derive(Debug, Default)]
pub struct GraphBuilder {
    task_name: String,
    main_container: String,
    containers: Vec<Container>,
}

impl GraphBuilder {
    pub fn new(task_name: &str, main_container: &str) -> Self {
        Self {
            task_name: task_name.to_string(),
            main_container: main_container.to_string(),
            containers: Vec::new(),
        }
    }

    pub fn with_container(mut self, container: Container) -> Self {
        self.containers.push(container);
        self
    }

    pub fn build(self) -> ContainerGraph {
        ContainerGraph::from_containers(self.task_name, self.main_container, self.containers)
            .expect("builder produced an invalid graph")
    }
}
