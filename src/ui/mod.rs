// src/ui/mod.rs

//! User-visible progress reporting.
//!
//! The execution manager talks to an [`EventLogger`] rather than printing
//! directly. For every event, the logger is notified strictly before the
//! state machine processes it, so "starting X" lines never appear after the
//! follow-on event has already been acted upon.

use crate::events::{Step, TaskEvent};

/// A pure sink for execution progress. Implementations must not panic.
pub trait EventLogger: Send + Sync {
    /// Called immediately before a step is handed to a worker.
    fn on_starting_task_step(&self, step: &Step);

    /// Called for every event, before the state machine sees it.
    fn post_event(&self, event: &TaskEvent);
}

/// Renders one console line per significant event.
#[derive(Debug, Default)]
pub struct ConsoleEventLogger;

impl ConsoleEventLogger {
    pub fn new() -> Self {
        Self
    }
}

impl EventLogger for ConsoleEventLogger {
    fn on_starting_task_step(&self, step: &Step) {
        match step {
            Step::CreateTaskNetwork => println!("Creating task network..."),
            Step::BuildImage { container } => {
                println!("Building image for container '{container}'...")
            }
            Step::PullImage { image } => println!("Pulling image '{image}'..."),
            Step::CreateContainer { container, .. } => {
                println!("Creating container '{container}'...")
            }
            Step::StartContainer { container, .. } => {
                println!("Starting container '{container}'...")
            }
            Step::WaitForContainerToBecomeHealthy { container, .. } => {
                println!("Waiting for container '{container}' to become healthy...")
            }
            Step::RunContainer { container, .. } => println!("Running container '{container}'..."),
            Step::StopContainer { container, .. } => {
                println!("Stopping container '{container}'...")
            }
            Step::RemoveContainer { container, .. } => {
                println!("Removing container '{container}'...")
            }
            Step::DeleteTaskNetwork { .. } => println!("Deleting task network..."),
        }
    }

    fn post_event(&self, event: &TaskEvent) {
        match event {
            TaskEvent::ImageBuildProgress {
                container,
                current_step,
                total_steps,
                message,
            } => println!("[{container}] step {current_step}/{total_steps}: {message}"),
            TaskEvent::RunningContainerExited {
                container,
                exit_code,
            } => println!("Container '{container}' exited with code {exit_code}."),
            TaskEvent::ImageBuildFailed { container, message } => {
                eprintln!("Building image for container '{container}' failed: {message}")
            }
            TaskEvent::ImagePullFailed { image, message } => {
                eprintln!("Pulling image '{image}' failed: {message}")
            }
            TaskEvent::TaskNetworkCreationFailed { message } => {
                eprintln!("Creating the task network failed: {message}")
            }
            TaskEvent::ContainerCreationFailed { container, message } => {
                eprintln!("Creating container '{container}' failed: {message}")
            }
            TaskEvent::ContainerStartFailed { container, message } => {
                eprintln!("Starting container '{container}' failed: {message}")
            }
            TaskEvent::ContainerDidNotBecomeHealthy { container, message } => {
                eprintln!("Container '{container}' did not become healthy: {message}")
            }
            TaskEvent::ContainerStopFailed { container, message } => {
                eprintln!("Stopping container '{container}' failed: {message}")
            }
            TaskEvent::ContainerRemovalFailed { container, message } => {
                eprintln!("Removing container '{container}' failed: {message}")
            }
            TaskEvent::TaskNetworkDeletionFailed { message } => {
                eprintln!("Deleting the task network failed: {message}")
            }
            TaskEvent::ExecutionFailed { message } => eprintln!("Execution failed: {message}"),
            TaskEvent::UserInterruptedExecution => {
                eprintln!("Interrupted; cleaning up...")
            }
            _ => {}
        }
    }
}

/// Discards everything. Useful for embedding and tests.
#[derive(Debug, Default)]
pub struct NullEventLogger;

impl EventLogger for NullEventLogger {
    fn on_starting_task_step(&self, _step: &Step) {}

    fn post_event(&self, _event: &TaskEvent) {}
}
